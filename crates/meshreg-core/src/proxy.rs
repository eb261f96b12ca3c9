//! Child proxy registry.
//!
//! Routers register domain addresses on behalf of sleepy children. Three
//! bitsets over child-table slots track that work:
//!
//! - `proxy`: the child holds a domain address we must register
//! - `registered`: the registrar confirmed it
//! - `backoff`: the registrar asked us to wait before trying again
//!
//! `registered` and `backoff` are disjoint subsets of `proxy`. When `proxy`
//! and `registered` are equal the registry is settled. A child in `backoff`
//! is skipped by target selection until the owner releases it, which happens
//! once no re-registration countdown is running.

use std::fmt;

/// Child-table capacity covered by the masks.
pub const MAX_CHILDREN: u16 = 128;

const MASK_WORDS: usize = (MAX_CHILDREN as usize).div_ceil(64);

/// Slot in the child table, bounded by [`MAX_CHILDREN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChildIndex(u16);

impl ChildIndex {
    /// Wrap a slot number. `None` if it is outside the table.
    pub const fn new(index: u16) -> Option<Self> {
        if index < MAX_CHILDREN { Some(Self(index)) } else { None }
    }

    /// Slot number.
    pub const fn get(self) -> u16 {
        self.0
    }

    fn word_and_bit(self) -> (usize, u64) {
        (usize::from(self.0 / 64), 1u64 << (self.0 % 64))
    }
}

impl fmt::Display for ChildIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-capacity set of child slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildMask {
    words: [u64; MASK_WORDS],
}

impl ChildMask {
    /// Empty mask.
    pub const fn new() -> Self {
        Self { words: [0; MASK_WORDS] }
    }

    /// Slot is a member.
    pub fn contains(&self, index: ChildIndex) -> bool {
        let (word, bit) = index.word_and_bit();
        self.words[word] & bit != 0
    }

    /// Add a slot.
    pub fn insert(&mut self, index: ChildIndex) {
        let (word, bit) = index.word_and_bit();
        self.words[word] |= bit;
    }

    /// Remove a slot.
    pub fn remove(&mut self, index: ChildIndex) {
        let (word, bit) = index.word_and_bit();
        self.words[word] &= !bit;
    }

    /// Remove every slot.
    pub fn clear(&mut self) {
        self.words = [0; MASK_WORDS];
    }

    /// No slot is a member.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Every member of `self` is a member of `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.words.iter().zip(other.words.iter()).all(|(mine, theirs)| mine & !theirs == 0)
    }

    /// No slot is a member of both.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.words.iter().zip(other.words.iter()).all(|(mine, theirs)| mine & theirs == 0)
    }

    /// Members in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = ChildIndex> + '_ {
        (0..MAX_CHILDREN).filter_map(ChildIndex::new).filter(|index| self.contains(*index))
    }
}

/// Change to a child's domain address, reported by the child table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildAddressEvent {
    /// Child registered a domain address
    Added,
    /// Child replaced its domain address
    Changed,
    /// Child dropped its domain address
    Removed,
    /// Child re-reported the same domain address
    Unchanged,
}

/// Effects of a child address event the caller must carry out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyUpdate {
    /// The child had proxy work that was dropped; an in-flight request for it
    /// must be aborted
    pub dropped: bool,
    /// No child was eligible for registration before new work arrived; arm a
    /// check delay so an idle multiplexer picks it up
    pub schedule_check: bool,
}

/// Proxy registration bookkeeping for all children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildProxyRegistry {
    proxy: ChildMask,
    registered: ChildMask,
    backoff: ChildMask,
}

impl ChildProxyRegistry {
    /// Nothing to proxy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Children with a domain address needing proxy registration.
    pub fn proxy_mask(&self) -> &ChildMask {
        &self.proxy
    }

    /// Children whose proxy registration was confirmed.
    pub fn registered_mask(&self) -> &ChildMask {
        &self.registered
    }

    /// Children waiting out a registrar backoff.
    pub fn backoff_mask(&self) -> &ChildMask {
        &self.backoff
    }

    /// Every proxied child is registered.
    pub fn is_settled(&self) -> bool {
        self.proxy == self.registered
    }

    /// Child is tracked, not yet confirmed and not backing off.
    pub fn needs_registration(&self, index: ChildIndex) -> bool {
        self.proxy.contains(index)
            && !self.registered.contains(index)
            && !self.backoff.contains(index)
    }

    /// Some child can be registered right now.
    pub fn has_work(&self) -> bool {
        self.proxy
            .words
            .iter()
            .zip(self.registered.words.iter())
            .zip(self.backoff.words.iter())
            .any(|((proxy, registered), backoff)| proxy & !registered & !backoff != 0)
    }

    /// Apply a child address event.
    pub fn handle_event(&mut self, index: ChildIndex, event: ChildAddressEvent) -> ProxyUpdate {
        let mut update = ProxyUpdate::default();

        if matches!(event, ChildAddressEvent::Removed | ChildAddressEvent::Changed)
            && self.proxy.contains(index)
        {
            update.dropped = true;
            self.drop_child(index);
        }

        let wants_registration = match event {
            ChildAddressEvent::Added | ChildAddressEvent::Changed => true,
            ChildAddressEvent::Unchanged => !self.proxy.contains(index),
            ChildAddressEvent::Removed => false,
        };

        if wants_registration {
            update.schedule_check = !self.has_work();
            self.proxy.insert(index);
            self.registered.remove(index);
            self.backoff.remove(index);
        }

        update
    }

    /// Record a confirmed registration. Ignored unless the child is tracked.
    pub fn mark_registered(&mut self, index: ChildIndex) {
        if self.proxy.contains(index) {
            self.registered.insert(index);
            self.backoff.remove(index);
        }
    }

    /// Skip the child until the next [`Self::reset_registered`]. Ignored
    /// unless the child is tracked and unconfirmed.
    pub fn defer(&mut self, index: ChildIndex) {
        if self.proxy.contains(index) && !self.registered.contains(index) {
            self.backoff.insert(index);
        }
    }

    /// Forget the child entirely.
    pub fn drop_child(&mut self, index: ChildIndex) {
        self.proxy.remove(index);
        self.registered.remove(index);
        self.backoff.remove(index);
    }

    /// Require every tracked child to be registered again, including those
    /// that were backing off.
    pub fn reset_registered(&mut self) {
        self.registered.clear();
        self.backoff.clear();
    }

    /// Make every backing-off child eligible again.
    pub fn release_deferred(&mut self) {
        self.backoff.clear();
    }

    /// Forget every child.
    pub fn clear(&mut self) {
        self.proxy.clear();
        self.registered.clear();
        self.backoff.clear();
    }
}
