//! Own domain unicast address state machine.
//!
//! # State Machine
//!
//! ```text
//!                 prefix added / refreshed
//! ┌────────┐      (iid derived, address added)     ┌─────────────────────┐
//! │ Absent │──────────────────────────────────────>│ PendingRegistration │<─────┐
//! └────────┘                                       └─────────────────────┘      │
//!     ^                                                   │ request sent        │ ReRegister /
//!     │ prefix removed, Invalid,                          ↓                     │ timeout /
//!     │ stale network data,                        ┌──────────┐   Success  ┌───────────┐
//!     │ failed regeneration                        │ InFlight │──────────>│ Confirmed │
//!     └────────────────────────────────────────────└──────────┘           └───────────┘
//! ```
//!
//! The address is in the interface address list exactly when the state is not
//! [`DuaState::Absent`]; the actions from [`DomainAddress::add`] and
//! [`DomainAddress::remove`] are the only places either side changes.

use std::{
    fmt,
    time::{Duration, Instant},
};

use meshreg_proto::InterfaceIdentifier;
use tracing::{info, warn};

use crate::{
    action::DuaAction,
    address::{DomainUnicastAddress, Ip6Prefix, MAX_DOMAIN_PREFIX_LENGTH},
    env::Environment,
    error::DuaError,
    host::{AddressTable, MeshLink, SettingsStore},
    iid::generate_opaque_iid,
    settings::{DadInfo, load_or_create_iid_secret},
};

/// Lifecycle of the own domain address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DuaState {
    /// No address assigned
    Absent,
    /// Assigned, waiting to be registered
    PendingRegistration,
    /// Registration request outstanding
    InFlight,
    /// Registrar accepted the address
    Confirmed,
}

impl fmt::Display for DuaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "Absent",
            Self::PendingRegistration => "PendingRegistration",
            Self::InFlight => "InFlight",
            Self::Confirmed => "Confirmed",
        };
        f.write_str(name)
    }
}

/// The own domain address and everything needed to (re)derive it.
#[derive(Debug, Clone)]
pub struct DomainAddress {
    address: DomainUnicastAddress,
    prefix: Option<Ip6Prefix>,
    state: DuaState,
    dad_counter: u8,
    fixed_iid: Option<InterfaceIdentifier>,
    last_registration: Option<Instant>,
}

impl Default for DomainAddress {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainAddress {
    /// Absent address with a zero DAD counter.
    pub fn new() -> Self {
        Self {
            address: DomainUnicastAddress::unspecified(),
            prefix: None,
            state: DuaState::Absent,
            dad_counter: 0,
            fixed_iid: None,
            last_registration: None,
        }
    }

    /// Load the persisted DAD counter. A missing record keeps zero.
    pub fn restore<S: SettingsStore + ?Sized>(&mut self, store: &S) {
        match DadInfo::load(store) {
            Ok(Some(info)) => self.dad_counter = info.dad_counter,
            Ok(None) => {},
            Err(e) => warn!(error = %e, "failed to restore DAD counter"),
        }
    }

    /// Current state.
    pub fn state(&self) -> DuaState {
        self.state
    }

    /// Current address (unspecified until a prefix was assigned).
    pub fn address(&self) -> &DomainUnicastAddress {
        &self.address
    }

    /// Persisted duplicate counter.
    pub fn dad_counter(&self) -> u8 {
        self.dad_counter
    }

    /// Operator-fixed identifier, if set.
    pub fn fixed_iid(&self) -> Option<InterfaceIdentifier> {
        self.fixed_iid
    }

    /// Time of the last registration attempt or confirmation.
    pub fn last_registration(&self) -> Option<Instant> {
        self.last_registration
    }

    /// Address is currently in the interface address list.
    pub fn is_live<A: AddressTable + ?Sized>(&self, table: &A) -> bool {
        table.has_unicast_address(&self.address.address)
    }

    /// Adopt `prefix`, clearing the identifier part.
    ///
    /// Prefixes longer than [`MAX_DOMAIN_PREFIX_LENGTH`] are refused and the
    /// previous prefix is kept.
    pub fn assign_prefix(&mut self, prefix: &Ip6Prefix) -> Result<(), DuaError> {
        if prefix.length() > MAX_DOMAIN_PREFIX_LENGTH {
            return Err(DuaError::UnsupportedPrefix(*prefix));
        }

        self.prefix = Some(*prefix);
        self.address.address = prefix.network();
        self.address.prefix_length = prefix.length();
        Ok(())
    }

    /// Fill in the identifier: the fixed one if configured, else a generated
    /// one. Generation may advance and persist the DAD counter.
    pub fn derive_iid<H>(&mut self, host: &H, actions: &mut Vec<DuaAction>) -> Result<(), DuaError>
    where
        H: Environment + MeshLink + SettingsStore + ?Sized,
    {
        match self.fixed_iid {
            Some(iid) => {
                self.set_iid(&iid);
                Ok(())
            },
            None => self.generate_iid(host, actions),
        }
    }

    /// Generate an opaque identifier from the current prefix.
    pub fn generate_iid<H>(
        &mut self,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) -> Result<(), DuaError>
    where
        H: Environment + MeshLink + SettingsStore + ?Sized,
    {
        let result = self.try_generate_iid(host, actions);
        if let Err(e) = &result {
            warn!(error = %e, "failed to generate DUA");
        }
        result
    }

    fn try_generate_iid<H>(
        &mut self,
        host: &H,
        actions: &mut Vec<DuaAction>,
    ) -> Result<(), DuaError>
    where
        H: Environment + MeshLink + SettingsStore + ?Sized,
    {
        let prefix = self.prefix.ok_or(DuaError::NoDomainPrefix)?;
        let secret = load_or_create_iid_secret(host, actions)?;

        let mut counter = self.dad_counter;
        let iid = generate_opaque_iid(&prefix, &host.network_id(), &mut counter, &secret)?;
        self.set_iid(&iid);

        if counter != self.dad_counter {
            self.dad_counter = counter;
            self.store(actions);
        }

        info!(dua = %self.address.address, "generated DUA");
        Ok(())
    }

    fn set_iid(&mut self, iid: &InterfaceIdentifier) {
        if let Some(address) = self.prefix.and_then(|prefix| prefix.with_iid(iid)) {
            self.address.address = address;
        }
    }

    /// Queue the address for registration, returning the action that
    /// assigns it to the interface.
    pub fn add(&mut self, now: Instant) -> DuaAction {
        self.state = DuaState::PendingRegistration;
        self.last_registration = Some(now);
        DuaAction::AddAddress(self.address)
    }

    /// Forget the address, returning the action that withdraws it from the
    /// interface.
    pub fn remove(&mut self) -> DuaAction {
        self.state = DuaState::Absent;
        self.address.preferred = false;
        DuaAction::RemoveAddress(self.address.address)
    }

    /// A request for the address was handed to the transport.
    pub fn mark_in_flight(&mut self, now: Instant) {
        self.state = DuaState::InFlight;
        self.last_registration = Some(now);
    }

    /// Registrar accepted the address.
    pub fn confirm(&mut self, now: Instant) {
        self.state = DuaState::Confirmed;
        self.last_registration = Some(now);
    }

    /// The outstanding request ended without a verdict.
    pub fn revert_in_flight(&mut self) {
        if self.state == DuaState::InFlight {
            self.state = DuaState::PendingRegistration;
        }
    }

    /// Periodic re-registration: any assigned address goes back to pending.
    pub fn requeue(&mut self) {
        if self.state != DuaState::Absent {
            self.state = DuaState::PendingRegistration;
        }
    }

    /// Mark the address preferred once it outlived the DAD period.
    pub fn refresh_preferred(&mut self, now: Instant, dad_period: Duration) -> Option<DuaAction> {
        if self.state == DuaState::Absent || self.address.preferred {
            return None;
        }

        let survived = self
            .last_registration
            .is_some_and(|last| now.saturating_duration_since(last) > dad_period);
        if !survived {
            return None;
        }

        self.address.preferred = true;
        Some(DuaAction::MarkPreferred(self.address.address))
    }

    /// Count one more confirmed duplicate and persist it.
    pub fn bump_dad_counter(&mut self, actions: &mut Vec<DuaAction>) {
        self.dad_counter = self.dad_counter.wrapping_add(1);
        self.store(actions);
    }

    /// Set the fixed identifier. Returns true if it changed.
    pub fn set_fixed_iid(&mut self, iid: InterfaceIdentifier) -> bool {
        if self.fixed_iid == Some(iid) {
            return false;
        }
        self.fixed_iid = Some(iid);
        true
    }

    /// Forget the fixed identifier, returning it.
    pub fn take_fixed_iid(&mut self) -> Option<InterfaceIdentifier> {
        self.fixed_iid.take()
    }

    /// Overwrite the identifier with `iid` without touching the state.
    pub fn apply_iid(&mut self, iid: &InterfaceIdentifier) {
        self.set_iid(iid);
    }

    fn store(&self, actions: &mut Vec<DuaAction>) {
        match (DadInfo { dad_counter: self.dad_counter }).save() {
            Ok(action) => actions.push(action),
            Err(e) => warn!(error = %e, "failed to store DAD counter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        net::Ipv6Addr,
        time::{Duration, Instant},
    };

    use super::*;

    #[derive(Default)]
    struct Table {
        addresses: BTreeMap<Ipv6Addr, bool>,
    }

    impl Table {
        fn execute(&mut self, action: DuaAction) {
            match action {
                DuaAction::AddAddress(address) => {
                    self.addresses.insert(address.address, address.preferred);
                },
                DuaAction::RemoveAddress(address) => {
                    self.addresses.remove(&address);
                },
                DuaAction::MarkPreferred(address) => {
                    if let Some(flag) = self.addresses.get_mut(&address) {
                        *flag = true;
                    }
                },
                _ => {},
            }
        }
    }

    impl AddressTable for Table {
        fn has_unicast_address(&self, addr: &Ipv6Addr) -> bool {
            self.addresses.contains_key(addr)
        }
    }

    fn prefix(text: &str) -> Ip6Prefix {
        text.parse().unwrap()
    }

    fn assigned(table: &mut Table, now: Instant) -> DomainAddress {
        let mut dua = DomainAddress::new();
        dua.assign_prefix(&prefix("2001:db8::/64")).unwrap();
        dua.apply_iid(&InterfaceIdentifier::from(0x1234));
        table.execute(dua.add(now));
        dua
    }

    #[test]
    fn add_and_remove_track_live_set() {
        let mut table = Table::default();
        let mut dua = assigned(&mut table, Instant::now());

        assert_eq!(dua.state(), DuaState::PendingRegistration);
        assert!(dua.is_live(&table));
        assert_eq!(dua.address().address, "2001:db8::1234".parse::<Ipv6Addr>().unwrap());

        table.execute(dua.remove());
        assert_eq!(dua.state(), DuaState::Absent);
        assert!(!dua.is_live(&table));
    }

    #[test]
    fn iid_without_prefix_is_ignored() {
        let mut dua = DomainAddress::new();
        dua.apply_iid(&InterfaceIdentifier::from(0x1234));
        assert_eq!(dua.address().address, Ipv6Addr::UNSPECIFIED);
    }

    #[test]
    fn prefix_longer_than_64_is_refused() {
        let mut dua = DomainAddress::new();
        dua.assign_prefix(&prefix("2001:db8::/64")).unwrap();

        let long = prefix("2001:db8:0:0:abcd::/80");
        assert_eq!(dua.assign_prefix(&long), Err(DuaError::UnsupportedPrefix(long)));
        assert_eq!(dua.address().prefix_length, 64);
        assert_eq!(dua.state(), DuaState::Absent);
    }

    #[test]
    fn revert_only_affects_in_flight() {
        let mut table = Table::default();
        let now = Instant::now();
        let mut dua = assigned(&mut table, now);

        dua.confirm(now);
        dua.revert_in_flight();
        assert_eq!(dua.state(), DuaState::Confirmed);

        dua.mark_in_flight(now);
        dua.revert_in_flight();
        assert_eq!(dua.state(), DuaState::PendingRegistration);
    }

    #[test]
    fn requeue_skips_absent() {
        let mut dua = DomainAddress::new();
        dua.requeue();
        assert_eq!(dua.state(), DuaState::Absent);

        let mut table = Table::default();
        let now = Instant::now();
        let mut dua = assigned(&mut table, now);
        dua.confirm(now);
        dua.requeue();
        assert_eq!(dua.state(), DuaState::PendingRegistration);
    }

    #[test]
    fn preferred_after_dad_period() {
        let mut table = Table::default();
        let start = Instant::now();
        let mut dua = assigned(&mut table, start);
        let period = Duration::from_secs(100);
        dua.confirm(start);

        assert_eq!(dua.refresh_preferred(start + period, period), None);
        assert!(!dua.address().preferred);

        let action = dua.refresh_preferred(start + period + Duration::from_secs(1), period);
        assert_eq!(action, Some(DuaAction::MarkPreferred(dua.address().address)));
        table.execute(action.unwrap());
        assert!(dua.address().preferred);
        assert_eq!(table.addresses.get(&dua.address().address), Some(&true));

        assert_eq!(dua.refresh_preferred(start + period * 2, period), None);
    }

    #[test]
    fn dad_counter_bump_saves_record() {
        let mut dua = DomainAddress::new();
        let mut actions = Vec::new();
        dua.bump_dad_counter(&mut actions);

        assert_eq!(dua.dad_counter(), 1);
        assert!(matches!(
            actions.as_slice(),
            [DuaAction::SaveSetting { key: crate::settings::SettingsKey::DadInfo, .. }]
        ));
    }

    #[test]
    fn fixed_iid_change_detection() {
        let mut dua = DomainAddress::new();
        let iid = InterfaceIdentifier::from(0x42);

        assert!(dua.set_fixed_iid(iid));
        assert!(!dua.set_fixed_iid(iid));
        assert_eq!(dua.take_fixed_iid(), Some(iid));
        assert_eq!(dua.fixed_iid(), None);
    }
}
