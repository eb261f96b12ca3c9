//! Delay multiplexer.
//!
//! Three independent countdowns share one periodic tick:
//!
//! - **registration**: own address becomes eligible for registration
//! - **reregistration**: randomized backoff after registrar trouble, and the
//!   periodic refresh requested by the registrar
//! - **check**: speculative re-run of target selection (child updates, retry
//!   after timeout or buffer exhaustion)
//!
//! A request only ever lowers a running countdown, so the earliest deadline
//! wins. The owner subscribes to the tick source while any counter runs.

use tracing::debug;

/// Which countdown a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayKind {
    /// Own address registration delay
    Registration,
    /// Re-registration backoff
    Reregistration,
    /// Speculative attempt delay
    Check,
}

/// Countdowns that expired on one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Registration delay reached zero
    pub registration_expired: bool,
    /// Re-registration delay reached zero
    pub reregistration_expired: bool,
    /// Check delay reached zero
    pub check_expired: bool,
}

impl TickOutcome {
    /// At least one countdown expired, so a registration attempt is due.
    pub fn attempt_due(&self) -> bool {
        self.registration_expired || self.reregistration_expired || self.check_expired
    }
}

/// The three countdowns, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelayState {
    registration: u8,
    reregistration: u16,
    check: u8,
}

impl DelayState {
    /// All counters idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter.
    pub fn get(&self, kind: DelayKind) -> u16 {
        match kind {
            DelayKind::Registration => u16::from(self.registration),
            DelayKind::Reregistration => self.reregistration,
            DelayKind::Check => u16::from(self.check),
        }
    }

    /// Lower the counter to `ticks` if it is idle or currently larger.
    ///
    /// Byte-wide counters saturate at 255. Requesting zero has no effect.
    /// Returns true if the counter changed.
    pub fn request(&mut self, kind: DelayKind, ticks: u16) -> bool {
        if ticks == 0 {
            return false;
        }

        let current = self.get(kind);
        let ticks = match kind {
            DelayKind::Reregistration => ticks,
            DelayKind::Registration | DelayKind::Check => ticks.min(u16::from(u8::MAX)),
        };

        if current != 0 && current <= ticks {
            return false;
        }

        match kind {
            DelayKind::Registration => self.registration = ticks as u8,
            DelayKind::Reregistration => self.reregistration = ticks,
            DelayKind::Check => self.check = ticks as u8,
        }

        debug!(?kind, ticks, "update delay");
        true
    }

    /// No counter is running.
    pub fn is_idle(&self) -> bool {
        self.registration == 0 && self.reregistration == 0 && self.check == 0
    }

    /// Stop every counter.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Stop every counter except `kind`.
    pub fn retain(&mut self, kind: DelayKind) {
        let kept = self.get(kind);
        self.clear();
        self.request(kind, kept);
    }

    /// Advance all running counters by one tick.
    pub fn on_tick(&mut self) -> TickOutcome {
        debug!(
            registration = self.registration,
            reregistration = self.reregistration,
            check = self.check,
            "delay tick"
        );

        TickOutcome {
            registration_expired: countdown_u8(&mut self.registration),
            reregistration_expired: countdown_u16(&mut self.reregistration),
            check_expired: countdown_u8(&mut self.check),
        }
    }
}

fn countdown_u8(counter: &mut u8) -> bool {
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    *counter == 0
}

fn countdown_u16(counter: &mut u16) -> bool {
    if *counter == 0 {
        return false;
    }
    *counter -= 1;
    *counter == 0
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn request_arms_idle_counter() {
        let mut delays = DelayState::new();
        assert!(delays.is_idle());

        assert!(delays.request(DelayKind::Check, 5));
        assert_eq!(delays.get(DelayKind::Check), 5);
        assert!(!delays.is_idle());
    }

    #[test]
    fn request_only_lowers() {
        let mut delays = DelayState::new();
        delays.request(DelayKind::Reregistration, 10);

        assert!(!delays.request(DelayKind::Reregistration, 20));
        assert_eq!(delays.get(DelayKind::Reregistration), 10);

        assert!(delays.request(DelayKind::Reregistration, 3));
        assert_eq!(delays.get(DelayKind::Reregistration), 3);
    }

    #[test]
    fn zero_request_is_ignored() {
        let mut delays = DelayState::new();
        delays.request(DelayKind::Registration, 4);
        assert!(!delays.request(DelayKind::Registration, 0));
        assert_eq!(delays.get(DelayKind::Registration), 4);
    }

    #[test]
    fn byte_counters_saturate() {
        let mut delays = DelayState::new();
        delays.request(DelayKind::Registration, 1000);
        assert_eq!(delays.get(DelayKind::Registration), 255);

        delays.request(DelayKind::Reregistration, 1000);
        assert_eq!(delays.get(DelayKind::Reregistration), 1000);
    }

    #[test]
    fn simultaneous_expiry_reported_together() {
        let mut delays = DelayState::new();
        delays.request(DelayKind::Registration, 2);
        delays.request(DelayKind::Check, 2);
        delays.request(DelayKind::Reregistration, 3);

        let first = delays.on_tick();
        assert!(!first.attempt_due());

        let second = delays.on_tick();
        assert!(second.registration_expired);
        assert!(second.check_expired);
        assert!(!second.reregistration_expired);

        let third = delays.on_tick();
        assert_eq!(
            third,
            TickOutcome { reregistration_expired: true, ..TickOutcome::default() }
        );
        assert!(delays.is_idle());

        assert!(!delays.on_tick().attempt_due());
    }

    #[test]
    fn clear_stops_everything() {
        let mut delays = DelayState::new();
        delays.request(DelayKind::Registration, 1);
        delays.request(DelayKind::Check, 1);
        delays.clear();
        assert!(delays.is_idle());
        assert!(!delays.on_tick().attempt_due());
    }

    #[test]
    fn retain_keeps_one_counter() {
        let mut delays = DelayState::new();
        delays.request(DelayKind::Registration, 2);
        delays.request(DelayKind::Reregistration, 40);
        delays.request(DelayKind::Check, 3);

        delays.retain(DelayKind::Reregistration);
        assert_eq!(delays.get(DelayKind::Registration), 0);
        assert_eq!(delays.get(DelayKind::Check), 0);
        assert_eq!(delays.get(DelayKind::Reregistration), 40);

        delays.retain(DelayKind::Check);
        assert!(delays.is_idle());
    }

    fn kind_strategy() -> impl Strategy<Value = DelayKind> {
        prop_oneof![
            Just(DelayKind::Registration),
            Just(DelayKind::Reregistration),
            Just(DelayKind::Check),
        ]
    }

    proptest! {
        /// A running counter is never raised by a request.
        #[test]
        fn prop_requests_never_raise(
            requests in prop::collection::vec((kind_strategy(), 0..400u16), 1..40)
        ) {
            let mut delays = DelayState::new();
            for (kind, ticks) in requests {
                let before = delays.get(kind);
                delays.request(kind, ticks);
                let after = delays.get(kind);

                if before != 0 {
                    prop_assert!(after <= before);
                }
                if ticks != 0 {
                    prop_assert!(after != 0);
                    prop_assert!(after <= ticks);
                }
            }
        }

        /// The idle flag tracks whether any counter is running.
        #[test]
        fn prop_idle_matches_counters(
            ops in prop::collection::vec(prop::option::of((kind_strategy(), 0..8u16)), 0..60)
        ) {
            let mut delays = DelayState::new();
            for op in ops {
                match op {
                    Some((kind, ticks)) => { delays.request(kind, ticks); },
                    None => { delays.on_tick(); },
                }
                let any_running = [DelayKind::Registration, DelayKind::Reregistration, DelayKind::Check]
                    .iter()
                    .any(|kind| delays.get(*kind) != 0);
                prop_assert_eq!(delays.is_idle(), !any_running);
            }
        }
    }
}
