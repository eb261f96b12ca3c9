//! Registration timing configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Timing knobs for the registration manager.
///
/// Delays are counted in ticks of the shared one-second tick source.
#[derive(Debug, Clone)]
pub struct DuaConfig {
    /// Delay after a new domain address appears before registering it
    pub new_dua_registration_delay: u8,
    /// Delay after becoming a router, to let links to neighbors settle
    pub new_router_registration_delay: u8,
    /// Retry delay when no message buffer was available
    pub no_buf_delay: u8,
    /// Retry delay after a response timeout
    pub response_timeout_delay: u8,
    /// Upper bound (exclusive) of the jitter applied before proxying new
    /// child registrations, so children attaching together are batched
    pub parent_aggregate_delay: u8,
    /// Time a registered address must survive before it becomes preferred
    pub dad_period: Duration,
    /// Register domain addresses on behalf of sleepy children
    pub proxy_enabled: bool,
}

impl Default for DuaConfig {
    fn default() -> Self {
        Self {
            new_dua_registration_delay: 1,
            new_router_registration_delay: 3,
            no_buf_delay: 5,
            response_timeout_delay: 30,
            parent_aggregate_delay: 5,
            dad_period: Duration::from_secs(100),
            proxy_enabled: true,
        }
    }
}

impl DuaConfig {
    /// Configuration for a device that never proxies children.
    pub fn end_device() -> Self {
        Self { proxy_enabled: false, ..Self::default() }
    }

    /// Check that every delay can actually arm its countdown.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let delays = [
            ("new_dua_registration_delay", self.new_dua_registration_delay),
            ("new_router_registration_delay", self.new_router_registration_delay),
            ("no_buf_delay", self.no_buf_delay),
            ("response_timeout_delay", self.response_timeout_delay),
            ("parent_aggregate_delay", self.parent_aggregate_delay),
        ];

        if let Some(&(name, _)) = delays.iter().find(|(_, ticks)| *ticks == 0) {
            return Err(ConfigError::ZeroDelay { name });
        }

        if self.dad_period.is_zero() {
            return Err(ConfigError::ZeroDadPeriod);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(DuaConfig::default().validate(), Ok(()));
        assert_eq!(DuaConfig::end_device().validate(), Ok(()));
        assert!(!DuaConfig::end_device().proxy_enabled);
    }

    #[test]
    fn zero_delay_rejected() {
        let config = DuaConfig { no_buf_delay: 0, ..DuaConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDelay { name: "no_buf_delay" }));
    }

    #[test]
    fn zero_dad_period_rejected() {
        let config = DuaConfig { dad_period: Duration::ZERO, ..DuaConfig::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDadPeriod));
    }
}
