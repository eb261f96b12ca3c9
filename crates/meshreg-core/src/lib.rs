//! Domain unicast address registration core logic
//!
//! Registers a mesh device's globally routable domain address with the
//! backbone registrar and, for routers, proxies the same registration on
//! behalf of sleepy children.
//!
//! # Architecture
//!
//! The logic is a single-threaded state machine with no I/O of its own.
//! [`DuaManager`] owns the registration bookkeeping. State transitions read
//! the surroundings through the query traits in [`host`] and produce
//! declarative [`DuaAction`]s (address list updates, sends, persistence, tick
//! subscriptions). The caller is responsible for executing them. Time and
//! randomness come from [`env::Environment`], so the same code runs against
//! the real stack and against the deterministic simulation harness.
//!
//! # Components
//!
//! - [`action`]: effects returned to the caller
//! - [`manager`]: event inputs and the configuration surface
//! - [`client`]: target selection and the single send site
//! - [`dispatch`]: response, timeout and notification handling
//! - [`dua`]: own address state machine and identifier derivation
//! - [`delay`]: the three tick-driven countdowns
//! - [`proxy`]: per-child proxy bookkeeping
//! - [`mod@env`]: environment abstraction (time, RNG)
//! - [`error`]: error types

pub mod action;
pub mod address;
pub mod client;
pub mod config;
pub mod delay;
pub mod dispatch;
pub mod dua;
pub mod env;
pub mod error;
pub mod host;
pub mod iid;
pub mod manager;
pub mod proxy;
pub mod settings;

pub use action::DuaAction;
pub use address::{DomainUnicastAddress, Ip6Prefix, MAX_DOMAIN_PREFIX_LENGTH};
pub use config::DuaConfig;
pub use delay::{DelayKind, DelayState};
pub use dispatch::{NotificationMessage, ResponseMessage};
pub use dua::{DomainAddress, DuaState};
pub use env::Environment;
pub use error::{ConfigError, DuaError, PrefixError, SendError, StorageError, TransportError};
pub use host::{
    AddressTable, BackboneLeader, ChildInfo, ChildTable, Host, MeshLink, PrimaryConfig,
    SettingsStore,
};
pub use manager::{
    DomainPrefixEvent, DuaManager, NotifierEvents, PendingTransaction, PrimaryState,
    RegistrationTarget,
};
pub use proxy::{ChildAddressEvent, ChildIndex, ChildMask, ChildProxyRegistry};
pub use settings::{DadInfo, SettingsKey};
