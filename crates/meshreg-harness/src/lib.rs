//! Deterministic simulation harness for domain address registration.
//!
//! An in-memory stack answering the manager's queries and executing its
//! actions, a scripted backbone registrar, and a [`World`] that drives a
//! [`meshreg_core::DuaManager`] through seeded, reproducible scenarios.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod registrar;
pub mod scenario;
pub mod sim_env;
pub mod sim_host;

pub use registrar::{ScriptedRegistrar, Verdict};
pub use scenario::{Operation, World};
pub use sim_env::SimEnv;
pub use sim_host::{Role, SentNotification, SentRequest, SimHost};
