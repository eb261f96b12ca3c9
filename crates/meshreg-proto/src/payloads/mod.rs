//! Message bodies exchanged with the primary registrar.

pub mod dua;

pub use dua::{DuaNotification, DuaRequest, DuaResponse};
