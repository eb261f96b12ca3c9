//! Persisted registration records.
//!
//! Two records survive restarts: the DAD counter (so a regenerated address
//! stays distinct from the one rejected before the reboot) and the secret key
//! behind opaque identifier generation.

use serde::{Deserialize, Serialize};

use crate::{
    action::DuaAction,
    env::Environment,
    error::DuaError,
    host::SettingsStore,
    iid::{IID_SECRET_KEY_SIZE, IidSecretKey},
};

/// Keys of the records owned by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingsKey {
    /// [`DadInfo`], CBOR encoded
    DadInfo,
    /// Raw [`IidSecretKey`] bytes
    IidSecretKey,
}

/// Duplicate-address-detection bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DadInfo {
    /// Number of confirmed duplicates of the own domain address
    pub dad_counter: u8,
}

impl DadInfo {
    /// Read the record. `Ok(None)` if it was never saved.
    pub fn load<S: SettingsStore + ?Sized>(store: &S) -> Result<Option<Self>, DuaError> {
        let Some(bytes) = store.read(SettingsKey::DadInfo)? else {
            return Ok(None);
        };

        ciborium::de::from_reader(bytes.as_slice())
            .map(Some)
            .map_err(|e| DuaError::Record(e.to_string()))
    }

    /// Action writing the record.
    pub fn save(&self) -> Result<DuaAction, DuaError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes).map_err(|e| DuaError::Record(e.to_string()))?;
        Ok(DuaAction::SaveSetting { key: SettingsKey::DadInfo, value: bytes })
    }
}

/// Read the identifier secret, creating a fresh one if absent.
///
/// A created secret is used right away; saving it is pushed onto `actions`.
pub fn load_or_create_iid_secret<H>(
    host: &H,
    actions: &mut Vec<DuaAction>,
) -> Result<IidSecretKey, DuaError>
where
    H: SettingsStore + Environment + ?Sized,
{
    if let Some(bytes) = host.read(SettingsKey::IidSecretKey)? {
        let bytes = <[u8; IID_SECRET_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
            DuaError::Record(format!("secret key has {} bytes", bytes.len()))
        })?;
        return Ok(IidSecretKey::from_bytes(bytes));
    }

    let mut bytes = [0u8; IID_SECRET_KEY_SIZE];
    host.random_bytes(&mut bytes);
    actions.push(DuaAction::SaveSetting { key: SettingsKey::IidSecretKey, value: bytes.to_vec() });
    Ok(IidSecretKey::from_bytes(bytes))
}
