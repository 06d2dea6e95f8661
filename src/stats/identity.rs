//! Device identity and username.
//!
//! The device id is 24 random bytes, URL-safe base64 without padding
//! (32 characters), generated once and kept in secure storage. The
//! username is optional, normalized to lowercase ASCII and validated as
//! `[a-z0-9_]{3,20}` before being persisted in regular settings.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::platform::settings::{SecureStorage, Settings, DEVICE_ID_KEY, USERNAME_KEY};

/// Durable device id + optional username.
pub struct IdentityStore {
    settings: Arc<dyn Settings>,
    secure: Arc<dyn SecureStorage>,
}

impl IdentityStore {
    pub fn new(settings: Arc<dyn Settings>, secure: Arc<dyn SecureStorage>) -> Self {
        Self { settings, secure }
    }

    /// The stored device id, generating and persisting one on first use.
    pub fn device_id(&self) -> String {
        if let Some(id) = self.secure.load(DEVICE_ID_KEY) {
            if !id.is_empty() {
                return id;
            }
        }
        let id = generate_device_id();
        self.secure.save(DEVICE_ID_KEY, &id);
        id
    }

    /// Whether a non-empty username is set.
    pub fn has_username(&self) -> bool {
        self.settings.get(USERNAME_KEY).is_some_and(|u| !u.is_empty())
    }

    /// The stored username, if any.
    pub fn username(&self) -> Option<String> {
        self.settings.get(USERNAME_KEY).filter(|u| !u.is_empty())
    }

    /// Normalize to lowercase ASCII, validate, persist. Returns whether the
    /// value was accepted; a rejected value leaves the store unchanged.
    pub fn set_username(&self, username: &str) -> bool {
        let canonical = username.to_ascii_lowercase();
        if !is_valid_username(&canonical) {
            return false;
        }
        self.settings.set(USERNAME_KEY, &canonical);
        true
    }
}

/// 3-20 chars, each in `[a-z0-9_]`.
fn is_valid_username(username: &str) -> bool {
    (3..=20).contains(&username.len())
        && username.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

fn generate_device_id() -> String {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::settings::MemorySettings;

    fn store() -> IdentityStore {
        let settings = Arc::new(MemorySettings::new());
        IdentityStore::new(settings.clone(), settings)
    }

    #[test]
    fn test_device_id_format() {
        let id = store().device_id();
        assert_eq!(id.len(), 32, "24 bytes must encode to 32 chars, got {id:?}");
        assert!(id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        assert!(!id.contains('='));
    }

    #[test]
    fn test_device_id_is_write_once() {
        let store = store();
        let first = store.device_id();
        assert_eq!(store.device_id(), first);
    }

    #[test]
    fn test_distinct_stores_get_distinct_ids() {
        assert_ne!(store().device_id(), store().device_id());
    }

    #[test]
    fn test_username_validation() {
        let store = store();
        assert!(!store.set_username("ab"));
        assert!(!store.set_username("a".repeat(21).as_str()));
        assert!(!store.set_username("with space"));
        assert!(!store.set_username("dash-ed"));
        assert!(!store.set_username("ünïcode"));
        assert!(!store.has_username());

        assert!(store.set_username("abc"));
        assert!(store.set_username("user_42"));
        assert_eq!(store.username(), Some("user_42".to_string()));
    }

    #[test]
    fn test_username_lowercased_before_validation() {
        let store = store();
        assert!(store.set_username("MixedCase_7"));
        assert_eq!(store.username(), Some("mixedcase_7".to_string()));
    }

    #[test]
    fn test_rejected_username_keeps_previous() {
        let store = store();
        assert!(store.set_username("valid_name"));
        assert!(!store.set_username("x"));
        assert_eq!(store.username(), Some("valid_name".to_string()));
    }
}
