//! Settings and secure storage seams.
//!
//! The engine persists a handful of keys (`Explore.SharingEnabled`,
//! `Explore.Username`, `Explore.DeviceId`) through these traits so the host
//! platform can route them to its own settings store and keychain. The
//! file-backed implementation keeps a JSON map on disk; the in-memory one
//! backs tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;

/// Key of the stats sharing toggle.
pub const SHARING_ENABLED_KEY: &str = "Explore.SharingEnabled";
/// Key of the public username.
pub const USERNAME_KEY: &str = "Explore.Username";
/// Secure storage key of the device id.
pub const DEVICE_ID_KEY: &str = "Explore.DeviceId";

/// Plain key/value settings store.
pub trait Settings: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);

    /// Boolean view over a key ("1"/"0").
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.set(key, if value { "1" } else { "0" });
    }
}

/// Key/value store backed by the platform keychain.
pub trait SecureStorage: Send + Sync {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, value: &str);
}

/// In-memory store for tests; implements both seams.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Settings for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }
}

impl SecureStorage for MemorySettings {
    fn load(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    fn save(&self, key: &str, value: &str) {
        self.set(key, value);
    }
}

/// JSON-file-backed store. Every write rewrites the file; reads come from
/// the in-memory map loaded at construction.
pub struct FileSettings {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileSettings {
    /// Open the store, loading any existing file. A malformed file is
    /// treated as empty.
    pub fn open(path: PathBuf) -> Self {
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(|| {
                log::info!("No settings at {}", path.display());
                HashMap::new()
            });
        Self { path, values: Mutex::new(values) }
    }

    fn persist(&self, values: &HashMap<String, String>) {
        match serde_json::to_string_pretty(values) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    log::warn!("Failed to write settings {}: {e}", self.path.display());
                }
            }
            Err(e) => log::warn!("Failed to serialize settings: {e}"),
        }
    }
}

impl Settings for FileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values);
    }
}

impl SecureStorage for FileSettings {
    fn load(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    fn save(&self, key: &str, value: &str) {
        self.set(key, value);
    }
}
