//! SQL-backed per-feature coverage store (`street_stats.db`).
//!
//! Holds the per-(mwm, feature) pixel-coverage bitmasks and the processed
//! track fingerprints. One store per process; all access is serialized by
//! an internal mutex. Bulk writers use [`StreetStatsDb::with_transaction`],
//! which hands the closure a guard exposing the same operations so nested
//! calls run inside one `BEGIN`/`COMMIT`.
//!
//! The per-feature bitmask is a little-endian bit array indexed by
//! `floor(distance_along_feature_m / segment_length_m)`; a set bit means
//! that segment of the road has been visited.
//!
//! SQL failures are logged and degrade to "row absent": the engine
//! tolerates missing per-feature rows.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mwms (
  mwm_id INTEGER PRIMARY KEY,
  mwm_name TEXT UNIQUE NOT NULL);

CREATE TABLE IF NOT EXISTS street_exploration (
  mwm_id INTEGER,
  feature_index INTEGER,
  pixel_bitmask BLOB,
  PRIMARY KEY (mwm_id, feature_index));

CREATE TABLE IF NOT EXISTS processed_tracks (
  geometry_hash INTEGER,
  country_id TEXT,
  PRIMARY KEY (geometry_hash, country_id));
";

/// Process-wide street stats database.
pub struct StreetStatsDb {
    conn: Mutex<Connection>,
}

/// Transaction guard passed to [`StreetStatsDb::with_transaction`] closures.
pub struct StatsDbTxn<'a> {
    conn: &'a Connection,
}

impl StreetStatsDb {
    /// Open (or create) the database file and initialize the schema.
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Initializing street stats database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory database, used by the test harness.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Fetch the coverage bitmask for a feature, or `None` when no row
    /// exists (or the query fails).
    pub fn get_bitmask(&self, mwm_name: &str, feature_index: u32) -> Option<Vec<u8>> {
        let conn = self.conn.lock();
        StatsDbTxn { conn: &conn }.get_bitmask(mwm_name, feature_index)
    }

    /// Insert-or-replace the coverage bitmask for a feature.
    pub fn save_bitmask(&self, mwm_name: &str, feature_index: u32, bitmask: &[u8]) {
        let conn = self.conn.lock();
        StatsDbTxn { conn: &conn }.save_bitmask(mwm_name, feature_index, bitmask);
    }

    /// Cascade-delete all rows for an uninstalled map.
    pub fn delete_mwm_data(&self, mwm_name: &str) {
        let conn = self.conn.lock();
        let found: rusqlite::Result<Option<i64>> = conn
            .query_row("SELECT mwm_id FROM mwms WHERE mwm_name = ?1", params![mwm_name], |r| r.get(0))
            .optional();
        let Ok(Some(mwm_id)) = found else { return };

        if let Err(e) = conn.execute("DELETE FROM street_exploration WHERE mwm_id = ?1", params![mwm_id]) {
            log::error!("Failed to delete exploration rows for {mwm_name}: {e}");
        }
        if let Err(e) = conn.execute("DELETE FROM mwms WHERE mwm_id = ?1", params![mwm_id]) {
            log::error!("Failed to delete mwm row for {mwm_name}: {e}");
        }
    }

    /// Whether a track geometry hash has been processed for a region.
    pub fn is_track_processed(&self, geometry_hash: i64, country_id: &str) -> bool {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT 1 FROM processed_tracks WHERE geometry_hash = ?1 AND country_id = ?2",
            params![geometry_hash, country_id],
            |_| Ok(()),
        )
        .optional()
        .unwrap_or_else(|e| {
            log::error!("Processed-track lookup failed: {e}");
            None
        })
        .is_some()
    }

    /// Record a processed track geometry hash for a region.
    pub fn mark_track_processed(&self, geometry_hash: i64, country_id: &str) {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute(
            "INSERT OR IGNORE INTO processed_tracks (geometry_hash, country_id) VALUES (?1, ?2)",
            params![geometry_hash, country_id],
        ) {
            log::error!("Failed to mark track processed: {e}");
        }
    }

    /// Run `f` inside one transaction. Nested store operations go through
    /// the guard, so bulk derivation amortizes commits.
    pub fn with_transaction<R>(&self, f: impl FnOnce(&StatsDbTxn<'_>) -> R) -> R {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute_batch("BEGIN") {
            log::error!("Failed to begin transaction: {e}");
        }
        let result = f(&StatsDbTxn { conn: &conn });
        if let Err(e) = conn.execute_batch("COMMIT") {
            log::error!("Failed to commit transaction: {e}");
        }
        result
    }
}

impl StatsDbTxn<'_> {
    fn mwm_id(&self, mwm_name: &str) -> Option<i64> {
        let found = self
            .conn
            .query_row("SELECT mwm_id FROM mwms WHERE mwm_name = ?1", params![mwm_name], |r| r.get(0))
            .optional();
        match found {
            Ok(Some(id)) => return Some(id),
            Ok(None) => {}
            Err(e) => {
                log::error!("Mwm lookup failed for {mwm_name}: {e}");
                return None;
            }
        }
        match self.conn.execute("INSERT INTO mwms (mwm_name) VALUES (?1)", params![mwm_name]) {
            Ok(_) => Some(self.conn.last_insert_rowid()),
            Err(e) => {
                log::error!("Failed to insert mwm name {mwm_name}: {e}");
                None
            }
        }
    }

    /// Fetch the coverage bitmask for a feature.
    pub fn get_bitmask(&self, mwm_name: &str, feature_index: u32) -> Option<Vec<u8>> {
        let mwm_id = self.mwm_id(mwm_name)?;
        self.conn
            .query_row(
                "SELECT pixel_bitmask FROM street_exploration WHERE mwm_id = ?1 AND feature_index = ?2",
                params![mwm_id, feature_index],
                |r| r.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                log::error!("Bitmask fetch failed for {mwm_name}/{feature_index}: {e}");
                None
            })
    }

    /// Insert-or-replace the coverage bitmask for a feature.
    pub fn save_bitmask(&self, mwm_name: &str, feature_index: u32, bitmask: &[u8]) {
        let Some(mwm_id) = self.mwm_id(mwm_name) else { return };
        if let Err(e) = self.conn.execute(
            "INSERT OR REPLACE INTO street_exploration (mwm_id, feature_index, pixel_bitmask) VALUES (?1, ?2, ?3)",
            params![mwm_id, feature_index, bitmask],
        ) {
            log::error!("Failed to save bitmask for {mwm_name}/{feature_index}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmask_roundtrip() {
        let db = StreetStatsDb::open_in_memory().unwrap();
        assert_eq!(db.get_bitmask("Georgia", 7), None);

        db.save_bitmask("Georgia", 7, &[0b101, 0xff]);
        assert_eq!(db.get_bitmask("Georgia", 7), Some(vec![0b101, 0xff]));

        // Replace.
        db.save_bitmask("Georgia", 7, &[0b111]);
        assert_eq!(db.get_bitmask("Georgia", 7), Some(vec![0b111]));
    }

    #[test]
    fn test_mwms_are_independent() {
        let db = StreetStatsDb::open_in_memory().unwrap();
        db.save_bitmask("Georgia", 1, &[1]);
        db.save_bitmask("Armenia", 1, &[2]);
        assert_eq!(db.get_bitmask("Georgia", 1), Some(vec![1]));
        assert_eq!(db.get_bitmask("Armenia", 1), Some(vec![2]));
    }

    #[test]
    fn test_delete_mwm_data() {
        let db = StreetStatsDb::open_in_memory().unwrap();
        db.save_bitmask("Georgia", 1, &[1]);
        db.save_bitmask("Georgia", 2, &[2]);
        db.save_bitmask("Armenia", 1, &[3]);

        db.delete_mwm_data("Georgia");
        assert_eq!(db.get_bitmask("Georgia", 1), None);
        assert_eq!(db.get_bitmask("Georgia", 2), None);
        assert_eq!(db.get_bitmask("Armenia", 1), Some(vec![3]));
    }

    #[test]
    fn test_processed_tracks() {
        let db = StreetStatsDb::open_in_memory().unwrap();
        assert!(!db.is_track_processed(0x1234, "Georgia"));

        db.mark_track_processed(0x1234, "Georgia");
        assert!(db.is_track_processed(0x1234, "Georgia"));
        assert!(!db.is_track_processed(0x1234, "Armenia"));

        // Idempotent.
        db.mark_track_processed(0x1234, "Georgia");
        assert!(db.is_track_processed(0x1234, "Georgia"));
    }

    #[test]
    fn test_transaction_groups_writes() {
        let db = StreetStatsDb::open_in_memory().unwrap();
        db.with_transaction(|txn| {
            for i in 0..10u32 {
                txn.save_bitmask("Georgia", i, &[i as u8]);
            }
        });
        for i in 0..10u32 {
            assert_eq!(db.get_bitmask("Georgia", i), Some(vec![i as u8]));
        }
    }

    #[test]
    fn test_persists_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("street_stats.db");
        {
            let db = StreetStatsDb::open(&path).unwrap();
            db.save_bitmask("Georgia", 3, &[9]);
        }
        let db = StreetStatsDb::open(&path).unwrap();
        assert_eq!(db.get_bitmask("Georgia", 3), Some(vec![9]));
    }
}
