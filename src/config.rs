//! Engine and stats configuration.
//!
//! All values are tunable per build but fixed at runtime. Defaults carry the
//! production constants; tests shrink the timing values.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the exploration engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the per-region `.pix` / `.pixa` / `.pixf` files
    /// and the stats database.
    pub data_dir: PathBuf,
    /// Road subdivision step for derivation and per-feature coverage
    /// bitmasks (meters).
    pub segment_length_m: f64,
    /// Radius marked as explored around a position (meters).
    pub explore_radius_m: f64,
    /// Sampling step along recorded tracks (meters).
    pub track_sample_step_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            segment_length_m: 15.0,
            explore_radius_m: 20.0,
            track_sample_step_m: 10.0,
        }
    }
}

impl EngineConfig {
    /// Explore radius in radians on the spherical Earth model.
    pub fn explore_radius_rad(&self) -> f64 {
        self.explore_radius_m / crate::core::math::EARTH_RADIUS_M
    }

    /// Path of the pixel file for a region.
    pub fn pix_path(&self, region: &str) -> PathBuf {
        self.data_dir.join(format!("{region}.pix"))
    }

    /// Path of the accounted-bits file for a region.
    pub fn pixa_path(&self, region: &str) -> PathBuf {
        self.data_dir.join(format!("{region}.pixa"))
    }

    /// Path of the explored-fractions file for a region.
    pub fn pixf_path(&self, region: &str) -> PathBuf {
        self.data_dir.join(format!("{region}.pixf"))
    }

    /// Path of the street stats database.
    pub fn stats_db_path(&self) -> PathBuf {
        self.data_dir.join("street_stats.db")
    }
}

/// Configuration for the stats service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Path of the JSON stats snapshot.
    pub stats_file: PathBuf,
    /// Debounce window between a change and the snapshot save.
    #[serde(with = "duration_secs")]
    pub save_debounce: Duration,
    /// Period of the conditional upload check.
    #[serde(with = "duration_secs")]
    pub upload_period: Duration,
    /// Upload endpoint.
    pub server_url: String,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            stats_file: PathBuf::from("explore_stats.json"),
            save_debounce: Duration::from_secs(2),
            upload_period: Duration::from_secs(60),
            server_url: "https://api.test.com/explore/stats".to_string(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
