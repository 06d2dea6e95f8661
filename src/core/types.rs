//! Fundamental types shared across the engine.

use serde::{Deserialize, Serialize};

/// Geographic position in degrees (WGS-84).
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, north positive.
    pub lat: f64,
    /// Longitude in degrees, east positive.
    pub lon: f64,
}

impl GeoPoint {
    /// Create a new point from latitude/longitude degrees.
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A single GPS fix as delivered by the location service.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GpsFix {
    /// Position of the fix.
    pub point: GeoPoint,
    /// Seconds since the Unix epoch.
    pub timestamp_sec: f64,
}

impl GpsFix {
    /// Create a new fix.
    pub fn new(lat: f64, lon: f64, timestamp_sec: f64) -> Self {
        Self { point: GeoPoint::new(lat, lon), timestamp_sec }
    }
}

/// Engine readiness for the active region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EngineStatus {
    /// No region data loaded.
    #[default]
    NotReady = 0,
    /// Region data is being loaded or derived in the background.
    Loading = 1,
    /// Pixel file mapped and ready for marking.
    Ready = 2,
}

/// Visibility and readiness state published to listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct EngineState {
    /// Whether the exploration layer is enabled (visible).
    pub enabled: bool,
    /// Readiness of the active region.
    pub status: EngineStatus,
}

/// Message produced by a pixel transition and consumed by the stats service.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplorationDelta {
    /// Region the pixels belong to.
    pub region_id: String,
    /// Number of newly accounted pixels.
    pub new_pixels: u32,
    /// Event time in seconds since the Unix epoch (GPS fix time or track
    /// recording time, not the processing time).
    pub event_time_sec: f64,
}
