//! Producer contracts: the map-feature reader and the recorded-track store.
//!
//! The engine consumes road geometries and recorded tracks through the
//! [`FeatureSource`] and [`TrackSource`] traits; the in-memory
//! implementations back the test harness the way the mock device backs
//! the hardware drivers elsewhere in the stack.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;

use crate::core::types::GeoPoint;

/// A road feature from a packaged region map.
#[derive(Clone, Debug)]
pub struct RoadFeature {
    /// Name of the map the feature belongs to.
    pub mwm_name: String,
    /// Index of the feature within its map.
    pub feature_index: u32,
    /// Classification paths, outermost first (e.g. `["highway",
    /// "residential"]`, `["hwtag", "nobicycle"]`).
    pub type_paths: Vec<Vec<String>>,
    /// Line geometry.
    pub points: Vec<GeoPoint>,
}

impl RoadFeature {
    /// Build a feature from string classification paths.
    pub fn new(
        mwm_name: &str,
        feature_index: u32,
        type_paths: &[&[&str]],
        points: Vec<GeoPoint>,
    ) -> Self {
        Self {
            mwm_name: mwm_name.to_string(),
            feature_index,
            type_paths: type_paths
                .iter()
                .map(|path| path.iter().map(|s| s.to_string()).collect())
                .collect(),
            points,
        }
    }

    /// Total geometry length in meters.
    pub fn length_m(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| crate::core::math::distance_m(w[0], w[1]))
            .sum()
    }
}

/// Whether a feature counts toward street exploration.
///
/// Accepts line features classified as `highway` (excluding driveways and
/// tunnels) that are not private and are reachable by bicycle or on foot.
/// Access defaults to allowed; `hwtag` subtypes deny or re-allow it.
pub fn is_explorable(feature: &RoadFeature) -> bool {
    let mut is_highway = false;
    let mut is_private = false;
    let mut bike_ok = true;
    let mut foot_ok = true;

    for path in &feature.type_paths {
        match path.first().map(String::as_str) {
            Some("highway") => {
                let third = path.get(2).map(String::as_str);
                if third != Some("driveway") && third != Some("tunnel") {
                    is_highway = true;
                }
            }
            Some("hwtag") => match path.get(1).map(String::as_str) {
                Some("private") => is_private = true,
                Some("nobicycle") => bike_ok = false,
                Some("yesbicycle") => bike_ok = true,
                Some("nofoot") => foot_ok = false,
                Some("yesfoot") => foot_ok = true,
                _ => {}
            },
            _ => {}
        }
    }

    is_highway && !is_private && (bike_ok || foot_ok)
}

/// Producer of road geometries for a region.
pub trait FeatureSource: Send + Sync {
    /// Whether map data for the region is installed.
    fn has_region(&self, region_id: &str) -> bool;

    /// Visit every feature of the region.
    fn for_each_road(&self, region_id: &str, f: &mut dyn FnMut(&RoadFeature));

    /// Features whose geometry covers the given point.
    fn roads_at(&self, region_id: &str, point: GeoPoint) -> Vec<RoadFeature>;
}

/// A recorded track.
#[derive(Clone, Debug)]
pub struct Track {
    /// Stable track identifier.
    pub id: u64,
    /// Recording time, seconds since the Unix epoch.
    pub timestamp_sec: f64,
    /// Track polyline.
    pub points: Vec<GeoPoint>,
}

impl Track {
    /// Fingerprint of the geometry, independent of id and timestamp.
    pub fn geometry_hash(&self) -> i64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for p in &self.points {
            p.lat.to_bits().hash(&mut hasher);
            p.lon.to_bits().hash(&mut hasher);
        }
        hasher.finish() as i64
    }
}

/// Producer of recorded tracks.
pub trait TrackSource: Send + Sync {
    /// All tracks, sorted by ascending timestamp.
    fn tracks_sorted_by_time(&self) -> Vec<Track>;
}

/// In-memory feature source. Point lookup matches any feature with a
/// vertex or sampled segment point within ~25 m.
#[derive(Default)]
pub struct MemoryFeatureSource {
    regions: RwLock<HashMap<String, Vec<RoadFeature>>>,
}

impl MemoryFeatureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature to a region.
    pub fn add(&self, region_id: &str, feature: RoadFeature) {
        self.regions.write().entry(region_id.to_string()).or_default().push(feature);
    }
}

impl FeatureSource for MemoryFeatureSource {
    fn has_region(&self, region_id: &str) -> bool {
        self.regions.read().contains_key(region_id)
    }

    fn for_each_road(&self, region_id: &str, f: &mut dyn FnMut(&RoadFeature)) {
        if let Some(features) = self.regions.read().get(region_id) {
            for feature in features {
                f(feature);
            }
        }
    }

    fn roads_at(&self, region_id: &str, point: GeoPoint) -> Vec<RoadFeature> {
        const NEAR_M: f64 = 25.0;
        let regions = self.regions.read();
        let Some(features) = regions.get(region_id) else { return Vec::new() };
        features
            .iter()
            .filter(|feature| {
                let mut near = false;
                crate::core::math::sample_polyline(&feature.points, 5.0, |p| {
                    near |= crate::core::math::distance_m(p, point) <= NEAR_M;
                });
                near
            })
            .cloned()
            .collect()
    }
}

/// In-memory track source.
#[derive(Default)]
pub struct MemoryTrackSource {
    tracks: RwLock<Vec<Track>>,
}

impl MemoryTrackSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recorded track.
    pub fn add(&self, track: Track) {
        self.tracks.write().push(track);
    }
}

impl TrackSource for MemoryTrackSource {
    fn tracks_sorted_by_time(&self) -> Vec<Track> {
        let mut tracks = self.tracks.read().clone();
        tracks.sort_by(|a, b| a.timestamp_sec.total_cmp(&b.timestamp_sec));
        tracks
    }
}
