//! One-time pixel derivation for a region.
//!
//! Walks the region's explorable road features, subdivides every segment
//! into 15 m steps, seeds each feature's coverage bitmask and writes the
//! sorted pixel file. The per-feature bitmask is bit-addressable 15 m
//! coverage independent of which global pixel a step falls in; the pixel
//! file is the renderable layer.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::core::{healpix, math};
use crate::core::types::GeoPoint;
use crate::engine::controller::EngineInner;
use crate::error::{ExploreError, Result};
use crate::sources::is_explorable;
use crate::store::pixel_file;

/// Derive the region's pixel file and initial feature bitmasks. Returns the
/// number of pixel records written.
pub(crate) fn derive_region(inner: &Arc<EngineInner>, region: &str) -> Result<usize> {
    log::info!("Calculating street pixels for region {region}");
    let segment_len = inner.config.segment_length_m;

    let mut feature_bits: HashMap<(String, u32), Vec<u32>> = HashMap::new();
    let mut feature_lengths: HashMap<(String, u32), f64> = HashMap::new();
    let mut points: Vec<GeoPoint> = Vec::new();
    let mut num_streets = 0usize;

    inner.deps.features.for_each_road(region, &mut |feature| {
        if !is_explorable(feature) {
            return;
        }
        num_streets += 1;
        if feature.points.len() < 2 {
            return;
        }

        let key = (feature.mwm_name.clone(), feature.feature_index);
        let mut total_len = 0.0;
        for pair in feature.points.windows(2) {
            points.push(pair[0]);
            math::segmentize(pair[0], pair[1], segment_len, |point, dist_from_prev| {
                points.push(point);
                let dist_along = total_len + dist_from_prev;
                feature_bits
                    .entry(key.clone())
                    .or_default()
                    .push((dist_along / segment_len) as u32);
            });
            total_len += math::distance_m(pair[0], pair[1]);
        }
        feature_lengths.insert(key, total_len);
    });

    if points.is_empty() {
        return Err(ExploreError::DeriveEmpty(region.to_string()));
    }

    // Seed the coverage bitmasks in one transaction.
    inner.deps.stats_db.with_transaction(|txn| {
        for ((mwm, feature_index), bit_indices) in &feature_bits {
            let mut bitmask = txn.get_bitmask(mwm, *feature_index).unwrap_or_else(|| {
                let len_m = feature_lengths.get(&(mwm.clone(), *feature_index)).copied().unwrap_or(0.0);
                let bits = (len_m / segment_len).ceil() as usize;
                vec![0u8; bits.div_ceil(8).max(1)]
            });
            for &bit in bit_indices {
                let byte = bit as usize / 8;
                if byte < bitmask.len() {
                    bitmask[byte] |= 1 << (bit % 8);
                }
            }
            txn.save_bitmask(mwm, *feature_index, &bitmask);
        }
    });

    let pixel_ids: BTreeSet<i64> =
        points.iter().map(|p| healpix::pix_from_lat_lon(p.lat, p.lon)).collect();
    let count = pixel_file::write_sorted(&inner.config.pix_path(region), pixel_ids)?;
    log::info!("Found {count} street pixels for {num_streets} streets in {region}");
    Ok(count)
}
