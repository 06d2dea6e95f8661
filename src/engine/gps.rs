//! GPS fix processing.
//!
//! Marks every road pixel within the explore radius of a fix, counts each
//! pixel once against the weekly aggregate via its accounted bit, updates
//! the per-feature coverage bitmask of the road under the fix and pulses
//! the haptics in proportion to the newly counted pixels. One aggregate
//! delta is emitted per fix; replays are silent.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::core::types::{ExplorationDelta, GeoPoint, GpsFix};
use crate::core::{healpix, math};
use crate::engine::controller::EngineInner;
use crate::sources::is_explorable;

/// Single-pulse duration for one new pixel.
const SINGLE_PULSE_MS: u32 = 50;
/// Pattern pulse on/off durations for multiple new pixels.
const PATTERN_ON_MS: u32 = 30;
const PATTERN_OFF_MS: u32 = 20;
/// Pattern length cap.
const MAX_PULSES: usize = 10;

pub(crate) fn on_location_update(inner: &Arc<EngineInner>, fix: GpsFix) {
    let region = inner.current_region();
    if region.is_empty() {
        return;
    }

    let ranges = healpix::query_disc(fix.point, inner.config.explore_radius_rad());
    let mut new_pixels = 0u32;
    {
        let mut pixels = inner.pixels.lock();
        let store = &mut *pixels;
        if let Some(file) = &mut store.file {
            for (begin, end) in ranges {
                for pix in begin..end {
                    let Some(idx) = file.find(pix) else { continue };
                    file.set_explored(idx);
                    // Counting keys on the accounted bit, not the explored
                    // transition, matching track replay.
                    if !store.accounted.get(idx) {
                        store.accounted.set(idx);
                        new_pixels += 1;
                    }
                }
            }
        }
    }

    if new_pixels > 0 {
        update_street_stats(inner, &region, fix.point);
        inner.emit_delta(ExplorationDelta {
            region_id: region,
            new_pixels,
            event_time_sec: fix.timestamp_sec,
        });
    }

    match new_pixels {
        0 => {}
        1 => inner.deps.haptics.pulse(SINGLE_PULSE_MS),
        n => {
            let count = (n as usize).min(MAX_PULSES);
            inner.deps.haptics.pattern(&vec![PATTERN_ON_MS; count], &vec![PATTERN_OFF_MS; count]);
        }
    }
}

/// Flip the 15 m coverage bit nearest `point` for every explorable road
/// covering it. Rows are never created here: a missing bitmask means the
/// region's stats were not derived, and the full feature length is unknown.
pub(crate) fn update_street_stats(inner: &Arc<EngineInner>, region: &str, point: GeoPoint) {
    let segment_len = inner.config.segment_length_m;
    let mut updates: HashMap<(String, u32), BTreeSet<u32>> = HashMap::new();

    for feature in inner.deps.features.roads_at(region, point) {
        if !is_explorable(&feature) || feature.points.len() < 2 {
            continue;
        }

        let mut min_dist = f64::MAX;
        let mut dist_along = -1.0f64;
        let mut accumulated = 0.0;
        for pair in feature.points.windows(2) {
            let closest = math::closest_point_on_segment(pair[0], pair[1], point);
            let dist = math::distance_m(point, closest);
            if dist < min_dist {
                min_dist = dist;
                dist_along = accumulated + math::distance_m(pair[0], closest);
            }
            accumulated += math::distance_m(pair[0], pair[1]);
        }

        if dist_along >= 0.0 {
            updates
                .entry((feature.mwm_name.clone(), feature.feature_index))
                .or_default()
                .insert((dist_along / segment_len) as u32);
        }
    }

    if updates.is_empty() {
        return;
    }

    for ((mwm, feature_index), bits) in updates {
        let Some(mut bitmask) = inner.deps.stats_db.get_bitmask(&mwm, feature_index) else {
            continue;
        };
        let mut updated = false;
        for bit in bits {
            let byte = bit as usize / 8;
            if byte < bitmask.len() && bitmask[byte] & (1 << (bit % 8)) == 0 {
                bitmask[byte] |= 1 << (bit % 8);
                updated = true;
            }
        }
        if updated {
            inner.deps.stats_db.save_bitmask(&mwm, feature_index, &bitmask);
        }
    }
}
