//! Recorded-track replay.
//!
//! Runs once tracks are loaded and the region is ready. Replays every
//! unseen track in recording order into the pixel file, keeping stats
//! idempotent through the accounted bits and the fraction map. A region
//! change aborts the pass before any further persistence.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::core::healpix;
use crate::core::math;
use crate::core::types::{EngineStatus, ExplorationDelta};
use crate::engine::controller::EngineInner;
use crate::engine::gps;
use crate::platform::runner::Pool;
use crate::sources::Track;
use crate::store::fractions;

/// Kick off a replay pass on the background pool if the preconditions hold
/// (region ready, tracks loaded).
pub(crate) fn spawn(inner: &Arc<EngineInner>) {
    log::info!("UpdateExploredPixels requested");

    if inner.state.lock().status != EngineStatus::Ready {
        log::warn!("Street pixels not loaded");
        return;
    }
    if !inner.tracks_loaded.load(Ordering::SeqCst) {
        log::warn!("Tracks not loaded");
        return;
    }

    let tracks = inner.deps.tracks.tracks_sorted_by_time();
    let region = inner.current_region();
    let runner = inner.deps.runner.clone();
    let inner = inner.clone();
    runner.run(Pool::Background, Box::new(move || process_tracks(&inner, &region, tracks)));
}

fn process_tracks(inner: &Arc<EngineInner>, region: &str, tracks: Vec<Track>) {
    for track in &tracks {
        if inner.current_region() != region {
            log::warn!("Region changed while updating explored pixels. Aborting.");
            return;
        }
        if inner.fractions.lock().contains_key(&track.id) {
            continue;
        }

        update_feature_coverage(inner, region, track);

        log::info!("Computing track pixels for {}", track.id);
        let track_pixels = compute_track_pixels(inner, track);

        let mut stats_new = 0u32;
        let mut total_pixels = 0usize;
        {
            let mut pixels = inner.pixels.lock();
            let store = &mut *pixels;
            if let Some(file) = &mut store.file {
                total_pixels = file.len();
                for &pix in &track_pixels {
                    let Some(idx) = file.find(pix) else { continue };
                    file.set_explored(idx);
                    if !store.accounted.get(idx) {
                        store.accounted.set(idx);
                        stats_new += 1;
                    }
                }
            }
        }

        let fraction = if total_pixels == 0 {
            0.0
        } else {
            stats_new as f64 / total_pixels as f64
        };
        inner.fractions.lock().insert(track.id, fraction);
        log::info!("Track {} explored fraction: {fraction}", track.id);

        if stats_new > 0 {
            inner.emit_delta(ExplorationDelta {
                region_id: region.to_string(),
                new_pixels: stats_new,
                event_time_sec: track.timestamp_sec,
            });
        }
        inner.deps.stats_db.mark_track_processed(track.geometry_hash(), region);
    }

    if inner.current_region() != region {
        log::warn!("Region changed while updating explored pixels. Aborting.");
        return;
    }

    log::info!("Calculated explored fractions");
    let snapshot = inner.fractions.lock().clone();
    if let Err(e) = fractions::save(&inner.config.pixf_path(region), &snapshot) {
        log::warn!("Failed to save explored fractions: {e}");
    }

    if inner.current_region() != region {
        return;
    }
    inner.save_accounted_bits(region);

    // Refresh the ui even when enabled/status did not change.
    inner.notify_state_listener();
}

/// Update per-feature coverage along the track, sampling every 10 m and
/// reusing the GPS street-stats path (existing rows only).
fn update_feature_coverage(inner: &Arc<EngineInner>, region: &str, track: &Track) {
    math::sample_polyline(&track.points, inner.config.track_sample_step_m, |point| {
        gps::update_street_stats(inner, region, point);
    });
}

/// Pixel ids the track covers: every sample expanded with the explore-radius
/// disc.
fn compute_track_pixels(inner: &Arc<EngineInner>, track: &Track) -> BTreeSet<i64> {
    let mut pixels = BTreeSet::new();
    let radius_rad = inner.config.explore_radius_rad();
    math::sample_polyline(&track.points, inner.config.track_sample_step_m, |point| {
        for (begin, end) in healpix::query_disc(point, radius_rad) {
            pixels.extend(begin..end);
        }
    });
    pixels
}
