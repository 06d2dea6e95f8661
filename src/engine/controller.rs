//! Exploration engine controller.
//!
//! Owns the active region's pixel file, accounted bits and fraction map,
//! and drives the lifecycle state machine over region changes:
//!
//! ```text
//!           set_region(B)            load ok
//!  NotReady ──────────────▶ Loading ─────────▶ Ready
//!      ▲                      │  load fails: derive → save → load,
//!      │   region change /    │  else stay NotReady
//!      └──────────────────────┘
//! ```
//!
//! # Locking
//!
//! Locks are acquired top-down only, never in reverse:
//!
//! 1. `state`
//! 2. `region`
//! 3. `pixels` (mapping + accounted bits under one mutex)
//! 4. `fractions`
//! 5. stats-db internal mutex
//!
//! Background steps re-check the region id at entry and before every
//! persistence operation and abort without writing when it changed.
//! Listener callbacks are marshalled to the ui pool; listeners must not
//! re-enter the engine synchronously.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::core::types::{EngineState, EngineStatus, ExplorationDelta, GpsFix};
use crate::engine::renderer::RenderHook;
use crate::engine::{derivation, gps, track_processor};
use crate::error::Result;
use crate::platform::haptics::Haptics;
use crate::platform::runner::{Pool, TaskRunner};
use crate::sources::{FeatureSource, TrackSource};
use crate::store::accounted::AccountedBits;
use crate::store::fractions;
use crate::store::pixel_file::PixelFile;
use crate::store::stats_db::StreetStatsDb;

/// Pseudo-regions with no explorable roads.
const SKIPPED_REGIONS: [&str; 2] = ["World", "WorldCoasts"];

/// Listener over engine state changes (enabled, status, region id).
pub type StateListener = Arc<dyn Fn(bool, EngineStatus, &str) + Send + Sync>;

/// Listener over exploration deltas.
pub type ExplorationListener = Arc<dyn Fn(&ExplorationDelta) + Send + Sync>;

/// Collaborators the engine is constructed with.
pub struct EngineDeps {
    pub features: Arc<dyn FeatureSource>,
    pub tracks: Arc<dyn TrackSource>,
    pub renderer: Arc<dyn RenderHook>,
    pub haptics: Arc<dyn Haptics>,
    pub runner: Arc<dyn TaskRunner>,
    pub stats_db: Arc<StreetStatsDb>,
}

/// The active region's mutable pixel state. The mapping and the accounted
/// bits share one mutex so slot indices never race the mapping they refer
/// to.
#[derive(Default)]
pub(crate) struct PixelStore {
    pub file: Option<PixelFile>,
    pub accounted: AccountedBits,
}

pub(crate) struct EngineInner {
    pub config: EngineConfig,
    pub deps: EngineDeps,
    pub state: Mutex<EngineState>,
    pub region: Mutex<String>,
    pub pixels: Mutex<PixelStore>,
    pub fractions: Mutex<HashMap<u64, f64>>,
    pub tracks_loaded: AtomicBool,
    state_listener: Mutex<Option<StateListener>>,
    exploration_listener: Mutex<Option<ExplorationListener>>,
}

/// Street exploration engine.
pub struct ExplorationEngine {
    inner: Arc<EngineInner>,
}

impl ExplorationEngine {
    /// Create an engine; no region is active until [`Self::set_region`].
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                deps,
                state: Mutex::new(EngineState::default()),
                region: Mutex::new(String::new()),
                pixels: Mutex::new(PixelStore::default()),
                fractions: Mutex::new(HashMap::new()),
                tracks_loaded: AtomicBool::new(false),
                state_listener: Mutex::new(None),
                exploration_listener: Mutex::new(None),
            }),
        }
    }

    /// Register the state listener (invoked on the ui pool).
    pub fn set_state_listener(&self, listener: StateListener) {
        *self.inner.state_listener.lock() = Some(listener);
    }

    /// Register the exploration delta listener (invoked on the producing
    /// thread, in emission order).
    pub fn set_exploration_listener(&self, listener: ExplorationListener) {
        *self.inner.exploration_listener.lock() = Some(listener);
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        *self.inner.state.lock()
    }

    /// Active region id.
    pub fn region(&self) -> String {
        self.inner.current_region()
    }

    /// Toggle layer visibility; readiness is unaffected.
    pub fn set_enabled(&self, enabled: bool) {
        let status = self.inner.state.lock().status;
        self.inner.change_state(EngineState { enabled, status });
        self.inner.deps.renderer.set_enabled(enabled);
    }

    /// Whether the layer is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    /// Switch the active region. Persists and tears down the previous
    /// region's state and loads (or derives) the new region's pixels in the
    /// background.
    pub fn set_region(&self, region_id: &str) {
        let old_region;
        {
            let mut region = self.inner.region.lock();
            if *region == region_id {
                return;
            }
            log::info!("Region changed from {:?} to {:?}", *region, region_id);
            old_region = std::mem::replace(&mut *region, region_id.to_string());
        }

        // Accounted bits marked by GPS fixes have no other flush point once
        // the region id is gone.
        self.inner.save_accounted_bits(&old_region);
        self.clear_pixels();
        if region_id.is_empty() {
            return;
        }
        if !self.inner.deps.features.has_region(region_id) {
            log::warn!("No map data for region {region_id}");
            return;
        }

        self.inner.load_fractions(region_id);
        self.inner.set_status(EngineStatus::Loading);

        let inner = self.inner.clone();
        let region = region_id.to_string();
        self.inner.deps.runner.run(
            Pool::Background,
            Box::new(move || {
                log::info!("Loading street pixels in background for region {region}");
                inner.load_region(&region);
            }),
        );
    }

    /// Notification that the track store has finished loading; triggers a
    /// replay pass once the region is ready.
    pub fn on_tracks_loaded(&self) {
        self.inner.tracks_loaded.store(true, Ordering::SeqCst);
        self.update_explored_pixels();
    }

    /// Replay all unseen tracks of the active region into the pixel file.
    pub fn update_explored_pixels(&self) {
        track_processor::spawn(&self.inner);
    }

    /// Mark the 20 m disc around a GPS fix as explored. Runs on the calling
    /// thread.
    pub fn on_location_update(&self, fix: GpsFix) {
        gps::on_location_update(&self.inner, fix);
    }

    /// Whether a track has already been replayed.
    pub fn has_explored_fraction(&self, track_id: u64) -> bool {
        self.inner.fractions.lock().contains_key(&track_id)
    }

    /// Explored fraction recorded for a track (0 when unknown).
    pub fn explored_fraction(&self, track_id: u64) -> f64 {
        self.inner.fractions.lock().get(&track_id).copied().unwrap_or(0.0)
    }

    /// Explored share of the active region's pixel file, in [0, 1].
    pub fn total_explored_fraction(&self) -> f64 {
        let pixels = self.inner.pixels.lock();
        match &pixels.file {
            Some(file) if !file.is_empty() => file.explored_count() as f64 / file.len() as f64,
            _ => 0.0,
        }
    }

    /// Read access to the live pixel records (renderer re-read path).
    pub fn with_pixels<R>(&self, f: impl FnOnce(Option<&PixelFile>) -> R) -> R {
        let pixels = self.inner.pixels.lock();
        f(pixels.file.as_ref())
    }

    /// Persist pending accounted bits, unmap the pixel file and drop the
    /// region's in-memory state.
    pub fn clear_pixels(&self) {
        log::info!("Clearing pixels and unmapping pixel file");
        self.inner.deps.renderer.clear_pixels();
        self.inner.save_accounted_bits(&self.inner.current_region());
        {
            let mut pixels = self.inner.pixels.lock();
            pixels.file = None;
            pixels.accounted.clear();
        }
        self.inner.set_status(EngineStatus::NotReady);
    }
}

impl EngineInner {
    pub(crate) fn current_region(&self) -> String {
        self.region.lock().clone()
    }

    /// Change readiness while preserving the enabled flag.
    pub(crate) fn set_status(&self, status: EngineStatus) {
        let enabled = self.state.lock().enabled;
        self.change_state(EngineState { enabled, status });
    }

    /// Publish a state change to the listener if anything changed.
    pub(crate) fn change_state(&self, new: EngineState) {
        {
            let mut state = self.state.lock();
            if *state == new {
                return;
            }
            log::info!("Setting status. Is loading: {}", new.status == EngineStatus::Loading);
            *state = new;
        }
        self.notify_state_listener();
    }

    /// Invoke the state listener with the current state, even when nothing
    /// changed (used after a replay pass so the ui refreshes).
    pub(crate) fn notify_state_listener(&self) {
        let Some(listener) = self.state_listener.lock().clone() else { return };
        let state = *self.state.lock();
        let region = self.current_region();
        self.deps.runner.run(
            Pool::Ui,
            Box::new(move || listener(state.enabled, state.status, &region)),
        );
    }

    /// Hand a delta to the exploration listener on the producing thread.
    pub(crate) fn emit_delta(&self, delta: ExplorationDelta) {
        if let Some(listener) = self.exploration_listener.lock().clone() {
            listener(&delta);
        }
    }

    /// Flush dirty accounted bits to the region's `.pixa` file. No-op for a
    /// clean bitset or an empty region id.
    pub(crate) fn save_accounted_bits(&self, region: &str) {
        if region.is_empty() {
            return;
        }
        let mut pixels = self.pixels.lock();
        if !pixels.accounted.is_dirty() {
            return;
        }
        if let Err(e) = pixels.accounted.save(&self.config.pixa_path(region)) {
            log::warn!("Failed to save accounted bits: {e}");
        }
    }

    fn load_fractions(&self, region: &str) {
        let path = self.config.pixf_path(region);
        let loaded = match fractions::load(&path) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("Failed to load explored fractions: {e}");
                HashMap::new()
            }
        };
        *self.fractions.lock() = loaded;
    }

    fn map_pixel_file(&self, path: &Path) -> Result<()> {
        let file = PixelFile::open(path)?;
        log::info!("Mapped {} pixels from {}", file.len(), path.display());
        self.pixels.lock().file = Some(file);
        Ok(())
    }

    /// Background region load: mmap, or derive-save-map on failure. Ends in
    /// Ready on success, NotReady otherwise.
    pub(crate) fn load_region(self: &Arc<Self>, region: &str) {
        if SKIPPED_REGIONS.contains(&region) {
            log::info!("Skipping pseudo-region {region}");
            self.set_status(EngineStatus::NotReady);
            return;
        }

        let path = self.config.pix_path(region);
        if let Err(e) = self.map_pixel_file(&path) {
            log::warn!("Failed to memory-map pixel file: {e}");
            if let Err(e) = derivation::derive_region(self, region) {
                log::warn!("Derivation failed for {region}: {e}");
                self.set_status(EngineStatus::NotReady);
                return;
            }
            if let Err(e) = self.map_pixel_file(&path) {
                log::warn!("Failed to map derived pixel file: {e}");
                self.set_status(EngineStatus::NotReady);
                return;
            }
        }

        if self.current_region() != region {
            log::warn!("Region changed while loading street pixels. Aborting.");
            self.pixels.lock().file = None;
            return;
        }

        {
            let mut pixels = self.pixels.lock();
            if let Some(file) = &pixels.file {
                self.deps.renderer.update_pixels(file.snapshot());
                log::info!("Loaded {} total street pixels", file.len());
            }
            if let Err(e) = pixels.accounted.load(&self.config.pixa_path(region)) {
                log::warn!("Failed to load accounted bits: {e}");
            }
        }

        self.set_status(EngineStatus::Ready);

        track_processor::spawn(self);
    }
}
