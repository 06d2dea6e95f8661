//! Exploration stats service.
//!
//! Aggregates exploration deltas into per-(region, week) counters, persists
//! them to a JSON snapshot with a debounced save (at most one pending save
//! per dirty interval) and periodically uploads the aggregates when sharing
//! is enabled. Upload failures are retried implicitly on the next tick and
//! never block the engine. The service outlives region changes.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::StatsConfig;
use crate::core::math;
use crate::platform::runner::{Pool, TaskRunner};
use crate::platform::settings::{Settings, SHARING_ENABLED_KEY};
use crate::stats::identity::IdentityStore;

/// Aggregate for one (region, week) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsEntry {
    #[serde(rename = "regionId")]
    pub region_id: String,
    /// UTC 7-day aligned bucket start, seconds since the epoch.
    #[serde(rename = "weekStart")]
    pub week_start_sec: u64,
    /// Monotonic non-decreasing explored pixel count.
    #[serde(rename = "explored")]
    pub explored_pixels: u64,
    /// Incremented on every local change; used for upload idempotency.
    pub version: u64,
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<StatsEntry>,
}

#[derive(Serialize)]
struct UploadPayload<'a> {
    #[serde(rename = "deviceId")]
    device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    entries: &'a [StatsEntry],
}

struct ServiceState {
    entries: HashMap<String, StatsEntry>,
    loaded: bool,
    sharing_enabled: bool,
    changed_at: Option<Instant>,
    last_upload_at: Option<Instant>,
    save_scheduled: bool,
}

struct ServiceInner {
    config: StatsConfig,
    settings: Arc<dyn Settings>,
    identity: Arc<IdentityStore>,
    runner: Arc<dyn TaskRunner>,
    state: Mutex<ServiceState>,
}

/// Process-lifetime stats aggregation service.
pub struct ExploreStatsService {
    inner: Arc<ServiceInner>,
}

impl ExploreStatsService {
    /// Create the service, restoring the sharing flag from settings. The
    /// periodic upload tick starts with [`Self::start`].
    pub fn new(
        config: StatsConfig,
        settings: Arc<dyn Settings>,
        identity: Arc<IdentityStore>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        let sharing_enabled = settings.get_bool(SHARING_ENABLED_KEY).unwrap_or(false);
        Self {
            inner: Arc::new(ServiceInner {
                config,
                settings,
                identity,
                runner,
                state: Mutex::new(ServiceState {
                    entries: HashMap::new(),
                    loaded: false,
                    sharing_enabled,
                    changed_at: None,
                    last_upload_at: None,
                    save_scheduled: false,
                }),
            }),
        }
    }

    /// Arm the periodic upload check. The tick re-arms itself through a
    /// weak handle, so dropping the service ends the chain.
    pub fn start(&self) {
        schedule_periodic_upload(&self.inner);
    }

    /// Fold an exploration delta into its (region, week) aggregate and
    /// schedule a debounced save. A zero delta is a no-op.
    pub fn on_exploration_delta(&self, region_id: &str, delta: u32, event_time_sec: f64) {
        if delta == 0 {
            return;
        }

        {
            let mut state = self.inner.state.lock();
            ensure_loaded(&self.inner, &mut state);

            let week = math::week_bucket(event_time_sec.max(0.0) as u64);
            let key = make_key(region_id, week);
            let entry = state.entries.entry(key).or_insert_with(|| StatsEntry {
                region_id: region_id.to_string(),
                week_start_sec: week,
                explored_pixels: 0,
                version: 0,
            });
            entry.explored_pixels += delta as u64;
            entry.version += 1;
            state.changed_at = Some(Instant::now());
        }

        schedule_save(&self.inner);
    }

    /// Toggle sharing; mirrored to settings. Gates uploads only.
    pub fn enable_sharing(&self, enabled: bool) {
        self.inner.state.lock().sharing_enabled = enabled;
        self.inner.settings.set_bool(SHARING_ENABLED_KEY, enabled);
    }

    pub fn is_sharing_enabled(&self) -> bool {
        self.inner.state.lock().sharing_enabled
    }

    /// Drop every aggregate of a region and schedule a save.
    pub fn reset_region(&self, region_id: &str) {
        {
            let mut state = self.inner.state.lock();
            ensure_loaded(&self.inner, &mut state);
            state.entries.retain(|_, e| e.region_id != region_id);
            state.changed_at = Some(Instant::now());
        }
        schedule_save(&self.inner);
    }

    /// Copy of all aggregates.
    pub fn entries(&self) -> Vec<StatsEntry> {
        let mut state = self.inner.state.lock();
        ensure_loaded(&self.inner, &mut state);
        state.entries.values().cloned().collect()
    }
}

fn make_key(region_id: &str, week_start_sec: u64) -> String {
    format!("{region_id}|{week_start_sec}")
}

/// Lazy snapshot load; a missing or malformed file yields an empty map.
fn ensure_loaded(inner: &ServiceInner, state: &mut ServiceState) {
    if state.loaded {
        return;
    }
    state.loaded = true;

    let path = &inner.config.stats_file;
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            log::warn!("Failed to read stats snapshot: {e}");
            return;
        }
    };
    match serde_json::from_str::<Snapshot>(&content) {
        Ok(snapshot) => {
            state.entries = snapshot
                .entries
                .into_iter()
                .map(|e| (make_key(&e.region_id, e.week_start_sec), e))
                .collect();
        }
        Err(e) => log::warn!("Failed to load stats: {e}"),
    }
}

/// Debounced save with at-most-one-pending semantics: a second request
/// while one is pending is dropped, and the pending save sees the state at
/// its firing time.
fn schedule_save(inner: &Arc<ServiceInner>) {
    {
        let mut state = inner.state.lock();
        if state.save_scheduled {
            return;
        }
        state.save_scheduled = true;
    }
    let weak = Arc::downgrade(inner);
    inner.runner.run_delayed(
        Pool::Background,
        inner.config.save_debounce,
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                save(&inner);
            }
        }),
    );
}

fn save(inner: &ServiceInner) {
    let snapshot = {
        let mut state = inner.state.lock();
        state.save_scheduled = false;
        Snapshot { entries: state.entries.values().cloned().collect() }
    };
    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            if let Err(e) = fs::write(&inner.config.stats_file, json) {
                log::warn!("Failed to save stats: {e}");
            }
        }
        Err(e) => log::warn!("Failed to serialize stats: {e}"),
    }
}

fn schedule_periodic_upload(inner: &Arc<ServiceInner>) {
    let weak = Arc::downgrade(inner);
    let period = inner.config.upload_period;
    inner.runner.run_delayed(
        Pool::Background,
        period,
        Box::new(move || {
            let Some(inner) = weak.upgrade() else { return };
            log::info!("Checking if new stats need to be uploaded");
            let should_upload = {
                let state = inner.state.lock();
                match (state.changed_at, state.last_upload_at) {
                    (Some(changed), Some(uploaded)) => changed > uploaded,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            };
            if should_upload {
                try_upload(&inner);
            } else {
                log::info!("No new stats to upload");
            }
            schedule_periodic_upload(&inner);
        }),
    );
}

fn try_upload(inner: &Arc<ServiceInner>) {
    {
        let state = inner.state.lock();
        if !state.sharing_enabled {
            log::info!("Sharing disabled; skipping upload");
            return;
        }
    }

    log::info!("Uploading stats...");
    let body = {
        let mut state = inner.state.lock();
        ensure_loaded(inner, &mut state);
        let entries: Vec<StatsEntry> = state.entries.values().cloned().collect();
        let payload = UploadPayload {
            device_id: inner.identity.device_id(),
            username: inner.identity.username(),
            entries: &entries,
        };
        match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Failed to serialize upload payload: {e}");
                return;
            }
        }
    };

    let weak = Arc::downgrade(inner);
    let url = inner.config.server_url.clone();
    inner.runner.run(
        Pool::Network,
        Box::new(move || {
            let Some(inner) = weak.upgrade() else { return };
            match post_json(&url, &body) {
                Ok(()) => {
                    log::info!("Stats uploaded");
                    inner.state.lock().last_upload_at = Some(Instant::now());
                }
                Err(e) => log::warn!("Stats upload failed: {e}"),
            }
        }),
    );
}

/// POST the payload; only HTTP 200 counts as success.
fn post_json(url: &str, body: &str) -> Result<(), String> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(10))
        .timeout_read(Duration::from_secs(30))
        .timeout_write(Duration::from_secs(30))
        .build();
    match agent.post(url).set("Content-Type", "application/json").send_string(body) {
        Ok(resp) if resp.status() == 200 => Ok(()),
        Ok(resp) => Err(format!("HTTP {}", resp.status())),
        Err(ureq::Error::Status(code, _)) => Err(format!("HTTP {code}")),
        Err(e) => Err(e.to_string()),
    }
}
