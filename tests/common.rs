//! Shared fixtures for the integration scenarios.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;

use marga::core::types::{ExplorationDelta, GeoPoint};
use marga::{
    EngineConfig, EngineDeps, ExplorationEngine, Haptics, MemoryFeatureSource, MemoryTrackSource,
    NoopRenderHook, Pool, RoadFeature, StreetStatsDb, TaskRunner,
};

/// Runner that queues every task; the test drains them explicitly. Makes
/// "background work still pending" states reachable deterministically.
#[derive(Default)]
pub struct QueueRunner {
    tasks: Mutex<VecDeque<marga::platform::runner::Task>>,
}

impl QueueRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued tasks (including any they enqueue) until none remain.
    pub fn drain(&self) {
        loop {
            let Some(task) = self.tasks.lock().pop_front() else { return };
            task();
        }
    }
}

impl TaskRunner for QueueRunner {
    fn run(&self, _pool: Pool, task: marga::platform::runner::Task) {
        self.tasks.lock().push_back(task);
    }

    fn run_delayed(
        &self,
        _pool: Pool,
        _delay: std::time::Duration,
        task: marga::platform::runner::Task,
    ) {
        self.tasks.lock().push_back(task);
    }
}

/// Haptics recorder: counts pulses and patterns.
#[derive(Default)]
pub struct RecordingHaptics {
    pub pulses: AtomicUsize,
    pub patterns: AtomicUsize,
}

impl Haptics for RecordingHaptics {
    fn pulse(&self, _duration_ms: u32) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }

    fn pattern(&self, durations: &[u32], pauses: &[u32]) {
        assert_eq!(durations.len(), pauses.len());
        assert!(durations.len() <= 10);
        self.patterns.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingHaptics {
    pub fn total(&self) -> usize {
        self.pulses.load(Ordering::SeqCst) + self.patterns.load(Ordering::SeqCst)
    }
}

/// Everything a scenario needs, wired together over a temp dir.
pub struct Harness {
    pub engine: ExplorationEngine,
    pub features: Arc<MemoryFeatureSource>,
    pub tracks: Arc<MemoryTrackSource>,
    pub haptics: Arc<RecordingHaptics>,
    pub stats_db: Arc<StreetStatsDb>,
    pub config: EngineConfig,
    pub deltas: Arc<Mutex<Vec<ExplorationDelta>>>,
}

impl Harness {
    pub fn new(dir: &std::path::Path, runner: Arc<dyn TaskRunner>) -> Self {
        env_logger::try_init().ok();

        let config = EngineConfig { data_dir: dir.to_path_buf(), ..EngineConfig::default() };
        let features = Arc::new(MemoryFeatureSource::new());
        let tracks = Arc::new(MemoryTrackSource::new());
        let haptics = Arc::new(RecordingHaptics::default());
        let stats_db = Arc::new(StreetStatsDb::open(&config.stats_db_path()).unwrap());

        let engine = ExplorationEngine::new(
            config.clone(),
            EngineDeps {
                features: features.clone(),
                tracks: tracks.clone(),
                renderer: Arc::new(NoopRenderHook),
                haptics: haptics.clone(),
                runner,
                stats_db: stats_db.clone(),
            },
        );

        let deltas = Arc::new(Mutex::new(Vec::new()));
        let sink = deltas.clone();
        engine.set_exploration_listener(Arc::new(move |delta| {
            sink.lock().push(delta.clone());
        }));

        Self { engine, features, tracks, haptics, stats_db, config, deltas }
    }

    pub fn new_pixels_total(&self) -> u32 {
        self.deltas.lock().iter().map(|d| d.new_pixels).sum()
    }
}

/// A straight east-west road of `length_deg` degrees of longitude starting
/// at the origin of `lat`.
pub fn straight_road(mwm: &str, index: u32, lat: f64, lon0: f64, length_deg: f64) -> RoadFeature {
    RoadFeature::new(
        mwm,
        index,
        &[&["highway", "residential"]],
        vec![GeoPoint::new(lat, lon0), GeoPoint::new(lat, lon0 + length_deg)],
    )
}

/// The points derivation emits for a two-point road: the first endpoint
/// plus the interior subdivision points.
pub fn derivation_points(road: &RoadFeature, segment_len_m: f64) -> Vec<GeoPoint> {
    let mut points = vec![road.points[0]];
    marga::core::math::segmentize(road.points[0], road.points[1], segment_len_m, |p, _| {
        points.push(p)
    });
    points
}

/// Distinct pixel ids of the derivation points, sorted.
pub fn expected_pixels(road: &RoadFeature, segment_len_m: f64) -> Vec<i64> {
    let mut ids: Vec<i64> = derivation_points(road, segment_len_m)
        .iter()
        .map(|p| marga::core::healpix::pix_from_lat_lon(p.lat, p.lon))
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Minimal HTTP server answering each POST with the next status from
/// `responses` (repeating the last one). Received bodies go to the channel.
pub fn spawn_http_server(responses: Vec<u16>) -> (String, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = unbounded();

    thread::spawn(move || {
        let mut hits = 0usize;
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let mut reader = BufReader::new(stream);

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).is_err() || line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(rest) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = rest.trim().parse().unwrap_or(0);
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).ok();
            tx.send(String::from_utf8_lossy(&body).into_owned()).ok();

            let status = *responses.get(hits).or(responses.last()).unwrap_or(&200);
            hits += 1;
            let reply = format!("HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            reader.get_mut().write_all(reply.as_bytes()).ok();
        }
    });

    (format!("http://{addr}/explore/stats"), rx)
}
