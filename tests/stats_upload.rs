//! Stats service scenarios: debounced persistence and the periodic
//! conditional upload against a local HTTP endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::spawn_http_server;
use marga::{
    ExploreStatsService, IdentityStore, MemorySettings, StatsConfig, TaskRunner, ThreadPools,
};

fn service_with(
    dir: &TempDir,
    server_url: String,
    runner: Arc<dyn TaskRunner>,
) -> ExploreStatsService {
    env_logger::try_init().ok();
    let settings = Arc::new(MemorySettings::new());
    let identity = Arc::new(IdentityStore::new(settings.clone(), settings.clone()));
    let config = StatsConfig {
        stats_file: dir.path().join("explore_stats.json"),
        save_debounce: Duration::from_millis(50),
        upload_period: Duration::from_millis(100),
        server_url,
    };
    ExploreStatsService::new(config, settings, identity, runner)
}

#[test]
fn test_uploads_once_then_stays_quiet() {
    let dir = TempDir::new().unwrap();
    let (url, rx) = spawn_http_server(vec![200]);
    let service = service_with(&dir, url, Arc::new(ThreadPools::new()));

    service.enable_sharing(true);
    service.on_exploration_delta("Georgia", 4, 1_000_000.0);
    service.start();

    let body = rx.recv_timeout(Duration::from_secs(10)).expect("one upload");
    assert!(body.contains("\"deviceId\""));
    assert!(body.contains("\"regionId\":\"Georgia\""));
    assert!(body.contains("\"explored\":4"));

    // Subsequent ticks see no new events and do not POST.
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}

#[test]
fn test_failed_upload_retries_next_tick() {
    let dir = TempDir::new().unwrap();
    let (url, rx) = spawn_http_server(vec![500, 200]);
    let service = service_with(&dir, url, Arc::new(ThreadPools::new()));

    service.enable_sharing(true);
    service.on_exploration_delta("Georgia", 1, 1_000_000.0);
    service.start();

    // The 500 leaves the upload pending; the next tick retries.
    rx.recv_timeout(Duration::from_secs(10)).expect("first attempt");
    rx.recv_timeout(Duration::from_secs(10)).expect("retry after failure");

    // The 200 settled it.
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}

#[test]
fn test_sharing_disabled_blocks_upload() {
    let dir = TempDir::new().unwrap();
    let (url, rx) = spawn_http_server(vec![200]);
    let service = service_with(&dir, url, Arc::new(ThreadPools::new()));

    service.on_exploration_delta("Georgia", 2, 1_000_000.0);
    service.start();

    assert!(rx.recv_timeout(Duration::from_millis(400)).is_err(), "no POST while disabled");

    // Aggregation still happened locally.
    assert_eq!(service.entries().len(), 1);
    assert_eq!(service.entries()[0].explored_pixels, 2);
}

#[test]
fn test_new_events_trigger_another_upload() {
    let dir = TempDir::new().unwrap();
    let (url, rx) = spawn_http_server(vec![200]);
    let service = service_with(&dir, url, Arc::new(ThreadPools::new()));

    service.enable_sharing(true);
    service.on_exploration_delta("Georgia", 1, 1_000_000.0);
    service.start();
    rx.recv_timeout(Duration::from_secs(10)).expect("first upload");

    service.on_exploration_delta("Georgia", 3, 1_000_060.0);
    let body = rx.recv_timeout(Duration::from_secs(10)).expect("upload after new delta");
    assert!(body.contains("\"explored\":4"));
}
