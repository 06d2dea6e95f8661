//! Marga - Street exploration engine
//!
//! Tracks which segments of the public road network a user has physically
//! traversed, keeps the explored/unexplored state in a memory-mapped pixel
//! file, aggregates per-region weekly exploration counts and periodically
//! uploads anonymized aggregates.
//!
//! # Architecture
//!
//! The crate is organized into 6 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     stats/                          │  ← Aggregation & upload
//! │           (service, identity store)                 │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │   (controller, derivation, track & GPS processing)  │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   platform/                         │  ← Infrastructure
//! │     (thread pools, settings, secure storage)        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sources/                          │  ← Producers
//! │          (road features, recorded tracks)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    store/                           │  ← Durable state
//! │  (pixel file, accounted bits, fractions, stats db)  │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │            (types, math, HEALPix index)             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data flow
//!
//! Road features → derivation → pixel file + per-feature bitmask store.
//! Recorded tracks → track processor → pixel mutations + exploration deltas.
//! GPS fixes → GPS processor → pixel mutations + exploration deltas + haptics.
//! Exploration deltas → stats service → JSON snapshot + periodic HTTP upload.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Durable stores (depends on core)
// ============================================================================
pub mod store;

// ============================================================================
// Layer 3: Producer contracts (depends on core)
// ============================================================================
pub mod sources;

// ============================================================================
// Layer 4: Platform infrastructure (thread pools, settings, haptics)
// ============================================================================
pub mod platform;

// ============================================================================
// Layer 5: Engine (depends on all lower layers)
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 6: Stats aggregation & identity
// ============================================================================
pub mod stats;

mod config;
mod error;

pub use config::{EngineConfig, StatsConfig};
pub use error::{ExploreError, Result};

// Core types
pub use core::types::{EngineState, EngineStatus, ExplorationDelta, GeoPoint, GpsFix};

// Stores
pub use store::accounted::AccountedBits;
pub use store::pixel_file::{PixelFile, RoadPixel};
pub use store::stats_db::StreetStatsDb;

// Sources
pub use sources::{FeatureSource, MemoryFeatureSource, MemoryTrackSource, RoadFeature, Track, TrackSource};

// Platform
pub use platform::haptics::{Haptics, NoopHaptics};
pub use platform::runner::{InlineRunner, Pool, TaskRunner, ThreadPools};
pub use platform::settings::{FileSettings, MemorySettings, SecureStorage, Settings};

// Engine
pub use engine::controller::{EngineDeps, ExplorationEngine, StateListener};
pub use engine::renderer::{NoopRenderHook, RenderHook};

// Stats
pub use stats::identity::IdentityStore;
pub use stats::service::{ExploreStatsService, StatsEntry};
