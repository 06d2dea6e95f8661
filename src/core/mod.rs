//! Core foundation: geographic types, spherical math and the HEALPix index.

pub mod healpix;
pub mod math;
pub mod types;

pub use types::{EngineState, EngineStatus, ExplorationDelta, GeoPoint, GpsFix};
