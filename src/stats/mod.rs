//! Exploration stats aggregation, persistence and upload, plus the device
//! identity used to key uploads.

pub mod identity;
pub mod service;
