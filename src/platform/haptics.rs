//! Haptic feedback seam.
//!
//! The GPS processor pulses on newly explored pixels. Hosts without a
//! vibration motor plug in the no-op implementation.

/// Vibration device abstraction.
pub trait Haptics: Send + Sync {
    /// Single pulse of `duration_ms`.
    fn pulse(&self, duration_ms: u32);

    /// Pulse pattern: `durations[i]` ms on, then `pauses[i]` ms off.
    fn pattern(&self, durations: &[u32], pauses: &[u32]);
}

/// Silent no-op device.
#[derive(Default)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn pulse(&self, _duration_ms: u32) {}
    fn pattern(&self, _durations: &[u32], _pauses: &[u32]) {}
}
