//! Load patterns: pure functions from elapsed time to target TPS.
//!
//! A [`LoadPattern`] answers two questions for the rate controller: what is
//! the target transaction rate right now, and how long does the run last.
//! Stateless shapes live in [`shapes`]; the feedback-driven
//! [`AdaptivePattern`](adaptive::AdaptivePattern) lives in [`adaptive`].

use std::time::Duration;

pub mod adaptive;
pub mod shapes;

pub use adaptive::{
    AdaptiveConfig, AdaptiveEvent, AdaptivePattern, AdaptivePhase, BackpressureProvider,
    MetricsProvider,
};
pub use shapes::{RampUpLoad, RampUpToMaxLoad, SineWaveLoad, SpikeLoad, StaticLoad, StepLoad};

/// Time-varying target transaction rate.
///
/// Implementations must return a non-negative rate, must be deterministic
/// for a given elapsed value (the adaptive pattern is the documented
/// stateful exception), and must return `0.0` for any
/// `elapsed_ms >= duration`.
pub trait LoadPattern: Send + Sync {
    /// Instantaneous target TPS at `elapsed_ms` milliseconds into the run.
    fn tps_at(&self, elapsed_ms: u64) -> f64;

    /// Total run duration. The engine stops submitting once this elapses.
    fn duration(&self) -> Duration;
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
