//! Stateless load pattern shapes.
//!
//! Every shape clamps negative inputs to zero and returns `0.0` at and past
//! its configured duration, so the rate controller can rely on the
//! past-the-end contract without special cases.

use super::{duration_ms, LoadPattern};
use std::f64::consts::TAU;
use std::time::Duration;

/// Constant TPS for the whole run.
#[derive(Debug, Clone)]
pub struct StaticLoad {
    tps: f64,
    duration: Duration,
}

impl StaticLoad {
    /// Creates a constant-rate pattern. Negative rates are clamped to zero.
    pub fn new(tps: f64, duration: Duration) -> Self {
        Self {
            tps: tps.max(0.0),
            duration,
        }
    }
}

impl LoadPattern for StaticLoad {
    fn tps_at(&self, elapsed_ms: u64) -> f64 {
        if elapsed_ms >= duration_ms(self.duration) {
            0.0
        } else {
            self.tps
        }
    }

    fn duration(&self) -> Duration {
        self.duration
    }
}

/// Linear ramp from zero to `peak_tps` over the whole run.
#[derive(Debug, Clone)]
pub struct RampUpLoad {
    peak_tps: f64,
    duration: Duration,
}

impl RampUpLoad {
    /// Creates a linear ramp ending at `peak_tps`.
    pub fn new(peak_tps: f64, duration: Duration) -> Self {
        Self {
            peak_tps: peak_tps.max(0.0),
            duration,
        }
    }
}

impl LoadPattern for RampUpLoad {
    fn tps_at(&self, elapsed_ms: u64) -> f64 {
        let total = duration_ms(self.duration);
        if elapsed_ms >= total || total == 0 {
            return 0.0;
        }
        self.peak_tps * (elapsed_ms as f64 / total as f64)
    }

    fn duration(&self) -> Duration {
        self.duration
    }
}

/// Linear ramp to `peak_tps` over `ramp`, then sustained at `peak_tps`.
#[derive(Debug, Clone)]
pub struct RampUpToMaxLoad {
    peak_tps: f64,
    ramp: Duration,
    sustain: Duration,
}

impl RampUpToMaxLoad {
    /// Creates a ramp-then-sustain pattern; total duration is `ramp + sustain`.
    pub fn new(peak_tps: f64, ramp: Duration, sustain: Duration) -> Self {
        Self {
            peak_tps: peak_tps.max(0.0),
            ramp,
            sustain,
        }
    }
}

impl LoadPattern for RampUpToMaxLoad {
    fn tps_at(&self, elapsed_ms: u64) -> f64 {
        let ramp_ms = duration_ms(self.ramp);
        if elapsed_ms >= duration_ms(self.duration()) {
            return 0.0;
        }
        if elapsed_ms < ramp_ms {
            if ramp_ms == 0 {
                return self.peak_tps;
            }
            return self.peak_tps * (elapsed_ms as f64 / ramp_ms as f64);
        }
        self.peak_tps
    }

    fn duration(&self) -> Duration {
        self.ramp + self.sustain
    }
}

/// Piecewise-constant sequence of `(tps, duration)` steps.
///
/// At an exact step boundary the earlier step wins; at the end of the final
/// step the past-the-end rule applies and the rate is zero.
#[derive(Debug, Clone)]
pub struct StepLoad {
    steps: Vec<(f64, Duration)>,
}

impl StepLoad {
    /// Creates a step sequence. Negative step rates are clamped to zero.
    pub fn new(steps: Vec<(f64, Duration)>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .map(|(tps, d)| (tps.max(0.0), d))
                .collect(),
        }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` when the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl LoadPattern for StepLoad {
    fn tps_at(&self, elapsed_ms: u64) -> f64 {
        if elapsed_ms >= duration_ms(self.duration()) {
            return 0.0;
        }
        let mut end = 0u64;
        for (tps, step) in &self.steps {
            end += duration_ms(*step);
            // <= keeps the earlier step authoritative at the exact boundary
            if elapsed_ms <= end {
                return *tps;
            }
        }
        0.0
    }

    fn duration(&self) -> Duration {
        self.steps.iter().map(|(_, d)| *d).sum()
    }
}

/// Sinusoidal oscillation around a baseline, clamped at zero.
#[derive(Debug, Clone)]
pub struct SineWaveLoad {
    baseline: f64,
    amplitude: f64,
    period: Duration,
    duration: Duration,
}

impl SineWaveLoad {
    /// Creates a sine oscillation: `baseline + amplitude * sin(2π·t/period)`.
    pub fn new(baseline: f64, amplitude: f64, period: Duration, duration: Duration) -> Self {
        Self {
            baseline: baseline.max(0.0),
            amplitude,
            period,
            duration,
        }
    }
}

impl LoadPattern for SineWaveLoad {
    fn tps_at(&self, elapsed_ms: u64) -> f64 {
        if elapsed_ms >= duration_ms(self.duration) {
            return 0.0;
        }
        let period_ms = duration_ms(self.period);
        if period_ms == 0 {
            return self.baseline;
        }
        let phase = TAU * (elapsed_ms as f64 / period_ms as f64);
        (self.baseline + self.amplitude * phase.sin()).max(0.0)
    }

    fn duration(&self) -> Duration {
        self.duration
    }
}

/// Baseline rate with periodic spike windows at a higher rate.
///
/// Spike windows recur every `spike_every`, each lasting `spike_length`;
/// the first window opens at `spike_every` so a run always starts at the
/// baseline.
#[derive(Debug, Clone)]
pub struct SpikeLoad {
    baseline_tps: f64,
    spike_tps: f64,
    spike_every: Duration,
    spike_length: Duration,
    duration: Duration,
}

impl SpikeLoad {
    /// Creates a spike pattern over `duration`.
    pub fn new(
        baseline_tps: f64,
        spike_tps: f64,
        spike_every: Duration,
        spike_length: Duration,
        duration: Duration,
    ) -> Self {
        Self {
            baseline_tps: baseline_tps.max(0.0),
            spike_tps: spike_tps.max(0.0),
            spike_every,
            spike_length,
            duration,
        }
    }

    fn in_spike_window(&self, elapsed_ms: u64) -> bool {
        let every = duration_ms(self.spike_every);
        if every == 0 || elapsed_ms < every {
            return false;
        }
        let offset = elapsed_ms % every;
        offset < duration_ms(self.spike_length)
    }
}

impl LoadPattern for SpikeLoad {
    fn tps_at(&self, elapsed_ms: u64) -> f64 {
        if elapsed_ms >= duration_ms(self.duration) {
            return 0.0;
        }
        if self.in_spike_window(elapsed_ms) {
            self.spike_tps
        } else {
            self.baseline_tps
        }
    }

    fn duration(&self) -> Duration {
        self.duration
    }
}
