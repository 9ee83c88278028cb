//! Feedback-driven adaptive load pattern.
//!
//! [`AdaptivePattern`] ramps the target rate while the system under test
//! stays healthy and backs off when the failure rate or backpressure level
//! crosses its thresholds. Health is sampled once per ramp interval from a
//! [`MetricsProvider`] and an optional [`BackpressureProvider`].
//!
//! Phase machine:
//!
//! - `RampUp`: each healthy interval adds `ramp_increment`, up to `max_tps`
//!   (then `Sustain`). An unhealthy interval subtracts `ramp_decrement`.
//! - `Sustain` / `RampDown`: healthy intervals count toward a stable
//!   operating point; unhealthy intervals keep stepping down.
//! - `Recovery`: entered when a step-down reaches `min_tps`. The pattern
//!   holds `min_tps` until health returns, then resumes at 50% of the last
//!   known good rate.
//!
//! Observers receive [`AdaptiveEvent`]s through a bounded channel so event
//! consumption never adds jitter to the rate loop; when the channel is full
//! events are dropped, not queued.

use super::{duration_ms, LoadPattern};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the bounded event channel handed to subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Health signal: observed failure rate as a fraction in `[0, 1]`.
pub trait MetricsProvider: Send + Sync {
    /// Current failure rate (failures / total), 0 when nothing ran yet.
    fn failure_rate(&self) -> f64;
}

/// Overload signal: pressure level in `[0, 1]`.
pub trait BackpressureProvider: Send + Sync {
    /// Current pressure; 0 is idle, 1 is saturated.
    fn pressure(&self) -> f64;
}

/// Phase of the adaptive controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptivePhase {
    /// Increasing the rate while healthy.
    RampUp,
    /// Holding at the current (or maximum) rate.
    Sustain,
    /// Stepping the rate down after unhealthy intervals.
    RampDown,
    /// Holding at `min_tps` until health returns.
    Recovery,
}

/// Event emitted by the adaptive controller.
///
/// Timestamps are elapsed milliseconds since run start.
#[derive(Debug, Clone, PartialEq)]
pub enum AdaptiveEvent {
    /// The controller changed phase.
    PhaseTransition {
        from: AdaptivePhase,
        to: AdaptivePhase,
        at_ms: u64,
    },
    /// The target rate changed.
    TpsChange {
        previous: f64,
        current: f64,
        at_ms: u64,
    },
    /// A stable operating point was recorded.
    StabilityDetected { tps: f64, at_ms: u64 },
    /// Recovery completed; the rate resumed from the recorded stable point.
    Recovery { resume_tps: f64, at_ms: u64 },
}

/// Tuning for [`AdaptivePattern`].
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// Floor rate; reaching it while unhealthy enters `Recovery`.
    pub min_tps: f64,
    /// Ceiling rate; reaching it transitions to `Sustain`.
    pub max_tps: f64,
    /// Starting rate.
    pub initial_tps: f64,
    /// Added per healthy interval while ramping.
    pub ramp_increment: f64,
    /// Subtracted per unhealthy interval.
    pub ramp_decrement: f64,
    /// Health evaluation cadence.
    pub ramp_interval: Duration,
    /// Failure-rate fraction above which an interval is unhealthy.
    pub failure_rate_threshold: f64,
    /// Pressure level above which an interval is unhealthy.
    pub backpressure_threshold: f64,
    /// Consecutive tolerated intervals before a stable point is recorded.
    pub stable_intervals_required: u32,
    /// Total run duration.
    pub duration: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_tps: 1.0,
            max_tps: 1_000.0,
            initial_tps: 10.0,
            ramp_increment: 10.0,
            ramp_decrement: 20.0,
            ramp_interval: Duration::from_secs(5),
            failure_rate_threshold: 0.05,
            backpressure_threshold: 0.8,
            stable_intervals_required: 3,
            duration: Duration::from_secs(300),
        }
    }
}

struct AdaptiveState {
    phase: AdaptivePhase,
    current_tps: f64,
    next_eval_ms: u64,
    stable_intervals: u32,
    last_known_good: Option<f64>,
}

/// Stateful load pattern that adapts its rate to observed health.
pub struct AdaptivePattern {
    config: AdaptiveConfig,
    metrics: Arc<dyn MetricsProvider>,
    backpressure: Option<Arc<dyn BackpressureProvider>>,
    state: Mutex<AdaptiveState>,
    events: Mutex<Option<mpsc::Sender<AdaptiveEvent>>>,
}

impl AdaptivePattern {
    /// Creates an adaptive pattern driven by the given health provider.
    pub fn new(config: AdaptiveConfig, metrics: Arc<dyn MetricsProvider>) -> Self {
        let initial = config.initial_tps.clamp(config.min_tps, config.max_tps);
        Self {
            state: Mutex::new(AdaptiveState {
                phase: AdaptivePhase::RampUp,
                current_tps: initial,
                next_eval_ms: duration_ms(config.ramp_interval),
                stable_intervals: 0,
                last_known_good: None,
            }),
            config,
            metrics,
            backpressure: None,
            events: Mutex::new(None),
        }
    }

    /// Adds an overload signal; intervals are unhealthy when either the
    /// failure rate or the pressure crosses its threshold.
    pub fn with_backpressure(mut self, provider: Arc<dyn BackpressureProvider>) -> Self {
        self.backpressure = Some(provider);
        self
    }

    /// Subscribes to controller events through a bounded channel.
    ///
    /// Only the most recent subscriber receives events. When the channel is
    /// full events are dropped rather than blocking the rate loop.
    pub fn subscribe(&self) -> mpsc::Receiver<AdaptiveEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *self.events.lock() = Some(tx);
        rx
    }

    /// Current phase, for observability.
    pub fn phase(&self) -> AdaptivePhase {
        self.state.lock().phase
    }

    /// Last recorded stable operating point, if any.
    pub fn last_known_good(&self) -> Option<f64> {
        self.state.lock().last_known_good
    }

    fn emit(&self, event: AdaptiveEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            // try_send keeps the rate loop jitter-free; a full channel drops.
            if tx.try_send(event).is_err() {
                debug!("adaptive event channel full or closed; event dropped");
            }
        }
    }

    fn healthy(&self) -> bool {
        let failure_rate = self.metrics.failure_rate();
        if failure_rate > self.config.failure_rate_threshold {
            return false;
        }
        match &self.backpressure {
            Some(bp) => bp.pressure() <= self.config.backpressure_threshold,
            None => true,
        }
    }

    fn transition(&self, state: &mut AdaptiveState, to: AdaptivePhase, at_ms: u64) {
        if state.phase != to {
            let from = state.phase;
            state.phase = to;
            debug!(?from, ?to, at_ms, "adaptive phase transition");
            self.emit(AdaptiveEvent::PhaseTransition { from, to, at_ms });
        }
    }

    fn set_tps(&self, state: &mut AdaptiveState, tps: f64, at_ms: u64) {
        let clamped = tps.clamp(self.config.min_tps, self.config.max_tps);
        if (clamped - state.current_tps).abs() > f64::EPSILON {
            let previous = state.current_tps;
            state.current_tps = clamped;
            self.emit(AdaptiveEvent::TpsChange {
                previous,
                current: clamped,
                at_ms,
            });
        }
    }

    fn record_stable_point(&self, state: &mut AdaptiveState, at_ms: u64) {
        state.last_known_good = Some(state.current_tps);
        state.stable_intervals = 0;
        self.emit(AdaptiveEvent::StabilityDetected {
            tps: state.current_tps,
            at_ms,
        });
    }

    fn step_down(&self, state: &mut AdaptiveState, at_ms: u64) {
        state.stable_intervals = 0;
        let target = state.current_tps - self.config.ramp_decrement;
        if target <= self.config.min_tps {
            self.set_tps(state, self.config.min_tps, at_ms);
            self.transition(state, AdaptivePhase::Recovery, at_ms);
        } else {
            self.set_tps(state, target, at_ms);
            self.transition(state, AdaptivePhase::RampDown, at_ms);
        }
    }

    fn evaluate_interval(&self, state: &mut AdaptiveState, at_ms: u64) {
        let healthy = self.healthy();
        match state.phase {
            AdaptivePhase::RampUp => {
                if healthy {
                    state.stable_intervals += 1;
                    if state.stable_intervals >= self.config.stable_intervals_required {
                        self.record_stable_point(state, at_ms);
                    }
                    if state.current_tps >= self.config.max_tps {
                        self.transition(state, AdaptivePhase::Sustain, at_ms);
                    } else {
                        self.set_tps(state, state.current_tps + self.config.ramp_increment, at_ms);
                    }
                } else {
                    self.step_down(state, at_ms);
                }
            }
            AdaptivePhase::Sustain => {
                if healthy {
                    state.stable_intervals += 1;
                    if state.stable_intervals >= self.config.stable_intervals_required {
                        self.record_stable_point(state, at_ms);
                    }
                } else {
                    self.step_down(state, at_ms);
                }
            }
            AdaptivePhase::RampDown => {
                if healthy {
                    state.stable_intervals += 1;
                    if state.stable_intervals >= self.config.stable_intervals_required {
                        self.record_stable_point(state, at_ms);
                        self.transition(state, AdaptivePhase::Sustain, at_ms);
                    }
                } else {
                    self.step_down(state, at_ms);
                }
            }
            AdaptivePhase::Recovery => {
                if healthy {
                    state.stable_intervals += 1;
                    if state.stable_intervals >= self.config.stable_intervals_required {
                        let resume = match state.last_known_good {
                            Some(good) => (good * 0.5).max(self.config.min_tps),
                            None => self.config.min_tps + self.config.ramp_increment,
                        };
                        state.stable_intervals = 0;
                        self.set_tps(state, resume, at_ms);
                        self.emit(AdaptiveEvent::Recovery {
                            resume_tps: resume,
                            at_ms,
                        });
                        self.transition(state, AdaptivePhase::RampUp, at_ms);
                    }
                } else {
                    state.stable_intervals = 0;
                }
            }
        }
    }
}

impl LoadPattern for AdaptivePattern {
    fn tps_at(&self, elapsed_ms: u64) -> f64 {
        if elapsed_ms >= duration_ms(self.config.duration) {
            return 0.0;
        }
        let interval_ms = duration_ms(self.config.ramp_interval).max(1);
        let mut state = self.state.lock();
        while elapsed_ms >= state.next_eval_ms {
            let at_ms = state.next_eval_ms;
            self.evaluate_interval(&mut state, at_ms);
            state.next_eval_ms += interval_ms;
        }
        state.current_tps
    }

    fn duration(&self) -> Duration {
        self.config.duration
    }
}
