//! Rate controller pacing the coordinator loop.
//!
//! [`RateController::wait_for_next`] blocks the coordinator until the next
//! iteration is due, tracking the pattern's instantaneous target TPS. Pacing
//! is credit-based: credit accrues at the current target rate and one unit
//! of credit buys one submission. The integral form keeps the mean
//! submission rate correct through ramps and other TPS transitions, where a
//! naive `1/tps` inter-arrival sleep would mis-pace (a near-zero early-ramp
//! rate would push the next submission far past the rise).
//!
//! Sleeps are capped at a short recheck interval so the controller notices
//! TPS transitions promptly, and accumulated credit is clamped so a stalled
//! coordinator catches up with a bounded burst instead of an unbounded one.

use crate::pattern::LoadPattern;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Park interval while the target rate is zero, and the cap on any single
/// sleep so TPS transitions are observed promptly.
const RECHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum accumulated credit; bounds the catch-up burst after a stall.
const MAX_CREDIT: f64 = 100.0;

/// Paces iteration submission to a [`LoadPattern`].
///
/// Single-writer: only the coordinator calls [`wait_for_next`]. The gauge
/// accessors (`current_tps`, `elapsed_millis`, `execution_count`) are atomic
/// and may be read from any thread, lagging the coordinator by at most one
/// submission.
///
/// [`wait_for_next`]: RateController::wait_for_next
pub struct RateController {
    pattern: Arc<dyn LoadPattern>,
    epoch: Instant,
    last_tick: Instant,
    credit: f64,
    current_tps_bits: Arc<AtomicU64>,
    execution_count: Arc<AtomicU64>,
}

impl RateController {
    /// Creates a controller whose epoch is now.
    pub fn new(pattern: Arc<dyn LoadPattern>) -> Self {
        let epoch = Instant::now();
        Self {
            pattern,
            epoch,
            last_tick: epoch,
            credit: 0.0,
            current_tps_bits: Arc::new(AtomicU64::new(0f64.to_bits())),
            execution_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Milliseconds elapsed since the controller was created.
    pub fn elapsed_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// The most recently observed target TPS.
    pub fn current_tps(&self) -> f64 {
        f64::from_bits(self.current_tps_bits.load(Ordering::Acquire))
    }

    /// Number of submissions released so far.
    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Acquire)
    }

    /// Shared handles for gauges that outlive the coordinator borrow.
    pub fn gauges(&self) -> RateGauges {
        RateGauges {
            current_tps_bits: Arc::clone(&self.current_tps_bits),
            execution_count: Arc::clone(&self.execution_count),
        }
    }

    /// Blocks until the next iteration is due.
    ///
    /// Returns the iteration's submission slot immediately when enough
    /// credit has accrued; otherwise sleeps toward the instant one unit of
    /// credit will be available, never longer than [`RECHECK_INTERVAL`] so
    /// rising or falling rates are tracked. While the target rate is zero
    /// the caller is parked for one recheck interval per loop.
    pub async fn wait_for_next(&mut self) {
        loop {
            let now = Instant::now();
            let dt = now.saturating_duration_since(self.last_tick);
            self.last_tick = now;

            let elapsed_ms = now.saturating_duration_since(self.epoch).as_millis() as u64;
            let tps = self.pattern.tps_at(elapsed_ms).max(0.0);
            self.current_tps_bits
                .store(tps.to_bits(), Ordering::Release);

            self.credit = (self.credit + tps * dt.as_secs_f64()).min(MAX_CREDIT);

            if self.credit >= 1.0 {
                self.credit -= 1.0;
                self.execution_count.fetch_add(1, Ordering::Release);
                return;
            }

            let wait = if tps > 0.0 {
                Duration::from_secs_f64((1.0 - self.credit) / tps).min(RECHECK_INTERVAL)
            } else {
                RECHECK_INTERVAL
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Atomic gauge handles shared with metrics consumers.
#[derive(Clone)]
pub struct RateGauges {
    current_tps_bits: Arc<AtomicU64>,
    execution_count: Arc<AtomicU64>,
}

impl RateGauges {
    /// The most recently observed target TPS.
    pub fn current_tps(&self) -> f64 {
        f64::from_bits(self.current_tps_bits.load(Ordering::Acquire))
    }

    /// Number of submissions released so far.
    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Acquire)
    }
}
