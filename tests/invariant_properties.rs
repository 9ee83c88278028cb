//! Property-based invariant suites.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use vajrapulse::metrics::record::sanitize_quantiles;
use vajrapulse::{
    parse_duration, ExecutionMetrics, LoadPattern, MetricsCollector, RampUpLoad,
    RampUpToMaxLoad, ShutdownManager, SineWaveLoad, SpikeLoad, StaticLoad, StepLoad, TaskError,
    TaskResult,
};

fn patterns(
    tps: f64,
    secondary: f64,
    dur_ms: u64,
    aux_ms: u64,
) -> Vec<Arc<dyn LoadPattern>> {
    vec![
        Arc::new(StaticLoad::new(tps, Duration::from_millis(dur_ms))),
        Arc::new(RampUpLoad::new(tps, Duration::from_millis(dur_ms))),
        Arc::new(RampUpToMaxLoad::new(
            tps,
            Duration::from_millis(aux_ms),
            Duration::from_millis(dur_ms),
        )),
        Arc::new(StepLoad::new(vec![
            (tps, Duration::from_millis(dur_ms)),
            (secondary, Duration::from_millis(aux_ms)),
        ])),
        Arc::new(SineWaveLoad::new(
            tps,
            secondary,
            Duration::from_millis(aux_ms.max(1)),
            Duration::from_millis(dur_ms),
        )),
        Arc::new(SpikeLoad::new(
            tps,
            secondary,
            Duration::from_millis(aux_ms.max(1)),
            Duration::from_millis(aux_ms / 2 + 1),
            Duration::from_millis(dur_ms),
        )),
    ]
}

proptest! {
    /// Every pattern yields a non-negative rate everywhere and zero at and
    /// past its duration.
    #[test]
    fn pattern_rates_are_non_negative_and_zero_past_end(
        tps in 0.0f64..10_000.0,
        secondary in -100.0f64..10_000.0,
        dur_ms in 1u64..120_000,
        aux_ms in 1u64..60_000,
        probe_ms in 0u64..240_000,
    ) {
        for pattern in patterns(tps, secondary, dur_ms, aux_ms) {
            let at_probe = pattern.tps_at(probe_ms);
            prop_assert!(at_probe >= 0.0, "negative rate {at_probe}");
            let total = pattern.duration().as_millis() as u64;
            prop_assert_eq!(pattern.tps_at(total), 0.0);
            prop_assert_eq!(pattern.tps_at(total + 1), 0.0);
            prop_assert_eq!(pattern.tps_at(total.saturating_mul(2)), 0.0);
        }
    }

    /// Pattern evaluation is deterministic for a fixed elapsed value.
    #[test]
    fn stateless_patterns_are_deterministic(
        tps in 0.0f64..10_000.0,
        secondary in -100.0f64..10_000.0,
        dur_ms in 1u64..120_000,
        aux_ms in 1u64..60_000,
        probe_ms in 0u64..240_000,
    ) {
        for pattern in patterns(tps, secondary, dur_ms, aux_ms) {
            prop_assert_eq!(pattern.tps_at(probe_ms), pattern.tps_at(probe_ms));
        }
    }

    /// Step duration is the sum of its step durations.
    #[test]
    fn step_duration_is_sum(steps in prop::collection::vec((0.0f64..1_000.0, 1u64..10_000), 1..8)) {
        let expected: u64 = steps.iter().map(|(_, ms)| *ms).sum();
        let pattern = StepLoad::new(
            steps.into_iter().map(|(tps, ms)| (tps, Duration::from_millis(ms))).collect(),
        );
        prop_assert_eq!(pattern.duration(), Duration::from_millis(expected));
    }

    /// Sanitized quantiles are sorted, deduplicated, in (0, 1], and
    /// sanitization is idempotent.
    #[test]
    fn quantile_sanitization_properties(raw in prop::collection::vec(-1.0f64..2.0, 0..24)) {
        let sanitized = sanitize_quantiles(&raw);
        for pair in sanitized.windows(2) {
            prop_assert!(pair[0] < pair[1], "not strictly ascending: {sanitized:?}");
        }
        for q in &sanitized {
            prop_assert!(q.as_f64() > 0.0 && q.as_f64() <= 1.0);
        }
        let again = sanitize_quantiles(&sanitized.iter().map(|q| q.as_f64()).collect::<Vec<_>>());
        prop_assert_eq!(again, sanitized);
    }

    /// Execution records never report negative durations.
    #[test]
    fn execution_metrics_duration_non_negative(start in any::<u64>(), end in any::<u64>(), iter in any::<u64>()) {
        let metrics = ExecutionMetrics::new(start, end, TaskResult::success(), iter);
        prop_assert!(metrics.end_nanos() >= metrics.start_nanos());
        let _ = metrics.duration_nanos(); // must not underflow
    }

    /// Collector totals always satisfy total == success + failure, and the
    /// success rate stays within [0, 100].
    #[test]
    fn collector_totals_and_rate_invariants(successes in 0u64..500, failures in 0u64..500) {
        let collector = MetricsCollector::new(&[0.5, 0.95, 0.99]);
        let mut iteration = 0u64;
        for _ in 0..successes {
            collector.record(&ExecutionMetrics::new(0, 1_000, TaskResult::success(), iteration));
            iteration += 1;
        }
        for _ in 0..failures {
            collector.record(&ExecutionMetrics::new(
                0,
                2_000,
                TaskResult::failure(TaskError::Timeout),
                iteration,
            ));
            iteration += 1;
        }
        let snap = collector.snapshot();
        prop_assert_eq!(snap.total_executions, snap.success_count + snap.failure_count);
        prop_assert_eq!(snap.success_count, successes);
        prop_assert_eq!(snap.failure_count, failures);
        let rate = snap.success_rate();
        prop_assert!((0.0..=100.0).contains(&rate), "rate out of bounds: {rate}");
        if snap.total_executions == 0 {
            prop_assert_eq!(rate, 0.0);
        }
        // Percentile keysets match the configuration for every map.
        let expected: Vec<f64> = vec![0.5, 0.95, 0.99];
        let keys: Vec<f64> = snap.success_percentiles.keys().map(|q| q.as_f64()).collect();
        prop_assert_eq!(keys, expected);
    }

    /// Duration literals survive a format/parse round trip.
    #[test]
    fn duration_format_round_trip(ms in 1u64..86_400_000) {
        let duration = Duration::from_millis(ms);
        let rendered = vajrapulse::config::format_duration(duration);
        prop_assert_eq!(parse_duration(&rendered).unwrap(), duration);
    }
}

/// `initiate_shutdown` returns true exactly once regardless of contention.
#[test]
fn shutdown_initiation_single_winner_over_many_rounds() {
    for _ in 0..50 {
        let manager = Arc::new(ShutdownManager::new(
            Duration::from_secs(1),
            Duration::from_secs(2),
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.initiate_shutdown())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
