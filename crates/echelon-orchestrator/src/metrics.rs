use crate::registry::TierRegistry;
use chrono::{DateTime, Utc};
use echelon_core::TierLevel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Running statistics for one tier.
#[derive(Debug, Clone, Default)]
pub struct TierMetrics {
    /// Completed invocations, success or failure.
    pub total_tasks: u64,
    /// Invocations that completed successfully.
    pub successful_tasks: u64,
    /// Invocations that errored, timed out, or reported failure.
    pub failed_tasks: u64,
    /// Running mean of invocation wall time, in seconds.
    pub average_execution_time: f64,
    /// Running mean of reported confidence. Failures contribute 0.0.
    pub average_confidence: f64,
    /// Live utilization gauge in [0, 1], independent of the historical
    /// averages.
    pub current_load: f64,
    /// When the tier last completed an invocation.
    pub last_used: Option<DateTime<Utc>>,
}

impl TierMetrics {
    /// successful_tasks / total_tasks. A tier with no history reports 1.0
    /// so fresh registries read as healthy.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            1.0
        } else {
            self.successful_tasks as f64 / self.total_tasks as f64
        }
    }
}

/// Point-in-time copy of one tier's statistics, as exposed by the
/// observability surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierMetricsSnapshot {
    /// Tier name.
    pub name: String,
    /// Hierarchy level.
    pub level: TierLevel,
    /// Completed invocations.
    pub total_tasks: u64,
    /// Successful invocations.
    pub successful_tasks: u64,
    /// Failed invocations.
    pub failed_tasks: u64,
    /// successful_tasks / total_tasks (1.0 with no history).
    pub success_rate: f64,
    /// Running mean wall time in seconds.
    pub average_execution_time: f64,
    /// Running mean confidence.
    pub average_confidence: f64,
    /// Live load gauge.
    pub current_load: f64,
    /// Last completion timestamp.
    pub last_used: Option<DateTime<Utc>>,
}

struct Slot {
    level: TierLevel,
    /// Load-gauge step per in-flight invocation: 1 / max_concurrent.
    quantum: f64,
    metrics: TierMetrics,
    consecutive_failures: u32,
}

/// Per-tier running statistics with single-writer discipline per tier.
///
/// Each tier has its own mutex so concurrent completions on unrelated tiers
/// never serialize against each other; only same-tier updates contend. The
/// slot set is fixed at construction from the registry.
pub struct MetricsTracker {
    slots: HashMap<String, Mutex<Slot>>,
    order: Vec<String>,
}

impl MetricsTracker {
    /// Build a tracker with one slot per registered tier.
    pub fn from_registry(registry: &TierRegistry) -> Self {
        let mut slots = HashMap::new();
        let mut order = Vec::new();
        for tier in registry.iter() {
            order.push(tier.name.clone());
            slots.insert(
                tier.name.clone(),
                Mutex::new(Slot {
                    level: tier.level,
                    quantum: 1.0 / f64::from(tier.max_concurrent),
                    metrics: TierMetrics::default(),
                    consecutive_failures: 0,
                }),
            );
        }
        Self { slots, order }
    }

    /// Raise the live load gauge as a dispatch to this tier starts.
    pub fn begin_invocation(&self, name: &str) {
        if let Some(slot) = self.slots.get(name) {
            let mut slot = slot.lock();
            let quantum = slot.quantum;
            let load = slot.metrics.current_load;
            slot.metrics.current_load = (load + quantum).clamp(0.0, 1.0);
        }
    }

    /// Lower the live load gauge as a dispatch to this tier finishes.
    pub fn end_invocation(&self, name: &str) {
        if let Some(slot) = self.slots.get(name) {
            let mut slot = slot.lock();
            let quantum = slot.quantum;
            let load = slot.metrics.current_load;
            slot.metrics.current_load = (load - quantum).clamp(0.0, 1.0);
        }
    }

    /// Fold one completed invocation into the tier's statistics.
    ///
    /// Every completion bumps `total_tasks` by exactly one regardless of
    /// outcome, and both running means advance by the exact formula
    /// `avg += (sample - avg) / total`. Returns the tier's consecutive
    /// failure count after the update, which drives implicit failover.
    pub fn record_completion(
        &self,
        name: &str,
        success: bool,
        duration: Duration,
        confidence: f64,
    ) -> u32 {
        let Some(slot) = self.slots.get(name) else {
            return 0;
        };
        let mut slot = slot.lock();
        if success {
            slot.consecutive_failures = 0;
        } else {
            slot.consecutive_failures += 1;
        }
        let m = &mut slot.metrics;
        m.total_tasks += 1;
        if success {
            m.successful_tasks += 1;
        } else {
            m.failed_tasks += 1;
        }
        let n = m.total_tasks as f64;
        m.average_execution_time += (duration.as_secs_f64() - m.average_execution_time) / n;
        m.average_confidence += (confidence.clamp(0.0, 1.0) - m.average_confidence) / n;
        m.last_used = Some(Utc::now());
        slot.consecutive_failures
    }

    /// Current load gauge for a tier (0.0 for unknown names).
    pub fn current_load(&self, name: &str) -> f64 {
        self.slots
            .get(name)
            .map(|s| s.lock().metrics.current_load)
            .unwrap_or(0.0)
    }

    /// Consecutive failure count for a tier.
    pub fn consecutive_failures(&self, name: &str) -> u32 {
        self.slots
            .get(name)
            .map(|s| s.lock().consecutive_failures)
            .unwrap_or(0)
    }

    /// Snapshot of one tier.
    pub fn snapshot_for(&self, name: &str) -> Option<TierMetricsSnapshot> {
        self.slots.get(name).map(|slot| {
            let slot = slot.lock();
            Self::to_snapshot(name, &slot)
        })
    }

    /// Snapshot of every tier, in registry registration order.
    pub fn snapshot(&self) -> Vec<TierMetricsSnapshot> {
        self.order
            .iter()
            .filter_map(|name| self.snapshot_for(name))
            .collect()
    }

    fn to_snapshot(name: &str, slot: &Slot) -> TierMetricsSnapshot {
        let m = &slot.metrics;
        TierMetricsSnapshot {
            name: name.to_string(),
            level: slot.level,
            total_tasks: m.total_tasks,
            successful_tasks: m.successful_tasks,
            failed_tasks: m.failed_tasks,
            success_rate: m.success_rate(),
            average_execution_time: m.average_execution_time,
            average_confidence: m.average_confidence,
            current_load: m.current_load,
            last_used: m.last_used,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::contract::{InvocationRequest, TierHandle, TierResponse};
    use crate::registry::Tier;
    use async_trait::async_trait;
    use echelon_core::EchelonResult;
    use serde_json::json;
    use std::sync::Arc;

    struct NullHandle;

    #[async_trait]
    impl TierHandle for NullHandle {
        async fn invoke(&self, _request: InvocationRequest) -> EchelonResult<TierResponse> {
            Ok(TierResponse::ok(json!({}), 1.0))
        }
    }

    fn tracker_for(tiers: &[(&str, TierLevel, u32)]) -> MetricsTracker {
        let mut registry = TierRegistry::new();
        for (name, level, max_concurrent) in tiers {
            registry
                .register(
                    Tier::new(*name, *level, Arc::new(NullHandle))
                        .with_max_concurrent(*max_concurrent),
                )
                .unwrap();
        }
        MetricsTracker::from_registry(&registry)
    }

    #[test]
    fn test_accounting_idempotence() {
        let tracker = tracker_for(&[("a", TierLevel::Operations, 4)]);
        tracker.record_completion("a", true, Duration::from_millis(100), 0.9);
        tracker.record_completion("a", false, Duration::from_millis(200), 0.0);
        tracker.record_completion("a", true, Duration::from_millis(300), 0.8);

        let snap = tracker.snapshot_for("a").unwrap();
        assert_eq!(snap.total_tasks, 3);
        assert_eq!(snap.successful_tasks, 2);
        assert_eq!(snap.failed_tasks, 1);
        assert_eq!(snap.total_tasks, snap.successful_tasks + snap.failed_tasks);
        assert!((snap.success_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!(snap.last_used.is_some());
    }

    #[test]
    fn test_fresh_tier_reads_healthy() {
        let tracker = tracker_for(&[("a", TierLevel::Quality, 4)]);
        let snap = tracker.snapshot_for("a").unwrap();
        assert_eq!(snap.total_tasks, 0);
        assert_eq!(snap.success_rate, 1.0);
        assert_eq!(snap.current_load, 0.0);
        assert!(snap.last_used.is_none());
    }

    #[test]
    fn test_load_gauge_quantum_and_clamp() {
        let tracker = tracker_for(&[("a", TierLevel::Execution, 4)]);
        tracker.begin_invocation("a");
        assert!((tracker.current_load("a") - 0.25).abs() < 1e-12);

        // Saturate past the clamp.
        for _ in 0..10 {
            tracker.begin_invocation("a");
        }
        assert_eq!(tracker.current_load("a"), 1.0);

        tracker.end_invocation("a");
        assert!((tracker.current_load("a") - 0.75).abs() < 1e-12);

        // Drain past zero.
        for _ in 0..10 {
            tracker.end_invocation("a");
        }
        assert_eq!(tracker.current_load("a"), 0.0);
    }

    #[test]
    fn test_load_is_not_derived_from_history() {
        let tracker = tracker_for(&[("a", TierLevel::Execution, 2)]);
        tracker.record_completion("a", false, Duration::from_secs(5), 0.0);
        tracker.record_completion("a", false, Duration::from_secs(5), 0.0);
        // Heavy failure history, yet the gauge only moves with in-flight work.
        assert_eq!(tracker.current_load("a"), 0.0);
        tracker.begin_invocation("a");
        assert!((tracker.current_load("a") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_consecutive_failures_reset_on_success() {
        let tracker = tracker_for(&[("a", TierLevel::Tactical, 4)]);
        assert_eq!(
            tracker.record_completion("a", false, Duration::ZERO, 0.0),
            1
        );
        assert_eq!(
            tracker.record_completion("a", false, Duration::ZERO, 0.0),
            2
        );
        assert_eq!(
            tracker.record_completion("a", true, Duration::ZERO, 0.9),
            0
        );
        assert_eq!(tracker.consecutive_failures("a"), 0);
    }

    #[test]
    fn test_unknown_tier_is_ignored() {
        let tracker = tracker_for(&[("a", TierLevel::Operations, 4)]);
        assert_eq!(tracker.record_completion("ghost", true, Duration::ZERO, 1.0), 0);
        assert_eq!(tracker.current_load("ghost"), 0.0);
        assert!(tracker.snapshot_for("ghost").is_none());
    }

    #[test]
    fn test_snapshot_order_matches_registration() {
        let tracker = tracker_for(&[
            ("zeta", TierLevel::Operations, 4),
            ("alpha", TierLevel::Quality, 4),
        ]);
        let names: Vec<String> = tracker.snapshot().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_concurrent_updates_lose_nothing() {
        let tracker = Arc::new(tracker_for(&[("a", TierLevel::Execution, 8)]));
        let mut handles = Vec::new();
        for i in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    tracker.record_completion(
                        "a",
                        (i + j) % 2 == 0,
                        Duration::from_millis(10),
                        0.5,
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = tracker.snapshot_for("a").unwrap();
        assert_eq!(snap.total_tasks, 800);
        assert_eq!(snap.total_tasks, snap.successful_tasks + snap.failed_tasks);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn latency_ms() -> impl Strategy<Value = u64> {
            0u64..120_000
        }

        proptest! {
            /// The running-mean update is exactly the arithmetic mean of all
            /// samples to date.
            #[test]
            fn prop_running_mean_is_exact(
                latencies in prop::collection::vec(latency_ms(), 1..200),
            ) {
                let tracker = tracker_for(&[("a", TierLevel::Execution, 4)]);
                for &ms in &latencies {
                    tracker.record_completion("a", true, Duration::from_millis(ms), 0.5);
                }
                let snap = tracker.snapshot_for("a").unwrap();
                let expected: f64 = latencies
                    .iter()
                    .map(|&ms| Duration::from_millis(ms).as_secs_f64())
                    .sum::<f64>()
                    / latencies.len() as f64;
                prop_assert!((snap.average_execution_time - expected).abs() < 1e-9);
            }

            /// total_tasks always equals successful + failed, for any outcome
            /// sequence.
            #[test]
            fn prop_totals_balance(outcomes in prop::collection::vec(any::<bool>(), 0..200)) {
                let tracker = tracker_for(&[("a", TierLevel::Execution, 4)]);
                for &ok in &outcomes {
                    tracker.record_completion("a", ok, Duration::from_millis(1), 0.5);
                }
                let snap = tracker.snapshot_for("a").unwrap();
                prop_assert_eq!(snap.total_tasks, snap.successful_tasks + snap.failed_tasks);
                prop_assert_eq!(snap.total_tasks as usize, outcomes.len());
            }
        }
    }
}
