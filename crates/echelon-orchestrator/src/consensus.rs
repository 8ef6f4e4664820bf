use echelon_core::TierLevel;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

/// Outcome of one completed tier invocation, after metrics accounting.
///
/// Invocations that errored or timed out never produce an outcome; a
/// completed invocation whose backend reported failure produces one with
/// `success == false`.
#[derive(Debug, Clone)]
pub struct TierOutcome {
    /// Name of the invoked tier.
    pub tier: String,
    /// Registration-order index, used for deterministic merge ordering.
    pub registry_index: usize,
    /// Level of the invoked tier.
    pub level: TierLevel,
    /// Whether the backend reported success.
    pub success: bool,
    /// Backend payload.
    pub data: Value,
    /// Resolved confidence (backend-reported or configured default).
    pub confidence: f64,
    /// Cascade control flag from the response.
    pub continue_cascade: bool,
    /// Invocation wall time.
    pub duration: Duration,
}

/// Aggregated view over a set of per-tier outcomes.
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
    /// Whether at least one outcome succeeded.
    pub success: bool,
    /// Structured merge of successful payloads.
    pub data: Value,
    /// Arithmetic mean of successful confidences (0.0 with no successes).
    pub confidence: f64,
    /// Count of successful outcomes.
    pub successful_count: usize,
    /// Names of the successful tiers, in merge order.
    pub tiers: Vec<String>,
}

/// Shared aggregation used by parallel fan-out and consensus validation.
///
/// Tier contracts are expected to produce non-overlapping payload keys; a
/// collision is a data-quality event, logged and resolved last-write-wins
/// in registry iteration order.
pub struct ConsensusBuilder;

impl ConsensusBuilder {
    /// Filter to successes, average their confidences, and merge payloads.
    pub fn aggregate(outcomes: &[TierOutcome]) -> ConsensusOutcome {
        let mut successes: Vec<&TierOutcome> = outcomes.iter().filter(|o| o.success).collect();
        successes.sort_by_key(|o| o.registry_index);

        let successful_count = successes.len();
        let confidence = if successful_count == 0 {
            0.0
        } else {
            successes.iter().map(|o| o.confidence).sum::<f64>() / successful_count as f64
        };

        let mut merged = Map::new();
        for outcome in &successes {
            match &outcome.data {
                Value::Object(fields) => {
                    for (key, value) in fields {
                        if merged.contains_key(key) {
                            warn!(
                                key = %key,
                                tier = %outcome.tier,
                                "payload key collision during merge, keeping later value"
                            );
                        }
                        merged.insert(key.clone(), value.clone());
                    }
                }
                // Non-object payloads nest under the tier name, which is
                // unique by registry construction.
                other => {
                    merged.insert(outcome.tier.clone(), other.clone());
                }
            }
        }

        ConsensusOutcome {
            success: successful_count > 0,
            data: Value::Object(merged),
            confidence,
            successful_count,
            tiers: successes.iter().map(|o| o.tier.clone()).collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(tier: &str, index: usize, success: bool, confidence: f64, data: Value) -> TierOutcome {
        TierOutcome {
            tier: tier.to_string(),
            registry_index: index,
            level: TierLevel::Execution,
            success,
            data,
            confidence,
            continue_cascade: true,
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_mean_confidence_of_successes() {
        let outcomes = vec![
            outcome("a", 0, true, 0.90, json!({"a_result": 1})),
            outcome("b", 1, true, 0.80, json!({"b_result": 2})),
            outcome("c", 2, false, 0.0, json!({})),
        ];
        let agg = ConsensusBuilder::aggregate(&outcomes);
        assert!(agg.success);
        assert_eq!(agg.successful_count, 2);
        assert!((agg.confidence - 0.85).abs() < 1e-12);
        assert_eq!(agg.tiers, vec!["a", "b"]);
    }

    #[test]
    fn test_merge_is_keywise_for_objects() {
        let outcomes = vec![
            outcome("a", 0, true, 0.9, json!({"summary": "ok"})),
            outcome("b", 1, true, 0.8, json!({"review": "pass"})),
        ];
        let agg = ConsensusBuilder::aggregate(&outcomes);
        assert_eq!(agg.data, json!({"summary": "ok", "review": "pass"}));
    }

    #[test]
    fn test_collision_resolves_last_write_wins_in_registry_order() {
        // Deliberately supply outcomes out of registry order; merge must
        // still resolve by registration index.
        let outcomes = vec![
            outcome("late", 5, true, 0.8, json!({"verdict": "late"})),
            outcome("early", 1, true, 0.9, json!({"verdict": "early"})),
        ];
        let agg = ConsensusBuilder::aggregate(&outcomes);
        assert_eq!(agg.data, json!({"verdict": "late"}));
        assert_eq!(agg.tiers, vec!["early", "late"]);
    }

    #[test]
    fn test_non_object_payload_nests_under_tier_name() {
        let outcomes = vec![
            outcome("scorer", 0, true, 0.7, json!(0.42)),
            outcome("labeler", 1, true, 0.9, json!({"label": "spam"})),
        ];
        let agg = ConsensusBuilder::aggregate(&outcomes);
        assert_eq!(agg.data, json!({"scorer": 0.42, "label": "spam"}));
    }

    #[test]
    fn test_no_successes() {
        let outcomes = vec![outcome("a", 0, false, 0.0, json!({}))];
        let agg = ConsensusBuilder::aggregate(&outcomes);
        assert!(!agg.success);
        assert_eq!(agg.successful_count, 0);
        assert_eq!(agg.confidence, 0.0);
        assert_eq!(agg.data, json!({}));
    }
}
