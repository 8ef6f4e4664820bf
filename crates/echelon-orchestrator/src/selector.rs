use crate::metrics::TierMetricsSnapshot;
use echelon_core::{Complexity, OrchestratorConfig, Strategy, Task};

/// Choose the dispatch strategy for a task.
///
/// Pure function of the task, a metrics snapshot, and configuration.
/// Rules are evaluated in order; the first match wins:
///
/// 1. Complex/critical/supreme work that asks for consensus → consensus.
/// 2. Moderate work while two or more tiers are busy → parallel.
/// 3. Complex or critical work → cascade.
/// 4. Adaptive routing enabled → adaptive.
/// 5. Otherwise → single.
pub fn select_strategy(
    task: &Task,
    metrics: &[TierMetricsSnapshot],
    config: &OrchestratorConfig,
) -> Strategy {
    let escalated = matches!(
        task.complexity,
        Complexity::Complex | Complexity::Critical | Complexity::Supreme
    );
    if escalated && task.requires_consensus() {
        return Strategy::Consensus;
    }

    let busy_tiers = metrics
        .iter()
        .filter(|m| m.current_load > config.load_threshold)
        .count();
    if busy_tiers >= 2 && task.complexity == Complexity::Moderate {
        return Strategy::Parallel;
    }

    if matches!(task.complexity, Complexity::Complex | Complexity::Critical) {
        return Strategy::Cascade;
    }

    if config.adaptive_routing {
        return Strategy::Adaptive;
    }

    Strategy::Single
}
