use crate::metrics::TierMetricsSnapshot;
use chrono::{DateTime, Utc};
use echelon_core::{Strategy, TaskState, TierLevel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Terminal result of a task. Exactly one exists per task that reached a
/// terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    /// The task this report belongs to.
    pub task_id: Uuid,
    /// Strategy the selector chose.
    pub strategy: Strategy,
    /// Terminal state: completed, failed, or cancelled.
    pub status: TaskState,
    /// Whether the strategy's completion rule was satisfied.
    pub success: bool,
    /// Tiers the strategy invoked, in invocation order.
    pub tiers: Vec<String>,
    /// Orchestration level that produced the result.
    pub level: Option<TierLevel>,
    /// Result payload.
    pub data: Value,
    /// Result confidence in [0, 1].
    pub confidence: f64,
    /// Wall time from dispatch to terminal state, in seconds.
    pub execution_time: f64,
    /// Whether a consensus round cleared quorum and threshold.
    pub consensus_reached: bool,
    /// Stable error code when `success` is false.
    pub error_code: Option<String>,
    /// Human-readable error detail when `success` is false.
    pub error_message: Option<String>,
    /// When the terminal state was reached.
    pub completed_at: DateTime<Utc>,
}

/// Snapshot returned by the orchestrator status operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Per-tier metrics, in registry registration order.
    pub tiers: Vec<TierMetricsSnapshot>,
    /// Tasks currently in flight.
    pub active_tasks: usize,
    /// Tasks that reached a terminal state.
    pub completed_tasks: usize,
}
