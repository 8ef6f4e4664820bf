use crate::level::TierLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

/// Requirements key that forces consensus validation for eligible tasks.
pub const REQ_CONSENSUS: &str = "requires_consensus";
/// Requirements key marking a task as specialized work.
pub const REQ_SPECIALIZED: &str = "specialized";
/// Context key under which cascade injects the prior level's output.
pub const CTX_PREVIOUS_RESULT: &str = "previous_result";

/// Declared complexity of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Routine work.
    Simple,
    /// Standard work with some coordination.
    Moderate,
    /// Multi-step work needing execution-level capability.
    Complex,
    /// High-stakes work needing validation.
    Critical,
    /// Highest-scope work.
    Supreme,
}

impl Complexity {
    /// Hierarchy level a task of this complexity is routed to by
    /// single-tier dispatch.
    pub fn target_level(self) -> TierLevel {
        match self {
            Complexity::Simple => TierLevel::Operations,
            Complexity::Moderate => TierLevel::Tactical,
            Complexity::Complex => TierLevel::Execution,
            Complexity::Critical => TierLevel::Quality,
            Complexity::Supreme => TierLevel::Strategic,
        }
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Complexity::Simple),
            "moderate" => Ok(Complexity::Moderate),
            "complex" => Ok(Complexity::Complex),
            "critical" => Ok(Complexity::Critical),
            "supreme" => Ok(Complexity::Supreme),
            other => Err(format!(
                "unknown complexity '{other}' (expected simple, moderate, complex, critical, or supreme)"
            )),
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Moderate => write!(f, "moderate"),
            Complexity::Complex => write!(f, "complex"),
            Complexity::Critical => write!(f, "critical"),
            Complexity::Supreme => write!(f, "supreme"),
        }
    }
}

/// The dispatch algorithm chosen for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One tier, chosen by complexity mapping.
    Single,
    /// Concurrent fan-out across 2-3 tiers of distinct specialty.
    Parallel,
    /// Sequential walk up the hierarchy levels.
    Cascade,
    /// Three-way validation requiring a quorum of agreeing responses.
    Consensus,
    /// Load-aware selection across the whole registry.
    Adaptive,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Single => write!(f, "single"),
            Strategy::Parallel => write!(f, "parallel"),
            Strategy::Cascade => write!(f, "cascade"),
            Strategy::Consensus => write!(f, "consensus"),
            Strategy::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Lifecycle state of a task inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Accepted and queued, not yet dispatched.
    Submitted,
    /// A strategy has been selected and execution started.
    Dispatched,
    /// Waiting on a consensus round.
    AwaitingConsensus,
    /// Walking the cascade levels.
    Cascading,
    /// Waiting on a parallel fan-out join.
    ParallelWait,
    /// Finished successfully.
    Completed,
    /// Finished without satisfying its strategy's completion rule.
    Failed,
    /// Abandoned after a cancellation request.
    Cancelled,
}

impl TaskState {
    /// Whether this state is terminal. Each task reaches exactly one
    /// terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// A unit of work submitted to the orchestrator.
///
/// Immutable after submission; cancellation is tracked by the manager, not
/// on the task itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: Uuid,
    /// Free-form type tag (e.g. "classification", "transcription").
    pub task_type: String,
    /// Declared complexity, drives strategy selection and routing.
    pub complexity: Complexity,
    /// Arbitrary string-keyed requirements supplied by the caller.
    pub requirements: Map<String, Value>,
    /// Priority in [1, 10]; clamped at construction.
    pub priority: u8,
    /// Optional completion deadline.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Optional submitter or session identifier.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a task with default priority 5 and empty requirements.
    pub fn new(task_type: impl Into<String>, complexity: Complexity) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            complexity,
            requirements: Map::new(),
            priority: 5,
            deadline: None,
            user_id: None,
            created_at: Utc::now(),
        }
    }

    /// Attach requirements.
    pub fn with_requirements(mut self, requirements: Map<String, Value>) -> Self {
        self.requirements = requirements;
        self
    }

    /// Set the priority, clamped to [1, 10].
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority.clamp(1, 10) as u8;
        self
    }

    /// Set a completion deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the submitter identifier.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Whether the caller asked for consensus validation.
    pub fn requires_consensus(&self) -> bool {
        self.requirement_flag(REQ_CONSENSUS)
    }

    /// Whether the task is tagged as specialized work.
    pub fn is_specialized(&self) -> bool {
        self.requirement_flag(REQ_SPECIALIZED)
    }

    fn requirement_flag(&self, key: &str) -> bool {
        self.requirements
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
