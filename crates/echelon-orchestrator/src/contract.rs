use async_trait::async_trait;
use echelon_core::{EchelonResult, Task};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a tier backend receives for a single invocation.
///
/// `context` carries orchestration-injected data; cascade dispatch places the
/// prior level's output there under [`echelon_core::CTX_PREVIOUS_RESULT`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// The task being executed.
    pub task: Task,
    /// Orchestration-injected context, distinct from the task's own
    /// requirements.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl InvocationRequest {
    /// Build a request with empty context.
    pub fn new(task: Task) -> Self {
        Self {
            task,
            context: Map::new(),
        }
    }

    /// Build a request carrying orchestration context.
    pub fn with_context(task: Task, context: Map<String, Value>) -> Self {
        Self { task, context }
    }
}

/// Uniform response every tier backend produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierResponse {
    /// Whether the backend considers the work done.
    pub success: bool,
    /// Opaque result payload. Object payloads merge key-wise during
    /// aggregation; anything else is nested under the tier's name.
    #[serde(default)]
    pub data: Value,
    /// Backend-reported confidence in [0, 1]. Absent values are a
    /// data-quality event and fall back to the configured default.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Cascade control: when false, the cascade stops at this level.
    #[serde(default = "default_continue_cascade")]
    pub continue_cascade: bool,
}

fn default_continue_cascade() -> bool {
    true
}

impl TierResponse {
    /// A successful response with the given payload and confidence.
    pub fn ok(data: Value, confidence: f64) -> Self {
        Self {
            success: true,
            data,
            confidence: Some(confidence),
            continue_cascade: true,
        }
    }

    /// A completed-but-unsuccessful response.
    pub fn failed(data: Value) -> Self {
        Self {
            success: false,
            data,
            confidence: None,
            continue_cascade: true,
        }
    }

    /// Mark this response as the end of a cascade.
    pub fn stop_cascade(mut self) -> Self {
        self.continue_cascade = false;
        self
    }
}

/// The uniform invocation contract every execution backend implements.
///
/// Dispatch code never special-cases a tier by name; the adapter registered
/// at startup is the only place backend-specific shape lives. Implementations
/// must resolve within the per-level timeout or they are treated as failed.
#[async_trait]
pub trait TierHandle: Send + Sync {
    /// Execute the task and report the outcome.
    async fn invoke(&self, request: InvocationRequest) -> EchelonResult<TierResponse>;
}
