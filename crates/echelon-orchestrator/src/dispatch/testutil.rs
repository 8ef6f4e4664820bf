//! Shared fixtures for dispatch strategy tests.

use super::DispatchContext;
use crate::contract::{InvocationRequest, TierHandle, TierResponse};
use crate::failover::FailoverController;
use crate::metrics::MetricsTracker;
use crate::registry::{Tier, TierRegistry};
use crate::table::ActiveTaskTable;
use async_trait::async_trait;
use echelon_core::{EchelonError, EchelonResult, OrchestratorConfig, TierLevel};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handle returning a fixed response, counting invocations.
pub struct ScriptedHandle {
    response: TierResponse,
    calls: AtomicUsize,
}

impl ScriptedHandle {
    pub fn new(response: TierResponse) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TierHandle for ScriptedHandle {
    async fn invoke(&self, _request: InvocationRequest) -> EchelonResult<TierResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Handle that always errors, counting invocations.
pub struct ErroringHandle {
    calls: AtomicUsize,
}

impl ErroringHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TierHandle for ErroringHandle {
    async fn invoke(&self, _request: InvocationRequest) -> EchelonResult<TierResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EchelonError::TierInvocation("backend exploded".into()))
    }
}

/// Handle that records the context it receives, for cascade flow assertions.
pub struct RecordingHandle {
    response: TierResponse,
    pub seen_context: parking_lot::Mutex<Vec<Value>>,
}

impl RecordingHandle {
    pub fn new(response: TierResponse) -> Arc<Self> {
        Arc::new(Self {
            response,
            seen_context: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TierHandle for RecordingHandle {
    async fn invoke(&self, request: InvocationRequest) -> EchelonResult<TierResponse> {
        self.seen_context
            .lock()
            .push(Value::Object(request.context.clone()));
        Ok(self.response.clone())
    }
}

/// Build a dispatch context over the given tiers with default config.
pub fn context(tiers: Vec<Tier>) -> DispatchContext {
    context_with_config(tiers, OrchestratorConfig::default())
}

/// Build a dispatch context with explicit config.
pub fn context_with_config(tiers: Vec<Tier>, config: OrchestratorConfig) -> DispatchContext {
    let mut registry = TierRegistry::new();
    for tier in tiers {
        registry
            .register(tier)
            .unwrap_or_else(|e| panic!("fixture registry: {e}"));
    }
    let metrics = Arc::new(MetricsTracker::from_registry(&registry));
    let table = Arc::new(ActiveTaskTable::new());
    let registry = Arc::new(RwLock::new(registry));
    let failover = Arc::new(FailoverController::new(
        Arc::clone(&registry),
        Arc::clone(&metrics),
        Arc::clone(&table),
    ));
    DispatchContext {
        registry,
        metrics,
        config: Arc::new(config),
        failover,
        table,
    }
}

/// Convenience tier with a scripted success response whose payload key is
/// derived from the tier name (keeps merges collision-free).
pub fn ok_tier(name: &str, level: TierLevel, confidence: f64) -> (Tier, Arc<ScriptedHandle>) {
    let mut data = serde_json::Map::new();
    data.insert(format!("{name}_result"), json!("ok"));
    let handle = ScriptedHandle::new(TierResponse::ok(Value::Object(data), confidence));
    (
        Tier::new(name, level, Arc::clone(&handle) as Arc<dyn TierHandle>),
        handle,
    )
}
