use crate::dispatch::{self, DispatchContext, DispatchOutput};
use crate::failover::{FailoverController, FailoverReport};
use crate::metrics::MetricsTracker;
use crate::registry::TierRegistry;
use crate::selector::select_strategy;
use crate::table::ActiveTaskTable;
use crate::types::{OrchestratorStatus, TaskReport};
use chrono::Utc;
use echelon_core::{
    Complexity, EchelonError, EchelonResult, OrchestratorConfig, Strategy, Task, TaskState,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// The orchestration façade: owns the registry, metrics, active-task table,
/// and terminal report store, and exposes the submit/query operations.
///
/// Submission is non-blocking: it validates synchronously, enqueues, and
/// returns the task id; execution proceeds on a supervised worker gated by
/// the concurrency semaphore. Worker handles are collected and drained at
/// [`OrchestrationManager::shutdown`], with panics routed to the error
/// sink instead of silently dropped.
pub struct OrchestrationManager {
    ctx: DispatchContext,
    reports: Arc<Mutex<HashMap<Uuid, TaskReport>>>,
    semaphore: Arc<Semaphore>,
    workers: tokio::sync::Mutex<JoinSet<()>>,
    worker_panics: AtomicU64,
}

impl OrchestrationManager {
    /// Build a manager over a populated registry.
    ///
    /// Fails fast on invalid configuration or an empty registry; a system
    /// with zero tiers cannot dispatch anything and is misconfigured by
    /// definition.
    pub fn new(registry: TierRegistry, config: OrchestratorConfig) -> EchelonResult<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(EchelonError::RegistryMisconfigured(
                "no tiers registered".into(),
            ));
        }

        let metrics = Arc::new(MetricsTracker::from_registry(&registry));
        let table = Arc::new(ActiveTaskTable::new());
        let registry = Arc::new(RwLock::new(registry));
        let failover = Arc::new(FailoverController::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Arc::clone(&table),
        ));
        let max_concurrent = config.max_concurrent_tasks;

        Ok(Self {
            ctx: DispatchContext {
                registry,
                metrics,
                config: Arc::new(config),
                failover,
                table,
            },
            reports: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            workers: tokio::sync::Mutex::new(JoinSet::new()),
            worker_panics: AtomicU64::new(0),
        })
    }

    /// Validate and enqueue a task, returning its id immediately.
    ///
    /// Rejects synchronously on a malformed complexity value or
    /// non-object requirements; priority is clamped to [1, 10].
    pub async fn submit_task(
        &self,
        task_type: &str,
        requirements: Value,
        complexity: &str,
        priority: i64,
        user_id: Option<&str>,
    ) -> EchelonResult<Uuid> {
        let complexity: Complexity = complexity
            .parse()
            .map_err(EchelonError::Validation)?;
        let requirements = match requirements {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(EchelonError::Validation(format!(
                    "requirements must be a JSON object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let mut task = Task::new(task_type, complexity)
            .with_requirements(requirements)
            .with_priority(priority);
        if let Some(user) = user_id {
            task = task.with_user(user);
        }
        let task_id = task.id;

        let cancel = self.ctx.table.insert(task_id);
        info!(
            task_id = %task_id,
            task_type = %task.task_type,
            complexity = %task.complexity,
            priority = task.priority,
            "task submitted"
        );

        let ctx = self.ctx.clone();
        let reports = Arc::clone(&self.reports);
        let semaphore = Arc::clone(&self.semaphore);
        self.workers
            .lock()
            .await
            .spawn(run_task(ctx, reports, semaphore, task, cancel));

        Ok(task_id)
    }

    /// Terminal report for a task, or None while in flight or unknown.
    pub fn get_task_result(&self, task_id: Uuid) -> Option<TaskReport> {
        self.reports.lock().get(&task_id).cloned()
    }

    /// Per-tier metrics snapshot plus active and completed task counts.
    pub fn get_orchestrator_status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            tiers: self.ctx.metrics.snapshot(),
            active_tasks: self.ctx.table.active_count(),
            completed_tasks: self.reports.lock().len(),
        }
    }

    /// Operator-triggered failover of a tier to its healthiest peer.
    pub async fn emergency_failover(&self, failed_tier: &str) -> EchelonResult<FailoverReport> {
        self.ctx.failover.trigger(failed_tier).await
    }

    /// Put a failed-over tier back into rotation.
    pub async fn reinstate_tier(&self, tier: &str) -> EchelonResult<()> {
        self.ctx.failover.reinstate(tier).await
    }

    /// Audit trail of completed failovers.
    pub fn failover_audit(&self) -> Vec<FailoverReport> {
        self.ctx.failover.audit_log()
    }

    /// Request cancellation of an in-flight task. Returns false if the
    /// task is unknown or already terminal.
    pub fn cancel_task(&self, task_id: Uuid) -> bool {
        let cancelled = self.ctx.table.cancel(task_id);
        if cancelled {
            info!(task_id = %task_id, "cancellation requested");
        }
        cancelled
    }

    /// Drain all supervised workers. Panicked workers are counted and
    /// logged rather than silently dropped.
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                self.worker_panics.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "orchestration worker failed");
            }
        }
    }

    /// Workers that panicked instead of producing a report.
    pub fn worker_panic_count(&self) -> u64 {
        self.worker_panics.load(Ordering::Relaxed)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

async fn run_task(
    ctx: DispatchContext,
    reports: Arc<Mutex<HashMap<Uuid, TaskReport>>>,
    semaphore: Arc<Semaphore>,
    task: Task,
    cancel: CancellationToken,
) {
    // Held until the report is stored; bounds concurrently-active tasks.
    let Ok(_permit) = semaphore.acquire().await else {
        return;
    };

    let started = Instant::now();
    let strategy = select_strategy(&task, &ctx.metrics.snapshot(), &ctx.config);
    info!(task_id = %task.id, strategy = %strategy, "task dispatched");
    ctx.table.set_state(task.id, TaskState::Dispatched);

    let result = if cancel.is_cancelled() {
        Err(EchelonError::Cancelled("cancelled before dispatch".into()))
    } else {
        execute_strategy(&ctx, strategy, &task, &cancel).await
    };
    let execution_time = started.elapsed().as_secs_f64();

    let report = match result {
        Ok(output) => completed_report(&task, strategy, output, execution_time),
        Err(e) => failed_report(&task, strategy, &e, execution_time),
    };

    info!(
        task_id = %task.id,
        status = ?report.status,
        success = report.success,
        execution_time,
        "task finished"
    );
    ctx.table.remove(task.id);
    reports.lock().insert(task.id, report);
}

async fn execute_strategy(
    ctx: &DispatchContext,
    strategy: Strategy,
    task: &Task,
    cancel: &CancellationToken,
) -> EchelonResult<DispatchOutput> {
    match strategy {
        Strategy::Single => dispatch::single::run(ctx, task, cancel).await,
        Strategy::Parallel => dispatch::parallel::run(ctx, task, cancel).await,
        Strategy::Cascade => dispatch::cascade::run(ctx, task, cancel).await,
        Strategy::Consensus => dispatch::consensus::run(ctx, task, cancel).await,
        Strategy::Adaptive => dispatch::adaptive::run(ctx, task, cancel).await,
    }
}

fn completed_report(
    task: &Task,
    strategy: Strategy,
    output: DispatchOutput,
    execution_time: f64,
) -> TaskReport {
    TaskReport {
        task_id: task.id,
        strategy,
        status: TaskState::Completed,
        success: true,
        tiers: output.tiers,
        level: output.level,
        data: output.data,
        confidence: output.confidence,
        execution_time,
        consensus_reached: output.consensus_reached,
        error_code: None,
        error_message: None,
        completed_at: Utc::now(),
    }
}

fn failed_report(
    task: &Task,
    strategy: Strategy,
    error: &EchelonError,
    execution_time: f64,
) -> TaskReport {
    let status = if matches!(error, EchelonError::Cancelled(_)) {
        TaskState::Cancelled
    } else {
        TaskState::Failed
    };
    TaskReport {
        task_id: task.id,
        strategy,
        status,
        success: false,
        tiers: Vec::new(),
        level: None,
        data: Value::Null,
        confidence: 0.0,
        execution_time,
        consensus_reached: false,
        error_code: Some(report_code(error).to_string()),
        error_message: Some(error.to_string()),
        completed_at: Utc::now(),
    }
}

/// Map internal errors to the stable codes terminal reports carry.
fn report_code(error: &EchelonError) -> &'static str {
    match error {
        // A strategy whose candidates all failed could not complete.
        EchelonError::TierInvocation(_) => "ALL_TIERS_FAILED",
        EchelonError::TierUnavailable(_) => "TIER_UNAVAILABLE",
        EchelonError::InsufficientQuorum { .. } => "INSUFFICIENT_QUORUM",
        EchelonError::Cancelled(_) => "CANCELLED",
        other => other.code(),
    }
}
