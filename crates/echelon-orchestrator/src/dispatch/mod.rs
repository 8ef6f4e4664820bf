//! Strategy implementations and shared dispatch plumbing.
//!
//! Every strategy runs against the same [`DispatchContext`] and funnels each
//! backend call through [`invoke_tier`], which owns the timeout, the load
//! gauge, metrics accounting, and the implicit-failover trigger.

pub(crate) mod adaptive;
pub(crate) mod cascade;
pub(crate) mod consensus;
pub(crate) mod parallel;
pub(crate) mod single;
#[cfg(test)]
pub(crate) mod testutil;

use crate::consensus::TierOutcome;
use crate::contract::InvocationRequest;
use crate::failover::FailoverController;
use crate::metrics::MetricsTracker;
use crate::registry::TierRegistry;
use crate::table::ActiveTaskTable;
use echelon_core::{EchelonError, EchelonResult, OrchestratorConfig, Task, TierLevel};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Shared state every strategy executes against. Cheap to clone; all fields
/// are reference-counted.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub registry: Arc<RwLock<TierRegistry>>,
    pub metrics: Arc<MetricsTracker>,
    pub config: Arc<OrchestratorConfig>,
    pub failover: Arc<FailoverController>,
    pub table: Arc<ActiveTaskTable>,
}

/// What a strategy hands back to the manager on success. Failure terminal
/// paths are expressed as errors and mapped to report codes there.
#[derive(Debug, Clone)]
pub(crate) struct DispatchOutput {
    pub tiers: Vec<String>,
    pub level: Option<TierLevel>,
    pub data: Value,
    pub confidence: f64,
    pub consensus_reached: bool,
}

/// Lowest-load available tier at a level; ties break on the
/// lexicographically smallest name.
pub(crate) async fn lowest_load_at_level(
    ctx: &DispatchContext,
    level: TierLevel,
) -> Option<String> {
    let registry = ctx.registry.read().await;
    let mut candidates = registry.available_at_level(level);
    candidates.sort_by(|a, b| {
        let load_a = ctx.metrics.current_load(&a.name);
        let load_b = ctx.metrics.current_load(&b.name);
        load_a
            .partial_cmp(&load_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    candidates.first().map(|t| t.name.clone())
}

/// Invoke one tier with the per-level timeout, recording load and metrics.
///
/// Invocation errors and timeouts are folded into metrics as failures and
/// surface as `TierInvocation`; a completed invocation always yields a
/// [`TierOutcome`], even when the backend reported failure. Crossing the
/// configured consecutive-failure threshold triggers implicit failover.
pub(crate) async fn invoke_tier(
    ctx: &DispatchContext,
    task_id: Uuid,
    tier_name: &str,
    request: InvocationRequest,
) -> EchelonResult<TierOutcome> {
    let (handle, level, registry_index) = {
        let registry = ctx.registry.read().await;
        let tier = registry.get(tier_name).ok_or_else(|| {
            EchelonError::TierUnavailable(format!("unknown tier '{tier_name}'"))
        })?;
        let index = registry.index_of(tier_name).unwrap_or(0);
        (Arc::clone(&tier.handle), tier.level, index)
    };

    ctx.table.set_tier(task_id, Some(tier_name.to_string()));
    ctx.metrics.begin_invocation(tier_name);
    let started = Instant::now();
    let invoked = timeout(ctx.config.timeout_for(level), handle.invoke(request)).await;
    let duration = started.elapsed();
    ctx.metrics.end_invocation(tier_name);

    let response = match invoked {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            let failures = ctx.metrics.record_completion(tier_name, false, duration, 0.0);
            maybe_failover(ctx, tier_name, failures).await;
            return Err(EchelonError::TierInvocation(format!(
                "tier '{tier_name}' failed: {e}"
            )));
        }
        Err(_) => {
            let failures = ctx.metrics.record_completion(tier_name, false, duration, 0.0);
            maybe_failover(ctx, tier_name, failures).await;
            return Err(EchelonError::TierInvocation(format!(
                "tier '{tier_name}' timed out after {duration:?}"
            )));
        }
    };

    let confidence = if response.success {
        match response.confidence {
            Some(c) if (0.0..=1.0).contains(&c) => c,
            Some(c) => {
                warn!(tier = %tier_name, confidence = c, "confidence outside [0, 1], clamping");
                c.clamp(0.0, 1.0)
            }
            None => {
                warn!(
                    tier = %tier_name,
                    fallback = ctx.config.default_confidence,
                    "backend response missing confidence, using default"
                );
                ctx.config.default_confidence
            }
        }
    } else {
        0.0
    };

    let failures = ctx
        .metrics
        .record_completion(tier_name, response.success, duration, confidence);
    maybe_failover(ctx, tier_name, failures).await;

    debug!(
        tier = %tier_name,
        success = response.success,
        confidence,
        duration_ms = duration.as_millis(),
        "tier invocation completed"
    );

    Ok(TierOutcome {
        tier: tier_name.to_string(),
        registry_index,
        level,
        success: response.success,
        data: response.data,
        confidence,
        continue_cascade: response.continue_cascade,
        duration,
    })
}

/// Concurrently invoke several tiers with join-all semantics, tolerating
/// individual failures. Returns only the completed outcomes.
pub(crate) async fn fan_out(
    ctx: &DispatchContext,
    task: &Task,
    tiers: &[String],
) -> Vec<TierOutcome> {
    let mut join_set: JoinSet<EchelonResult<TierOutcome>> = JoinSet::new();
    for tier in tiers {
        let ctx = ctx.clone();
        let tier = tier.clone();
        let request = InvocationRequest::new(task.clone());
        let task_id = task.id;
        join_set.spawn(async move { invoke_tier(&ctx, task_id, &tier, request).await });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(e)) => debug!(error = %e, "fan-out invocation absorbed"),
            Err(e) => error!(error = %e, "fan-out worker panicked"),
        }
    }
    outcomes
}

async fn maybe_failover(ctx: &DispatchContext, tier_name: &str, consecutive_failures: u32) {
    if consecutive_failures == ctx.config.failover_failure_threshold {
        warn!(
            tier = %tier_name,
            consecutive_failures,
            "consecutive failure threshold reached, triggering failover"
        );
        if let Err(e) = ctx.failover.trigger(tier_name).await {
            warn!(tier = %tier_name, error = %e, "implicit failover not applied");
        }
    }
}
