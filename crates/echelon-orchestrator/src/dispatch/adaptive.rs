//! Adaptive dispatch: route by system health, with one retry.

use super::{invoke_tier, DispatchContext, DispatchOutput};
use crate::contract::InvocationRequest;
use echelon_core::{EchelonError, EchelonResult, Task};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// System-state thresholds for the health evaluation.
const GOOD_SUCCESS_RATE: f64 = 0.8;
const GOOD_AVERAGE_LOAD: f64 = 0.8;

/// Evaluate overall system health. While healthy, route like single-tier
/// dispatch; while degraded, score every registered tier by
/// `success_rate × (1 − current_load)` and take the best. The first failed
/// attempt may be retried once against the next-best candidate; nothing is
/// committed before an invocation completes, so the retry is safe.
pub(crate) async fn run(
    ctx: &DispatchContext,
    task: &Task,
    cancel: &CancellationToken,
) -> EchelonResult<DispatchOutput> {
    if cancel.is_cancelled() {
        return Err(EchelonError::Cancelled("cancelled before dispatch".into()));
    }

    let snapshot = ctx.metrics.snapshot();
    let (overall_success_rate, average_load) = system_state(&snapshot);
    let healthy = overall_success_rate > GOOD_SUCCESS_RATE && average_load < GOOD_AVERAGE_LOAD;
    debug!(
        overall_success_rate,
        average_load,
        health = if healthy { "good" } else { "degraded" },
        "adaptive system state"
    );

    let candidates = if healthy {
        healthy_candidates(ctx, task).await
    } else {
        degraded_candidates(ctx).await
    };
    let Some(first) = candidates.first() else {
        return Err(EchelonError::TierUnavailable(
            "no available tier for adaptive dispatch".into(),
        ));
    };

    match attempt(ctx, task, first).await {
        Ok(output) => Ok(output),
        Err(first_err) => {
            let Some(second) = candidates.get(1) else {
                return Err(first_err);
            };
            warn!(
                tier = %first,
                retry_tier = %second,
                error = %first_err,
                "adaptive first choice failed, reselecting once"
            );
            attempt(ctx, task, second).await.map_err(|_| {
                EchelonError::TierInvocation("adaptive dispatch exhausted both candidates".into())
            })
        }
    }
}

async fn attempt(
    ctx: &DispatchContext,
    task: &Task,
    tier: &str,
) -> EchelonResult<DispatchOutput> {
    let outcome = invoke_tier(ctx, task.id, tier, InvocationRequest::new(task.clone())).await?;
    if !outcome.success {
        return Err(EchelonError::TierInvocation(format!(
            "tier '{tier}' reported failure"
        )));
    }
    Ok(DispatchOutput {
        tiers: vec![outcome.tier.clone()],
        level: Some(outcome.level),
        data: outcome.data,
        confidence: outcome.confidence,
        consensus_reached: false,
    })
}

fn system_state(snapshot: &[crate::metrics::TierMetricsSnapshot]) -> (f64, f64) {
    if snapshot.is_empty() {
        return (1.0, 0.0);
    }
    let n = snapshot.len() as f64;
    let success = snapshot.iter().map(|m| m.success_rate).sum::<f64>() / n;
    let load = snapshot.iter().map(|m| m.current_load).sum::<f64>() / n;
    (success, load)
}

/// Complexity-mapped level, lowest load first; registry fallback appended
/// so a retry can leave an empty level.
async fn healthy_candidates(ctx: &DispatchContext, task: &Task) -> Vec<String> {
    let registry = ctx.registry.read().await;
    let mut at_level = registry.available_at_level(task.complexity.target_level());
    at_level.sort_by(|a, b| {
        let load_a = ctx.metrics.current_load(&a.name);
        let load_b = ctx.metrics.current_load(&b.name);
        load_a
            .partial_cmp(&load_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    let mut candidates: Vec<String> = at_level.iter().map(|t| t.name.clone()).collect();
    if let Some(fallback) = registry.first_available() {
        if !candidates.contains(&fallback.name) {
            candidates.push(fallback.name.clone());
        }
    }
    candidates
}

/// All available tiers ranked by `success_rate × (1 − current_load)`,
/// ties broken by lowest average execution time, then name.
async fn degraded_candidates(ctx: &DispatchContext) -> Vec<String> {
    let registry = ctx.registry.read().await;
    let mut scored: Vec<(f64, f64, String)> = registry
        .iter()
        .filter(|t| t.available)
        .filter_map(|t| {
            ctx.metrics.snapshot_for(&t.name).map(|m| {
                let score = m.success_rate * (1.0 - m.current_load);
                (score, m.average_execution_time, t.name.clone())
            })
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.2.cmp(&b.2))
    });
    scored.into_iter().map(|(_, _, name)| name).collect()
}
