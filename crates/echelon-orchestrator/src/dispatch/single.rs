//! Single-tier dispatch: route by complexity, invoke once.

use super::{invoke_tier, lowest_load_at_level, DispatchContext, DispatchOutput};
use crate::contract::InvocationRequest;
use echelon_core::{EchelonError, EchelonResult, Task};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Map the task's complexity to a hierarchy level and invoke the
/// lowest-load tier there. Falls back to the first registered available
/// tier when the mapped level is empty.
pub(crate) async fn run(
    ctx: &DispatchContext,
    task: &Task,
    cancel: &CancellationToken,
) -> EchelonResult<DispatchOutput> {
    if cancel.is_cancelled() {
        return Err(EchelonError::Cancelled("cancelled before dispatch".into()));
    }

    let target_level = task.complexity.target_level();
    let tier = match lowest_load_at_level(ctx, target_level).await {
        Some(tier) => tier,
        None => {
            debug!(level = %target_level, "no tier at mapped level, using registry fallback");
            let registry = ctx.registry.read().await;
            registry
                .first_available()
                .map(|t| t.name.clone())
                .ok_or_else(|| {
                    EchelonError::TierUnavailable("no available tier registered".into())
                })?
        }
    };

    let outcome = invoke_tier(ctx, task.id, &tier, InvocationRequest::new(task.clone())).await?;
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

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dispatch::testutil::{context, ok_tier, ErroringHandle};
    use crate::registry::Tier;
    use echelon_core::{Complexity, TierLevel};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_routes_by_complexity_mapping() {
        let (ops, ops_handle) = ok_tier("ops-1", TierLevel::Operations, 0.9);
        let (tac, tac_handle) = ok_tier("tac-1", TierLevel::Tactical, 0.9);
        let ctx = context(vec![ops, tac]);

        let task = Task::new("lookup", Complexity::Simple);
        let output = run(&ctx, &task, &CancellationToken::new()).await.unwrap();

        assert_eq!(output.tiers, vec!["ops-1"]);
        assert_eq!(output.level, Some(TierLevel::Operations));
        assert_eq!(ops_handle.calls(), 1);
        assert_eq!(tac_handle.calls(), 0);
    }

    #[tokio::test]
    async fn test_lowest_load_wins_with_name_tiebreak() {
        let (a, a_handle) = ok_tier("exec-a", TierLevel::Execution, 0.9);
        let (b, b_handle) = ok_tier("exec-b", TierLevel::Execution, 0.9);
        let ctx = context(vec![b, a]);

        // Equal load: lexicographically smallest name wins regardless of
        // registration order.
        let task = Task::new("build", Complexity::Complex);
        run(&ctx, &task, &CancellationToken::new()).await.unwrap();
        assert_eq!(a_handle.calls(), 1);
        assert_eq!(b_handle.calls(), 0);

        // Load a, and the other tier takes over.
        ctx.metrics.begin_invocation("exec-a");
        run(&ctx, &task, &CancellationToken::new()).await.unwrap();
        assert_eq!(b_handle.calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_first_registered_tier() {
        let (quality, quality_handle) = ok_tier("q-1", TierLevel::Quality, 0.8);
        let ctx = context(vec![quality]);

        // Simple maps to operations, which has no tier.
        let task = Task::new("lookup", Complexity::Simple);
        let output = run(&ctx, &task, &CancellationToken::new()).await.unwrap();
        assert_eq!(output.tiers, vec!["q-1"]);
        assert_eq!(output.level, Some(TierLevel::Quality));
        assert_eq!(quality_handle.calls(), 1);
    }

    #[tokio::test]
    async fn test_invocation_error_propagates() {
        let handle = ErroringHandle::new();
        let tier = Tier::new("ops-1", TierLevel::Operations, Arc::clone(&handle) as _);
        let ctx = context(vec![tier]);

        let task = Task::new("lookup", Complexity::Simple);
        let err = run(&ctx, &task, &CancellationToken::new()).await;
        assert!(matches!(err, Err(EchelonError::TierInvocation(_))));
        // The failed attempt is still accounted.
        let snap = ctx.metrics.snapshot_for("ops-1").unwrap();
        assert_eq!(snap.total_tasks, 1);
        assert_eq!(snap.failed_tasks, 1);
    }

    #[tokio::test]
    async fn test_no_tiers_at_all() {
        let (ops, _) = ok_tier("ops-1", TierLevel::Operations, 0.9);
        let ctx = context(vec![ops]);
        {
            let mut registry = ctx.registry.write().await;
            registry.mark_unavailable("ops-1");
        }
        let task = Task::new("lookup", Complexity::Simple);
        let err = run(&ctx, &task, &CancellationToken::new()).await;
        assert!(matches!(err, Err(EchelonError::TierUnavailable(_))));
    }
}
