//! Parallel fan-out: 2–3 tiers of distinct specialty, invoked concurrently.

use super::{fan_out, lowest_load_at_level, DispatchContext, DispatchOutput};
use crate::consensus::ConsensusBuilder;
use echelon_core::{EchelonError, EchelonResult, Task, TaskState, TierLevel};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fan a task out across an execution-level tier (collective decision), a
/// quality-level tier (validation), and a tactical tier — or the
/// specialized tier when the task is tagged specialized. Joins all
/// invocations, tolerating partial failure; at least one success completes
/// the task.
pub(crate) async fn run(
    ctx: &DispatchContext,
    task: &Task,
    cancel: &CancellationToken,
) -> EchelonResult<DispatchOutput> {
    ctx.table.set_state(task.id, TaskState::ParallelWait);

    let execution = lowest_load_at_level(ctx, TierLevel::Execution).await;
    let quality = lowest_load_at_level(ctx, TierLevel::Quality).await;
    let (Some(execution), Some(quality)) = (execution, quality) else {
        return Err(EchelonError::TierUnavailable(
            "parallel fan-out requires execution and quality tiers".into(),
        ));
    };

    let third_level = if task.is_specialized() {
        TierLevel::Specialized
    } else {
        TierLevel::Tactical
    };
    let mut selected = vec![execution, quality];
    match lowest_load_at_level(ctx, third_level).await {
        Some(third) if !selected.contains(&third) => selected.push(third),
        Some(_) | None => {
            debug!(level = %third_level, "fan-out proceeding with two tiers");
        }
    }

    let outcomes = fan_out(ctx, task, &selected).await;
    if cancel.is_cancelled() {
        return Err(EchelonError::Cancelled(
            "cancelled during parallel fan-out".into(),
        ));
    }

    let aggregate = ConsensusBuilder::aggregate(&outcomes);
    if !aggregate.success {
        return Err(EchelonError::TierInvocation(
            "all parallel candidates failed".into(),
        ));
    }

    Ok(DispatchOutput {
        tiers: selected,
        level: Some(TierLevel::Execution),
        data: aggregate.data,
        confidence: aggregate.confidence,
        consensus_reached: false,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dispatch::testutil::{context, ok_tier, ErroringHandle};
    use crate::registry::Tier;
    use echelon_core::{Complexity, REQ_SPECIALIZED};
    use serde_json::{json, Map, Value};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_selects_execution_quality_and_tactical() {
        let (exec, exec_h) = ok_tier("exec", TierLevel::Execution, 0.9);
        let (quality, quality_h) = ok_tier("quality", TierLevel::Quality, 0.8);
        let (tac, tac_h) = ok_tier("tac", TierLevel::Tactical, 0.7);
        let (spec, spec_h) = ok_tier("spec", TierLevel::Specialized, 0.6);
        let ctx = context(vec![exec, quality, tac, spec]);

        let task = Task::new("analysis", Complexity::Moderate);
        let output = run(&ctx, &task, &CancellationToken::new()).await.unwrap();

        assert_eq!(output.tiers, vec!["exec", "quality", "tac"]);
        assert_eq!(exec_h.calls(), 1);
        assert_eq!(quality_h.calls(), 1);
        assert_eq!(tac_h.calls(), 1);
        assert_eq!(spec_h.calls(), 0);

        // Mean of the three confidences.
        assert!((output.confidence - 0.8).abs() < 1e-12);
        // Structured merge of all three payloads.
        assert_eq!(
            output.data,
            json!({
                "exec_result": "ok",
                "quality_result": "ok",
                "tac_result": "ok",
            })
        );
    }

    #[tokio::test]
    async fn test_specialized_task_substitutes_specialized_tier() {
        let (exec, _) = ok_tier("exec", TierLevel::Execution, 0.9);
        let (quality, _) = ok_tier("quality", TierLevel::Quality, 0.8);
        let (tac, tac_h) = ok_tier("tac", TierLevel::Tactical, 0.7);
        let (spec, spec_h) = ok_tier("spec", TierLevel::Specialized, 0.6);
        let ctx = context(vec![exec, quality, tac, spec]);

        let mut reqs = Map::new();
        reqs.insert(REQ_SPECIALIZED.to_string(), Value::Bool(true));
        let task = Task::new("voice", Complexity::Moderate).with_requirements(reqs);
        let output = run(&ctx, &task, &CancellationToken::new()).await.unwrap();

        assert_eq!(output.tiers, vec!["exec", "quality", "spec"]);
        assert_eq!(spec_h.calls(), 1);
        assert_eq!(tac_h.calls(), 0);
    }

    #[tokio::test]
    async fn test_two_tiers_when_no_third_available() {
        let (exec, _) = ok_tier("exec", TierLevel::Execution, 0.9);
        let (quality, _) = ok_tier("quality", TierLevel::Quality, 0.7);
        let ctx = context(vec![exec, quality]);

        let task = Task::new("analysis", Complexity::Moderate);
        let output = run(&ctx, &task, &CancellationToken::new()).await.unwrap();
        assert_eq!(output.tiers.len(), 2);
        assert!((output.confidence - 0.8).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let (exec, _) = ok_tier("exec", TierLevel::Execution, 0.9);
        let broken = ErroringHandle::new();
        let (tac, _) = ok_tier("tac", TierLevel::Tactical, 0.5);
        let ctx = context(vec![
            exec,
            Tier::new("quality", TierLevel::Quality, Arc::clone(&broken) as _),
            tac,
        ]);

        let task = Task::new("analysis", Complexity::Moderate);
        let output = run(&ctx, &task, &CancellationToken::new()).await.unwrap();

        // Confidence averages only the successes.
        assert!((output.confidence - 0.7).abs() < 1e-12);
        assert_eq!(
            output.data,
            json!({"exec_result": "ok", "tac_result": "ok"})
        );
    }

    #[tokio::test]
    async fn test_all_failed() {
        let b1 = ErroringHandle::new();
        let b2 = ErroringHandle::new();
        let ctx = context(vec![
            Tier::new("exec", TierLevel::Execution, Arc::clone(&b1) as _),
            Tier::new("quality", TierLevel::Quality, Arc::clone(&b2) as _),
        ]);

        let task = Task::new("analysis", Complexity::Moderate);
        let err = run(&ctx, &task, &CancellationToken::new()).await;
        assert!(matches!(err, Err(EchelonError::TierInvocation(_))));
    }

    #[tokio::test]
    async fn test_missing_required_level() {
        let (exec, _) = ok_tier("exec", TierLevel::Execution, 0.9);
        let ctx = context(vec![exec]);
        let task = Task::new("analysis", Complexity::Moderate);
        let err = run(&ctx, &task, &CancellationToken::new()).await;
        assert!(matches!(err, Err(EchelonError::TierUnavailable(_))));
    }
}
