//! Consensus validation: a fixed slate of diverse tiers voting concurrently.

use super::{fan_out, lowest_load_at_level, DispatchContext, DispatchOutput};
use crate::consensus::ConsensusBuilder;
use echelon_core::{EchelonError, EchelonResult, Task, TaskState, TierLevel};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Resolve the configured slate of levels to concrete tiers and invoke them
/// all concurrently. A quorum of successful responses is required to
/// produce a result; the consensus flag additionally requires the mean
/// confidence to clear the configured threshold.
pub(crate) async fn run(
    ctx: &DispatchContext,
    task: &Task,
    cancel: &CancellationToken,
) -> EchelonResult<DispatchOutput> {
    ctx.table.set_state(task.id, TaskState::AwaitingConsensus);

    let selected = resolve_slate(ctx).await;
    let quorum = ctx.config.consensus_quorum;
    if selected.len() < quorum {
        return Err(EchelonError::TierUnavailable(format!(
            "only {} tier(s) available for a consensus slate of {}",
            selected.len(),
            ctx.config.consensus_slate.len()
        )));
    }

    let names: Vec<String> = selected.iter().map(|(name, _)| name.clone()).collect();
    let outcomes = fan_out(ctx, task, &names).await;
    if cancel.is_cancelled() {
        return Err(EchelonError::Cancelled(
            "cancelled during consensus round".into(),
        ));
    }

    let aggregate = ConsensusBuilder::aggregate(&outcomes);
    if aggregate.successful_count < quorum {
        return Err(EchelonError::InsufficientQuorum {
            successes: aggregate.successful_count,
            required: quorum,
        });
    }

    let consensus_reached =
        aggregate.confidence >= ctx.config.consensus_threshold && aggregate.successful_count >= quorum;
    info!(
        task_id = %task.id,
        successes = aggregate.successful_count,
        confidence = aggregate.confidence,
        consensus_reached,
        "consensus round completed"
    );

    Ok(DispatchOutput {
        tiers: names,
        level: selected.first().map(|(_, level)| *level),
        data: aggregate.data,
        confidence: aggregate.confidence,
        consensus_reached,
    })
}

/// Pick one tier per configured slate level (lowest load), then fill any
/// unresolved slots from the remaining available tiers in registry order.
async fn resolve_slate(ctx: &DispatchContext) -> Vec<(String, TierLevel)> {
    let slate_size = ctx.config.consensus_slate.len();
    let mut selected: Vec<(String, TierLevel)> = Vec::with_capacity(slate_size);

    for &level in &ctx.config.consensus_slate {
        if let Some(name) = lowest_load_at_level(ctx, level).await {
            if !selected.iter().any(|(n, _)| n == &name) {
                selected.push((name, level));
            }
        } else {
            debug!(level = %level, "no tier for consensus slate level");
        }
    }

    if selected.len() < slate_size {
        let registry = ctx.registry.read().await;
        for tier in registry.iter() {
            if selected.len() >= slate_size {
                break;
            }
            if tier.available && !selected.iter().any(|(n, _)| n == &tier.name) {
                debug!(tier = %tier.name, "filling consensus slate from registry order");
                selected.push((tier.name.clone(), tier.level));
            }
        }
    }

    selected
}
