//! Hierarchical cascade: sequential walk up the fixed level order.

use super::{invoke_tier, lowest_load_at_level, DispatchContext, DispatchOutput};
use crate::consensus::TierOutcome;
use crate::contract::InvocationRequest;
use echelon_core::{EchelonError, EchelonResult, Task, TaskState, CASCADE_ORDER, CTX_PREVIOUS_RESULT};
use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Walk operations → quality → execution → tactical → strategic, feeding
/// each level's output to the next under the `previous_result` context key.
///
/// Levels with no available tier are skipped; a level whose invocation
/// fails is absorbed and the cascade continues without updating the
/// context. A level that declares `continue_cascade = false` ends the walk
/// and its output becomes the result. Cancellation is honored between
/// steps.
pub(crate) async fn run(
    ctx: &DispatchContext,
    task: &Task,
    cancel: &CancellationToken,
) -> EchelonResult<DispatchOutput> {
    ctx.table.set_state(task.id, TaskState::Cascading);

    let mut context = Map::new();
    let mut invoked: Vec<String> = Vec::new();
    let mut attempted_any = false;
    let mut last: Option<TierOutcome> = None;

    for level in CASCADE_ORDER {
        if cancel.is_cancelled() {
            return Err(EchelonError::Cancelled(
                "cancelled between cascade steps".into(),
            ));
        }

        let Some(tier) = lowest_load_at_level(ctx, level).await else {
            debug!(level = %level, "no available tier, skipping cascade level");
            continue;
        };
        attempted_any = true;

        let request = InvocationRequest::with_context(task.clone(), context.clone());
        invoked.push(tier.clone());
        match invoke_tier(ctx, task.id, &tier, request).await {
            Ok(outcome) if outcome.success => {
                context.insert(CTX_PREVIOUS_RESULT.to_string(), outcome.data.clone());
                let stop = !outcome.continue_cascade;
                last = Some(outcome);
                if stop {
                    debug!(level = %level, tier = %tier, "cascade stopped by level output");
                    break;
                }
            }
            Ok(_) => {
                debug!(level = %level, tier = %tier, "level reported failure, continuing cascade");
            }
            Err(e) => {
                debug!(level = %level, tier = %tier, error = %e, "level invocation absorbed");
            }
        }
    }

    match last {
        Some(outcome) => Ok(DispatchOutput {
            tiers: invoked,
            level: Some(outcome.level),
            data: outcome.data,
            confidence: outcome.confidence,
            consensus_reached: false,
        }),
        None if !attempted_any => Err(EchelonError::TierUnavailable(
            "no available tier at any cascade level".into(),
        )),
        None => Err(EchelonError::TierInvocation(
            "every cascade level failed".into(),
        )),
    }
}
