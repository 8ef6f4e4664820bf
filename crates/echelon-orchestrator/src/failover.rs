use crate::metrics::MetricsTracker;
use crate::registry::TierRegistry;
use crate::table::ActiveTaskTable;
use chrono::{DateTime, Utc};
use echelon_core::{EchelonError, EchelonResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Audit record emitted for every completed failover.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverReport {
    /// When the failover happened.
    pub timestamp: DateTime<Utc>,
    /// The tier taken out of rotation.
    pub failed_tier: String,
    /// The same-level peer that took over.
    pub backup_tier: String,
    /// In-flight tasks re-pointed at the backup.
    pub redirected_tasks: usize,
}

/// Detects or accepts a failed-tier signal and redirects work to a healthy
/// same-level peer.
///
/// Triggered explicitly by an operator or implicitly by the dispatch layer
/// once a tier accumulates enough consecutive failures. The failed tier
/// stays out of rotation until explicitly reinstated.
pub struct FailoverController {
    registry: Arc<RwLock<TierRegistry>>,
    metrics: Arc<MetricsTracker>,
    table: Arc<ActiveTaskTable>,
    audit: Mutex<Vec<FailoverReport>>,
}

impl FailoverController {
    /// Wire the controller to the shared registry, metrics, and task table.
    pub fn new(
        registry: Arc<RwLock<TierRegistry>>,
        metrics: Arc<MetricsTracker>,
        table: Arc<ActiveTaskTable>,
    ) -> Self {
        Self {
            registry,
            metrics,
            table,
            audit: Mutex::new(Vec::new()),
        }
    }

    /// Fail over the named tier to its lowest-load same-level peer.
    ///
    /// Marks the tier unavailable, re-points in-flight tasks, and emits an
    /// audit record. Fails if the tier is unknown, already out of rotation,
    /// or has no available peer at its level.
    pub async fn trigger(&self, failed_tier: &str) -> EchelonResult<FailoverReport> {
        let backup = {
            let mut registry = self.registry.write().await;

            let tier = registry.get(failed_tier).ok_or_else(|| {
                EchelonError::TierUnavailable(format!("unknown tier '{failed_tier}'"))
            })?;
            if !tier.available {
                return Err(EchelonError::TierUnavailable(format!(
                    "tier '{failed_tier}' is already out of rotation"
                )));
            }

            let mut peers = registry.peers_of(failed_tier);
            if peers.is_empty() {
                return Err(EchelonError::TierUnavailable(format!(
                    "no backup peer at level {} for tier '{failed_tier}'",
                    tier.level
                )));
            }
            peers.sort_by(|a, b| {
                let load_a = self.metrics.current_load(&a.name);
                let load_b = self.metrics.current_load(&b.name);
                load_a
                    .partial_cmp(&load_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            });
            let backup = peers[0].name.clone();

            registry.mark_unavailable(failed_tier);
            backup
        };

        let redirected_tasks = self.table.redirect(failed_tier, &backup);
        let report = FailoverReport {
            timestamp: Utc::now(),
            failed_tier: failed_tier.to_string(),
            backup_tier: backup.clone(),
            redirected_tasks,
        };

        warn!(
            failed_tier = %failed_tier,
            backup_tier = %backup,
            redirected_tasks,
            "tier failed over"
        );
        self.audit.lock().push(report.clone());
        Ok(report)
    }

    /// Put a failed-over tier back into rotation.
    pub async fn reinstate(&self, tier: &str) -> EchelonResult<()> {
        let mut registry = self.registry.write().await;
        if !registry.reinstate(tier) {
            return Err(EchelonError::TierUnavailable(format!(
                "unknown tier '{tier}'"
            )));
        }
        info!(tier = %tier, "tier reinstated");
        Ok(())
    }

    /// Audit trail of completed failovers, oldest first.
    pub fn audit_log(&self) -> Vec<FailoverReport> {
        self.audit.lock().clone()
    }
}
