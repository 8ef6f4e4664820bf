use crate::error::{EchelonError, EchelonResult};
use crate::level::TierLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Tunable parameters for the orchestration engine.
///
/// All fields have serde defaults so a partial TOML table is enough to
/// override just one knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Load gauge value above which a tier counts as busy for strategy
    /// selection.
    #[serde(default = "default_load_threshold")]
    pub load_threshold: f64,

    /// Mean confidence a consensus round must clear to be considered
    /// reached.
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Minimum successful responses a consensus round needs to produce a
    /// result at all.
    #[serde(default = "default_consensus_quorum")]
    pub consensus_quorum: usize,

    /// Levels forming the consensus slate, resolved to concrete tiers at
    /// dispatch time.
    #[serde(default = "default_consensus_slate")]
    pub consensus_slate: Vec<TierLevel>,

    /// Whether plain tasks are routed through adaptive selection instead of
    /// straight single-tier dispatch.
    #[serde(default = "default_adaptive_routing")]
    pub adaptive_routing: bool,

    /// Maximum concurrently-active tasks in the scheduler.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Fallback invocation timeout in seconds for levels without an
    /// explicit entry in `level_timeouts`.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Per-level invocation timeout overrides, in seconds.
    #[serde(default)]
    pub level_timeouts: HashMap<TierLevel, u64>,

    /// Confidence substituted when a backend response omits one.
    #[serde(default = "default_confidence")]
    pub default_confidence: f64,

    /// Consecutive invocation failures after which a tier is failed over
    /// implicitly.
    #[serde(default = "default_failure_threshold")]
    pub failover_failure_threshold: u32,
}

fn default_load_threshold() -> f64 {
    0.8
}

fn default_consensus_threshold() -> f64 {
    0.75
}

fn default_consensus_quorum() -> usize {
    2
}

fn default_consensus_slate() -> Vec<TierLevel> {
    vec![TierLevel::Execution, TierLevel::Quality, TierLevel::Tactical]
}

fn default_adaptive_routing() -> bool {
    true
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_confidence() -> f64 {
    0.5
}

fn default_failure_threshold() -> u32 {
    3
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            load_threshold: default_load_threshold(),
            consensus_threshold: default_consensus_threshold(),
            consensus_quorum: default_consensus_quorum(),
            consensus_slate: default_consensus_slate(),
            adaptive_routing: default_adaptive_routing(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            default_timeout_secs: default_timeout_secs(),
            level_timeouts: HashMap::new(),
            default_confidence: default_confidence(),
            failover_failure_threshold: default_failure_threshold(),
        }
    }
}

impl OrchestratorConfig {
    /// Invocation timeout for a given hierarchy level.
    pub fn timeout_for(&self, level: TierLevel) -> Duration {
        let secs = self
            .level_timeouts
            .get(&level)
            .copied()
            .unwrap_or(self.default_timeout_secs);
        Duration::from_secs(secs)
    }

    /// Validate threshold ranges and structural requirements.
    pub fn validate(&self) -> EchelonResult<()> {
        if !(0.0..=1.0).contains(&self.load_threshold) {
            return Err(EchelonError::Config(format!(
                "load_threshold {} outside [0, 1]",
                self.load_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.consensus_threshold) {
            return Err(EchelonError::Config(format!(
                "consensus_threshold {} outside [0, 1]",
                self.consensus_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(EchelonError::Config(format!(
                "default_confidence {} outside [0, 1]",
                self.default_confidence
            )));
        }
        if self.consensus_quorum == 0 {
            return Err(EchelonError::Config(
                "consensus_quorum must be at least 1".into(),
            ));
        }
        if self.consensus_slate.len() < self.consensus_quorum {
            return Err(EchelonError::Config(format!(
                "consensus slate of {} cannot satisfy quorum of {}",
                self.consensus_slate.len(),
                self.consensus_quorum
            )));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(EchelonError::Config(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.failover_failure_threshold == 0 {
            return Err(EchelonError::Config(
                "failover_failure_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
