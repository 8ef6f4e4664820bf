use crate::contract::TierHandle;
use echelon_core::{EchelonError, EchelonResult, TierLevel};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A registered execution backend at a given hierarchy level.
#[derive(Clone)]
pub struct Tier {
    /// Unique tier name.
    pub name: String,
    /// Hierarchy rank.
    pub level: TierLevel,
    /// Capability tags.
    pub capabilities: HashSet<String>,
    /// The uniform invocation adapter.
    pub handle: Arc<dyn TierHandle>,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
    /// Concurrency the backend is sized for; the load gauge moves in
    /// increments of `1 / max_concurrent`.
    pub max_concurrent: u32,
    /// False while the tier is failed over and awaiting reinstatement.
    pub available: bool,
}

impl Tier {
    /// Create an available tier with default concurrency sizing.
    pub fn new(name: impl Into<String>, level: TierLevel, handle: Arc<dyn TierHandle>) -> Self {
        Self {
            name: name.into(),
            level,
            capabilities: HashSet::new(),
            handle,
            metadata: Map::new(),
            max_concurrent: 4,
            available: true,
        }
    }

    /// Add a capability tag.
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.insert(tag.into());
        self
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Size the load-gauge quantum. Values below 1 are raised to 1.
    pub fn with_max_concurrent(mut self, max_concurrent: u32) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("capabilities", &self.capabilities)
            .field("max_concurrent", &self.max_concurrent)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

/// Static-after-startup catalog of tiers.
///
/// Backed by a name→index arena so lookups are O(1) and iteration order is
/// the stable registration order. Read-mostly: the only post-startup
/// mutation is the availability flag, flipped by failover and reinstatement
/// under the manager's exclusive lock.
#[derive(Debug, Default)]
pub struct TierRegistry {
    tiers: Vec<Tier>,
    by_name: HashMap<String, usize>,
}

impl TierRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tier at startup. Rejects duplicate names.
    pub fn register(&mut self, tier: Tier) -> EchelonResult<()> {
        if self.by_name.contains_key(&tier.name) {
            return Err(EchelonError::RegistryMisconfigured(format!(
                "duplicate tier name '{}'",
                tier.name
            )));
        }
        self.by_name.insert(tier.name.clone(), self.tiers.len());
        self.tiers.push(tier);
        Ok(())
    }

    /// Look up a tier by name.
    pub fn get(&self, name: &str) -> Option<&Tier> {
        self.by_name.get(name).map(|&i| &self.tiers[i])
    }

    /// Registration-order position of a tier, used for deterministic
    /// payload-merge ordering.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Iterate all tiers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Tier> {
        self.tiers.iter()
    }

    /// Available tiers at a given level, in registration order.
    pub fn available_at_level(&self, level: TierLevel) -> Vec<&Tier> {
        self.tiers
            .iter()
            .filter(|t| t.available && t.level == level)
            .collect()
    }

    /// First available tier in registration order, the fallback when a
    /// required level has no tier.
    pub fn first_available(&self) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.available)
    }

    /// Available same-level peers of the named tier, excluding it.
    pub fn peers_of(&self, name: &str) -> Vec<&Tier> {
        match self.get(name) {
            Some(tier) => self
                .tiers
                .iter()
                .filter(|t| t.available && t.level == tier.level && t.name != name)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Mark a tier unavailable for new dispatches. Returns false for
    /// unknown names.
    pub fn mark_unavailable(&mut self, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(&i) => {
                self.tiers[i].available = false;
                true
            }
            None => false,
        }
    }

    /// Re-enable a tier after failover. Returns false for unknown names.
    pub fn reinstate(&mut self, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(&i) => {
                self.tiers[i].available = true;
                true
            }
            None => false,
        }
    }

    /// Number of registered tiers.
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// Whether the registry holds no tiers.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}
