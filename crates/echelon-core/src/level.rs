use serde::{Deserialize, Serialize};

/// Hierarchy rank of an execution tier.
///
/// Levels denote increasing scope and authority, from routine operations up
/// to strategic decision-making, plus a slot for specialized backends that
/// sit outside the main ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierLevel {
    /// Routine, low-scope work.
    Operations,
    /// Validation and review.
    Quality,
    /// Collective execution and synthesis.
    Execution,
    /// Mid-scope coordination.
    Tactical,
    /// Highest-scope decisions.
    Strategic,
    /// Domain-specific backends outside the main ladder.
    Specialized,
}

/// Fixed level order walked by cascade dispatch, bottom to top.
///
/// `Specialized` is intentionally absent: specialized tiers are only reached
/// by explicit selection (parallel substitution or adaptive scoring).
pub const CASCADE_ORDER: [TierLevel; 5] = [
    TierLevel::Operations,
    TierLevel::Quality,
    TierLevel::Execution,
    TierLevel::Tactical,
    TierLevel::Strategic,
];

impl std::fmt::Display for TierLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierLevel::Operations => write!(f, "operations"),
            TierLevel::Quality => write!(f, "quality"),
            TierLevel::Execution => write!(f, "execution"),
            TierLevel::Tactical => write!(f, "tactical"),
            TierLevel::Strategic => write!(f, "strategic"),
            TierLevel::Specialized => write!(f, "specialized"),
        }
    }
}
