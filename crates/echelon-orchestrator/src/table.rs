use echelon_core::TaskState;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct ActiveEntry {
    state: TaskState,
    current_tier: Option<String>,
    cancel: CancellationToken,
}

/// In-flight task table owned by the orchestration manager.
///
/// Tracks lifecycle state, the tier a task currently references (which
/// failover may re-point), and the per-task cancellation token. Entries are
/// removed once a terminal report is stored.
#[derive(Default)]
pub struct ActiveTaskTable {
    entries: Mutex<HashMap<Uuid, ActiveEntry>>,
}

impl ActiveTaskTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly submitted task and return its cancellation token.
    pub fn insert(&self, id: Uuid) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.entries.lock().insert(
            id,
            ActiveEntry {
                state: TaskState::Submitted,
                current_tier: None,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Advance a task's lifecycle state.
    pub fn set_state(&self, id: Uuid, state: TaskState) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.state = state;
        }
    }

    /// Current lifecycle state, if the task is still in flight.
    pub fn state_of(&self, id: Uuid) -> Option<TaskState> {
        self.entries.lock().get(&id).map(|e| e.state)
    }

    /// Record which tier the task currently references.
    pub fn set_tier(&self, id: Uuid, tier: Option<String>) {
        if let Some(entry) = self.entries.lock().get_mut(&id) {
            entry.current_tier = tier;
        }
    }

    /// Tier the task currently references.
    pub fn tier_of(&self, id: Uuid) -> Option<String> {
        self.entries.lock().get(&id).and_then(|e| e.current_tier.clone())
    }

    /// Re-point every in-flight task referencing `from` to `to`.
    /// Returns the number of redirected tasks.
    pub fn redirect(&self, from: &str, to: &str) -> usize {
        let mut entries = self.entries.lock();
        let mut redirected = 0;
        for entry in entries.values_mut() {
            if entry.current_tier.as_deref() == Some(from) {
                entry.current_tier = Some(to.to_string());
                redirected += 1;
            }
        }
        redirected
    }

    /// Request cancellation. Returns true if the task was in flight.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.entries.lock().get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop a task that reached a terminal state.
    pub fn remove(&self, id: Uuid) {
        self.entries.lock().remove(&id);
    }

    /// Number of in-flight tasks.
    pub fn active_count(&self) -> usize {
        self.entries.lock().len()
    }
}
