//! Optimistic toggles (like, follow, join)
//!
//! A toggle flips the relation and moves its counter at once, then writes to
//! the store in the background. At most one write per relation is in flight;
//! a toggle issued meanwhile is ignored. On failure the exact pre-toggle
//! state is restored.

use crate::error::MutationError;
use crate::records::{NewRecord, Relation, RelationRecord};
use crate::remote::RemoteMutationService;
use crate::types::{ToggleState, UserId};
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::Instrument;

#[derive(Debug, Clone, Default)]
struct Slot {
    state: ToggleState,
    busy: bool,
    // Bumped by every seed
    generation: u64,
    last_error: Option<String>,
}

type Slots = DashMap<Relation, Slot>;

/// Toggle state for any number of relations
///
/// Relations are independent: a write in flight on one never delays another.
/// Clones share the same state.
#[derive(Clone)]
pub struct ToggleController {
    remote: Arc<dyn RemoteMutationService>,
    slots: Arc<Slots>,
}

impl ToggleController {
    /// Controller with no known relations
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteMutationService>) -> Self {
        Self {
            remote,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Set state from a fetch
    ///
    /// A write already in flight keeps running; if it fails afterwards it
    /// will not overwrite the seeded state.
    pub fn seed(&self, relation: Relation, active: bool, count: u64) {
        let mut slot = self.slots.entry(relation).or_default();
        slot.state = ToggleState::new(active, count);
        slot.generation += 1;
    }

    /// Current (possibly optimistic) state; `(false, 0)` for unknown relations
    #[must_use]
    pub fn state(&self, relation: &Relation) -> ToggleState {
        self.slots
            .get(relation)
            .map(|slot| slot.state)
            .unwrap_or_default()
    }

    /// Check if a write for `relation` is in flight
    #[must_use]
    pub fn is_busy(&self, relation: &Relation) -> bool {
        self.slots.get(relation).is_some_and(|slot| slot.busy)
    }

    /// Message of the last rejected write for `relation`
    #[must_use]
    pub fn last_error(&self, relation: &Relation) -> Option<String> {
        self.slots
            .get(relation)
            .and_then(|slot| slot.last_error.clone())
    }

    /// Flip `relation` for the signed-in user
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// A relation with a write in flight is reported as ignored before the
    /// session is consulted.
    ///
    /// # Errors
    /// `MutationError::Unauthenticated` if nobody is signed in; state is untouched
    pub fn toggle(&self, relation: &Relation) -> Result<ToggleOutcome, MutationError> {
        if let Some(ignored) = self.ignored_if_busy(relation) {
            return Ok(ignored);
        }
        let identity = self
            .remote
            .current_user()
            .ok_or(MutationError::Unauthenticated)?;

        let (previous, optimistic, generation) = {
            let mut slot = self.slots.entry(relation.clone()).or_default();
            // Re-checked under the entry lock
            if slot.busy {
                tracing::debug!(%relation, "toggle ignored; write in flight");
                return Ok(ToggleOutcome::Ignored { state: slot.state });
            }
            let previous = slot.state;
            slot.state = previous.flipped();
            slot.busy = true;
            slot.last_error = None;
            (previous, slot.state, slot.generation)
        };
        tracing::debug!(%relation, active = optimistic.active, count = optimistic.count, "optimistic toggle");

        let span = tracing::debug_span!("reconcile_toggle", %relation);
        let handle = tokio::spawn(
            reconcile_toggle(
                Arc::clone(&self.remote),
                Arc::downgrade(&self.slots),
                relation.clone(),
                identity.id,
                Snapshot {
                    previous,
                    optimistic,
                    generation,
                },
            )
            .instrument(span),
        );

        Ok(ToggleOutcome::InFlight(PendingToggle {
            previous,
            optimistic,
            handle,
        }))
    }

    fn ignored_if_busy(&self, relation: &Relation) -> Option<ToggleOutcome> {
        let slot = self.slots.get(relation)?;
        if !slot.busy {
            return None;
        }
        tracing::debug!(%relation, "toggle ignored; write in flight");
        Some(ToggleOutcome::Ignored { state: slot.state })
    }
}

impl std::fmt::Debug for ToggleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleController")
            .field("relations", &self.slots.len())
            .finish_non_exhaustive()
    }
}

/// Result of [`ToggleController::toggle`]
#[derive(Debug)]
pub enum ToggleOutcome {
    /// A write for the same relation was in flight; nothing changed
    Ignored {
        /// State at the time of the call
        state: ToggleState,
    },
    /// Optimistic state applied and write started
    InFlight(PendingToggle),
}

impl ToggleOutcome {
    /// State visible right after the call
    #[must_use]
    pub fn state(&self) -> ToggleState {
        match self {
            Self::Ignored { state } => *state,
            Self::InFlight(pending) => pending.optimistic,
        }
    }

    /// Check if the call was dropped
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }

    /// Pending write, if one was started
    #[must_use]
    pub fn into_pending(self) -> Option<PendingToggle> {
        match self {
            Self::InFlight(pending) => Some(pending),
            Self::Ignored { .. } => None,
        }
    }
}

/// Toggle write in flight
#[derive(Debug)]
pub struct PendingToggle {
    previous: ToggleState,
    optimistic: ToggleState,
    handle: JoinHandle<Result<ToggleState, MutationError>>,
}

impl PendingToggle {
    /// State before the toggle
    #[inline]
    #[must_use]
    pub fn previous(&self) -> ToggleState {
        self.previous
    }

    /// State shown while the write is in flight
    #[inline]
    #[must_use]
    pub fn optimistic(&self) -> ToggleState {
        self.optimistic
    }

    /// Wait for reconciliation and return the final state
    ///
    /// # Errors
    /// - `MutationError::RemoteRejected` once the state has been restored
    /// - `MutationError::Aborted` if the task panicked or was cancelled
    pub async fn settle(self) -> Result<ToggleState, MutationError> {
        self.handle
            .await
            .map_err(|e| MutationError::Aborted(e.to_string()))?
    }
}

/// Slot state captured when the toggle was applied
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    previous: ToggleState,
    optimistic: ToggleState,
    generation: u64,
}

async fn reconcile_toggle(
    remote: Arc<dyn RemoteMutationService>,
    slots: Weak<Slots>,
    relation: Relation,
    user_id: UserId,
    snapshot: Snapshot,
) -> Result<ToggleState, MutationError> {
    let Snapshot {
        previous,
        optimistic,
        generation,
    } = snapshot;
    let table = relation.table();
    let result = if optimistic.active {
        let record = NewRecord::Relation(RelationRecord {
            relation: relation.clone(),
            user_id,
        });
        remote.insert(table, record).await.map(|_| ())
    } else {
        remote.delete(table, relation.match_keys(&user_id)).await
    };

    let Some(slots) = slots.upgrade() else {
        tracing::debug!("controller dropped before the write resolved; skipping reconciliation");
        return result.map(|()| optimistic).map_err(MutationError::from);
    };

    let mut slot = slots.entry(relation).or_default();
    slot.busy = false;
    match result {
        Ok(()) => {
            tracing::debug!("toggle confirmed");
            Ok(slot.state)
        }
        Err(err) => {
            // A seed since the toggle wins over the rollback
            if slot.generation == generation {
                slot.state = previous;
            }
            slot.last_error = Some(err.message.clone());
            tracing::warn!(error = %err, code = ?err.code, "toggle rejected; reverted");
            Err(err.into())
        }
    }
}
