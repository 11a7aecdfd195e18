//! Optimistic comment thread
//!
//! Posting a comment shows it at the end of the thread immediately, under a
//! temporary id, while the insert runs on the runtime. The entry is then
//! either replaced by the stored row or removed, and the store's message is
//! kept for display.

use crate::config::MomentConfig;
use crate::error::{MutationError, RemoteError};
use crate::list::{Confirmation, OptimisticList};
use crate::records::{CanonicalRecord, CommentRow, NewComment, NewRecord, Table, ThreadRef};
use crate::remote::RemoteMutationService;
use crate::types::{Comment, EntityId, LocalEntity};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::Instrument;

#[derive(Debug, Default)]
struct ThreadState {
    entries: OptimisticList<Comment>,
    comment_count: u64,
    last_error: Option<String>,
}

/// Comment list for one photo or community post
///
/// Clones share the same list. Once every clone is dropped, writes still in
/// flight complete but their reconciliation is skipped.
#[derive(Clone)]
pub struct CommentThread {
    thread: ThreadRef,
    remote: Arc<dyn RemoteMutationService>,
    max_body_chars: Option<usize>,
    state: Arc<Mutex<ThreadState>>,
}

impl CommentThread {
    /// Empty thread
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteMutationService>, thread: ThreadRef) -> Self {
        Self::with_rows(remote, thread, Vec::new())
    }

    /// Thread seeded from fetched rows, oldest first
    #[must_use]
    pub fn with_rows(
        remote: Arc<dyn RemoteMutationService>,
        thread: ThreadRef,
        rows: Vec<CommentRow>,
    ) -> Self {
        let entries: Vec<_> = rows.into_iter().map(CommentRow::into_entity).collect();
        let state = ThreadState {
            comment_count: entries.len() as u64,
            entries: OptimisticList::from_entries(entries),
            last_error: None,
        };
        Self {
            thread,
            remote,
            max_body_chars: None,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Apply configuration
    #[must_use]
    pub fn with_config(mut self, config: &MomentConfig) -> Self {
        self.max_body_chars = config.max_body_chars;
        self
    }

    /// Post a comment
    ///
    /// Returns as soon as the pending entry is in the list; the insert runs
    /// on a spawned task. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - `MutationError::ValidationFailed` if the trimmed body is empty or too long
    /// - `MutationError::Unauthenticated` if nobody is signed in
    ///
    /// In both cases the list is unchanged and the store is not called.
    pub fn submit(&self, body: &str) -> Result<PendingInsert, MutationError> {
        self.submit_with_snapshot(body).map(|(_, pending)| pending)
    }

    /// Post a comment and return the list as it stood right after the
    /// pending entry was appended
    ///
    /// The snapshot is taken before the insert is spawned, so it always ends
    /// with the pending entry whatever the runtime flavor.
    ///
    /// # Errors
    /// Same as [`submit`](Self::submit)
    pub fn submit_with_snapshot(
        &self,
        body: &str,
    ) -> Result<(Vec<LocalEntity<Comment>>, PendingInsert), MutationError> {
        let text = validate_body(body, self.max_body_chars)?;
        let identity = self
            .remote
            .current_user()
            .ok_or(MutationError::Unauthenticated)?;

        let entity = LocalEntity::pending(Comment::provisional(&identity, text.clone()));
        let temp_id = entity.id.clone();
        let snapshot = {
            let mut state = self.state.lock();
            state.last_error = None;
            state.entries.push_pending(entity);
            state.entries.entries().to_vec()
        };
        tracing::debug!(thread = %self.thread, id = %temp_id, "optimistic insert");

        let record = NewRecord::Comment(NewComment {
            thread: self.thread.clone(),
            user_id: identity.id,
            body: text,
        });
        let span = tracing::debug_span!("reconcile_insert", thread = %self.thread, id = %temp_id);
        let handle = tokio::spawn(
            reconcile_insert(
                Arc::clone(&self.remote),
                Arc::downgrade(&self.state),
                self.thread.table(),
                temp_id.clone(),
                record,
            )
            .instrument(span),
        );

        Ok((snapshot, PendingInsert { temp_id, handle }))
    }

    /// Snapshot of the list in display order
    #[must_use]
    pub fn entries(&self) -> Vec<LocalEntity<Comment>> {
        self.state.lock().entries.entries().to_vec()
    }

    /// Ids in display order
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.state.lock().entries.ids()
    }

    /// Number of comments still waiting on the store
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().entries.pending_count()
    }

    /// Confirmed comment count; bumped when an insert is confirmed
    #[must_use]
    pub fn comment_count(&self) -> u64 {
        self.state.lock().comment_count
    }

    /// Message of the last rejected insert, cleared by the next submit
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    /// Dismiss the displayed error
    pub fn clear_error(&self) {
        self.state.lock().last_error = None;
    }

    /// Thread this list belongs to
    #[inline]
    #[must_use]
    pub fn thread(&self) -> &ThreadRef {
        &self.thread
    }
}

impl std::fmt::Debug for CommentThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentThread")
            .field("thread", &self.thread)
            .field("max_body_chars", &self.max_body_chars)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Insert in flight
#[derive(Debug)]
pub struct PendingInsert {
    temp_id: EntityId,
    handle: JoinHandle<Result<EntityId, MutationError>>,
}

impl PendingInsert {
    /// Temporary id of the optimistic entry
    #[inline]
    #[must_use]
    pub fn temp_id(&self) -> &EntityId {
        &self.temp_id
    }

    /// Wait for reconciliation and return the canonical id
    ///
    /// # Errors
    /// - `MutationError::RemoteRejected` once the entry has been rolled back
    /// - `MutationError::Aborted` if the task panicked or was cancelled
    pub async fn settle(self) -> Result<EntityId, MutationError> {
        self.handle
            .await
            .map_err(|e| MutationError::Aborted(e.to_string()))?
    }
}

/// Trimmed body, or the reason it is refused
///
/// # Errors
/// `MutationError::ValidationFailed` if empty after trimming or longer than `max_chars`
pub fn validate_body(body: &str, max_chars: Option<usize>) -> Result<String, MutationError> {
    let text = body.trim();
    if text.is_empty() {
        return Err(MutationError::ValidationFailed(
            "comment body is empty".to_string(),
        ));
    }
    if let Some(max) = max_chars {
        if text.chars().count() > max {
            return Err(MutationError::ValidationFailed(format!(
                "comment body exceeds {max} characters"
            )));
        }
    }
    Ok(text.to_string())
}

async fn reconcile_insert(
    remote: Arc<dyn RemoteMutationService>,
    state: Weak<Mutex<ThreadState>>,
    table: Table,
    temp_id: EntityId,
    record: NewRecord,
) -> Result<EntityId, MutationError> {
    let outcome = match remote.insert(table, record).await {
        Ok(CanonicalRecord::Comment(row)) => Ok(row),
        Ok(CanonicalRecord::Relation(_)) => Err(RemoteError::new(
            "store returned a relation row for a comment insert",
        )),
        Err(err) => Err(err),
    };

    let Some(state) = state.upgrade() else {
        tracing::debug!("thread dropped before the insert resolved; skipping reconciliation");
        return outcome
            .map(|row| EntityId::canonical(row.id))
            .map_err(MutationError::from);
    };

    let mut state = state.lock();
    match outcome {
        Ok(row) => {
            let entity = row.into_entity();
            let id = entity.id.clone();
            match state.entries.confirm(&temp_id, entity) {
                Confirmation::Replaced => state.comment_count += 1,
                Confirmation::Deduplicated => {
                    tracing::debug!(%id, "stored row already listed; placeholder dropped");
                }
                Confirmation::Unknown => {
                    tracing::debug!(%id, "placeholder no longer listed");
                }
            }
            tracing::info!(%id, "comment confirmed");
            Ok(id)
        }
        Err(err) => {
            state.entries.rollback(&temp_id);
            state.last_error = Some(err.message.clone());
            tracing::warn!(error = %err, code = ?err.code, "comment rejected; rolled back");
            Err(err.into())
        }
    }
}
