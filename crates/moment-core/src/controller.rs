//! Mutation controller
//!
//! Single entry point for user actions. Routes inserts to the matching
//! [`CommentThread`] and toggles to the shared [`ToggleController`].

use crate::config::MomentConfig;
use crate::error::MutationError;
use crate::records::{CommentRow, Relation, ThreadRef};
use crate::remote::RemoteMutationService;
use crate::thread::{CommentThread, PendingInsert};
use crate::toggle::{ToggleController, ToggleOutcome};
use crate::types::{Comment, LocalEntity};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Action taken by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationAction {
    /// Append content to a thread
    Insert {
        /// Target thread
        thread: ThreadRef,
        /// Raw body as typed
        body: String,
    },
    /// Flip a relation
    Toggle {
        /// Target relation
        relation: Relation,
    },
}

impl MutationAction {
    /// Comment on a thread
    #[inline]
    #[must_use]
    pub fn comment(thread: ThreadRef, body: impl Into<String>) -> Self {
        Self::Insert {
            thread,
            body: body.into(),
        }
    }

    /// Flip a relation
    #[inline]
    #[must_use]
    pub fn toggle(relation: Relation) -> Self {
        Self::Toggle { relation }
    }
}

/// Accepted action
#[derive(Debug)]
pub enum Submission {
    /// Comment shown optimistically
    Insert {
        /// Thread list including the pending entry
        snapshot: Vec<LocalEntity<Comment>>,
        /// Write in flight
        pending: PendingInsert,
    },
    /// Toggle applied or ignored
    Toggle(ToggleOutcome),
}

/// Owner of every mounted thread and of the toggle state
#[derive(Debug)]
pub struct MutationController {
    remote: Arc<dyn RemoteMutationService>,
    config: MomentConfig,
    threads: DashMap<ThreadRef, CommentThread>,
    toggles: ToggleController,
}

impl MutationController {
    /// Controller with default configuration
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteMutationService>) -> Self {
        Self::with_config(remote, MomentConfig::default())
    }

    /// Controller with explicit configuration
    #[must_use]
    pub fn with_config(remote: Arc<dyn RemoteMutationService>, config: MomentConfig) -> Self {
        Self {
            toggles: ToggleController::new(Arc::clone(&remote)),
            remote,
            config,
            threads: DashMap::new(),
        }
    }

    /// Apply `action` optimistically and start its write
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - `MutationError::Unauthenticated` if nobody is signed in
    /// - `MutationError::ValidationFailed` for blank or oversized bodies
    pub fn submit(&self, action: MutationAction) -> Result<Submission, MutationError> {
        match action {
            MutationAction::Insert { thread, body } => {
                let (snapshot, pending) = self.thread(&thread).submit_with_snapshot(&body)?;
                Ok(Submission::Insert { snapshot, pending })
            }
            MutationAction::Toggle { relation } => {
                Ok(Submission::Toggle(self.toggles.toggle(&relation)?))
            }
        }
    }

    /// Mounted thread, created empty on first use
    #[must_use]
    pub fn thread(&self, thread: &ThreadRef) -> CommentThread {
        self.threads
            .entry(thread.clone())
            .or_insert_with(|| {
                CommentThread::new(Arc::clone(&self.remote), thread.clone())
                    .with_config(&self.config)
            })
            .clone()
    }

    /// Mount a thread from fetched rows, replacing any mounted list
    pub fn mount(&self, thread: ThreadRef, rows: Vec<CommentRow>) -> CommentThread {
        let list = CommentThread::with_rows(Arc::clone(&self.remote), thread.clone(), rows)
            .with_config(&self.config);
        self.threads.insert(thread, list.clone());
        list
    }

    /// Drop a thread; writes still in flight for it will not reconcile
    /// unless another handle to it is alive
    pub fn unmount(&self, thread: &ThreadRef) -> bool {
        self.threads.remove(thread).is_some()
    }

    /// Shared toggle state
    #[inline]
    #[must_use]
    pub fn toggles(&self) -> &ToggleController {
        &self.toggles
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MomentConfig {
        &self.config
    }
}
