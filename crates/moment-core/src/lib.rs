//! moment Core - Optimistic mutation layer
//!
//! Keeps client-side lists and toggles in step with a remote store while
//! writes are in flight:
//! - Shows comments immediately under a temporary id, then swaps in the
//!   stored row or removes the entry if the store refuses it
//! - Flips likes, follows and memberships immediately, with at most one
//!   write per relation in flight, and restores the previous state on failure
//! - Tracks the signed-in identity with explicit change notification
//!
//! # Example
//!
//! ```rust,ignore
//! use moment_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), MutationError> {
//! let session = Session::signed_in(Identity::new("u1").with_username("ana"));
//! let remote = Arc::new(InMemoryRemote::new(session));
//! let controller = MutationController::new(remote);
//!
//! let thread = ThreadRef::photo("p1");
//! if let Submission::Insert { snapshot, pending } =
//!     controller.submit(MutationAction::comment(thread, "hello"))?
//! {
//!     assert!(snapshot[0].is_pending());
//!     let id = pending.settle().await?;
//!     println!("stored as {id}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod controller;
pub mod error;
pub mod list;
pub mod records;
pub mod remote;
pub mod session;
pub mod thread;
pub mod toggle;
pub mod types;

// Re-exports for convenience
pub use config::{MemoryConfig, MomentConfig};
pub use controller::{MutationAction, MutationController, Submission};
pub use error::{ConfigError, MutationError, RemoteError};
pub use list::{Confirmation, OptimisticList};
pub use records::{
    CanonicalRecord, CommentRow, MatchKeys, NewComment, NewRecord, Relation, RelationRecord,
    RelationRow, Table, ThreadRef,
};
pub use remote::{InMemoryRemote, RemoteMutationService};
pub use session::{AuthEvent, Session, SessionSubscription};
pub use thread::{CommentThread, PendingInsert};
pub use toggle::{PendingToggle, ToggleController, ToggleOutcome};
pub use types::{
    Author, Comment, EntityId, EntityStatus, Identity, LocalEntity, ToggleState, UserId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with moment Core
    pub use crate::{
        CommentThread, EntityId, EntityStatus, Identity, InMemoryRemote, LocalEntity,
        MutationAction, MutationController, MutationError, Relation, RemoteMutationService,
        Session, Submission, ThreadRef, ToggleController, ToggleState,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn comment_and_like_flow() {
        let me = Identity::new("u1").with_username("ana");
        let remote = Arc::new(InMemoryRemote::new(Session::signed_in(me.clone())));
        remote.set_profile(&me);
        let controller = MutationController::new(remote.clone());

        let thread = ThreadRef::photo("p1");
        let Submission::Insert { snapshot, pending } = controller
            .submit(MutationAction::comment(thread.clone(), "hello"))
            .unwrap()
        else {
            panic!("expected insert submission");
        };
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].id.is_temporary());
        pending.settle().await.unwrap();

        let like = Relation::photo_like("p1");
        let Submission::Toggle(outcome) = controller
            .submit(MutationAction::toggle(like.clone()))
            .unwrap()
        else {
            panic!("expected toggle submission");
        };
        outcome.into_pending().unwrap().settle().await.unwrap();

        assert_eq!(controller.thread(&thread).comment_count(), 1);
        assert_eq!(remote.comments(&thread).len(), 1);
        assert!(remote.has_relation(&like, &me.id));
    }
}
