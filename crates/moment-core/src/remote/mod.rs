//! Remote mutation service
//!
//! The controllers need three things from the backend: insert a row, delete
//! rows by key, and report who is signed in. Transport, schema and row-level
//! security are the backend's concern.

pub mod memory;

use crate::error::RemoteError;
use crate::records::{CanonicalRecord, MatchKeys, NewRecord, Table};
use crate::types::Identity;
use async_trait::async_trait;

pub use memory::InMemoryRemote;

/// Backend surface used by the optimistic controllers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteMutationService: Send + Sync {
    /// Insert `record` into `table` and return the stored row
    ///
    /// # Errors
    /// Any refusal from the backend (constraint, permission, network)
    async fn insert(&self, table: Table, record: NewRecord) -> Result<CanonicalRecord, RemoteError>;

    /// Delete the rows of `table` matching every key in `keys`
    ///
    /// # Errors
    /// Any refusal from the backend
    async fn delete(&self, table: Table, keys: MatchKeys) -> Result<(), RemoteError>;

    /// Signed-in user, if any
    fn current_user(&self) -> Option<Identity>;
}

impl std::fmt::Debug for dyn RemoteMutationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RemoteMutationService")
    }
}
