//! Process-local remote store
//!
//! Backs the simulator and the tests. Mirrors the behaviour the controllers
//! rely on from the hosted backend:
//! - canonical ids are assigned on insert (`c-<n>`)
//! - relation rows are unique per key set (duplicates fail with `23505`)
//! - rows must belong to the signed-in user (violations fail with `42501`)
//! - comment rows come back with the author profile joined in
//!
//! Failures can be injected once (`fail_next`) or per table (`fail_table`).

use super::RemoteMutationService;
use crate::config::MemoryConfig;
use crate::error::{RemoteError, UNIQUE_VIOLATION};
use crate::records::{
    CanonicalRecord, CommentRow, MatchKeys, NewComment, NewRecord, Relation, RelationRecord,
    RelationRow, Table, ThreadRef,
};
use crate::session::Session;
use crate::types::{Author, Identity, UserId};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Postgres SQLSTATE for `insufficient_privilege`
pub const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Call recorded by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// `insert` on a table
    Insert(Table),
    /// `delete` on a table
    Delete(Table),
}

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    comments: Vec<(ThreadRef, CommentRow)>,
    relations: HashMap<Table, Vec<MatchKeys>>,
    profiles: HashMap<UserId, Author>,
    fail_next: VecDeque<RemoteError>,
    failing_tables: HashMap<Table, RemoteError>,
    calls: Vec<RemoteCall>,
}

/// In-memory implementation of [`RemoteMutationService`]
#[derive(Debug)]
pub struct InMemoryRemote {
    session: Session,
    state: Mutex<StoreState>,
}

impl InMemoryRemote {
    /// Empty store reading the signed-in user from `session`
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self::from_config(session, &MemoryConfig::default())
    }

    /// Empty store with explicit settings
    #[must_use]
    pub fn from_config(session: Session, config: &MemoryConfig) -> Self {
        Self {
            session,
            state: Mutex::new(StoreState {
                next_id: config.first_canonical_id,
                ..StoreState::default()
            }),
        }
    }

    /// Set the numeric part of the next canonical id
    #[must_use]
    pub fn with_next_id(self, next: u64) -> Self {
        self.state.lock().next_id = next;
        self
    }

    /// Session consulted for `current_user`
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Register a profile joined into returned comment rows
    pub fn set_profile(&self, user: &Identity) {
        self.state.lock().profiles.insert(user.id.clone(), user.author());
    }

    /// Fail the next call (insert or delete) with `error`
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().fail_next.push_back(error);
    }

    /// Fail every call on `table` until [`heal_table`](Self::heal_table)
    pub fn fail_table(&self, table: Table, error: RemoteError) {
        self.state.lock().failing_tables.insert(table, error);
    }

    /// Stop failing calls on `table`
    pub fn heal_table(&self, table: Table) {
        self.state.lock().failing_tables.remove(&table);
    }

    /// Store a comment directly, bypassing faults and checks
    pub fn seed_comment(&self, thread: &ThreadRef, user: &UserId, body: &str) -> CommentRow {
        let mut state = self.state.lock();
        let row = state.comment_row(user.clone(), body.to_string());
        state.comments.push((thread.clone(), row.clone()));
        row
    }

    /// Store a relation row directly, bypassing faults and checks
    pub fn seed_relation(&self, relation: &Relation, user: &UserId) {
        let keys = relation.match_keys(user);
        let mut state = self.state.lock();
        let rows = state.relations.entry(relation.table()).or_default();
        if !rows.contains(&keys) {
            rows.push(keys);
        }
    }

    /// Stored comments of `thread`, oldest first
    #[must_use]
    pub fn comments(&self, thread: &ThreadRef) -> Vec<CommentRow> {
        self.state
            .lock()
            .comments
            .iter()
            .filter(|(t, _)| t == thread)
            .map(|(_, row)| row.clone())
            .collect()
    }

    /// Whether `user` holds `relation`
    #[must_use]
    pub fn has_relation(&self, relation: &Relation, user: &UserId) -> bool {
        let keys = relation.match_keys(user);
        self.state
            .lock()
            .relations
            .get(&relation.table())
            .is_some_and(|rows| rows.contains(&keys))
    }

    /// Number of users holding `relation`
    #[must_use]
    pub fn relation_count(&self, relation: &Relation) -> u64 {
        let (column, value) = relation.target_key();
        self.state
            .lock()
            .relations
            .get(&relation.table())
            .map_or(0, |rows| {
                rows.iter().filter(|keys| keys.get(column) == Some(value)).count() as u64
            })
    }

    /// Calls received so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls received so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    fn check_owner(&self, user: &UserId) -> Result<(), RemoteError> {
        match self.session.current() {
            Some(identity) if &identity.id == user => Ok(()),
            _ => Err(
                RemoteError::new("new row violates row-level security policy")
                    .with_code(INSUFFICIENT_PRIVILEGE),
            ),
        }
    }
}

impl StoreState {
    fn record_call(&mut self, call: RemoteCall) -> Result<(), RemoteError> {
        let table = match &call {
            RemoteCall::Insert(t) | RemoteCall::Delete(t) => *t,
        };
        self.calls.push(call);
        if let Some(error) = self.fail_next.pop_front() {
            return Err(error);
        }
        if let Some(error) = self.failing_tables.get(&table) {
            return Err(error.clone());
        }
        Ok(())
    }

    fn comment_row(&mut self, user_id: UserId, body: String) -> CommentRow {
        let id = format!("c-{}", self.next_id);
        self.next_id += 1;
        let author = self.profiles.get(&user_id).cloned();
        CommentRow {
            id,
            body,
            created_at: Utc::now(),
            user_id,
            author,
        }
    }

    fn insert_comment(&mut self, comment: NewComment) -> CommentRow {
        let row = self.comment_row(comment.user_id, comment.body);
        self.comments.push((comment.thread, row.clone()));
        row
    }

    fn insert_relation(&mut self, record: &RelationRecord) -> Result<RelationRow, RemoteError> {
        let table = record.relation.table();
        let keys = record.keys();
        let rows = self.relations.entry(table).or_default();
        if rows.contains(&keys) {
            return Err(RemoteError::new(format!(
                "duplicate key value violates unique constraint \"{table}_pkey\""
            ))
            .with_code(UNIQUE_VIOLATION));
        }
        rows.push(keys.clone());
        Ok(RelationRow { table, keys })
    }

    fn delete_matching(&mut self, table: Table, keys: &MatchKeys) {
        match table {
            Table::Comments | Table::CommunityPostComments => {
                self.comments.retain(|(thread, row)| {
                    thread.table() != table
                        || !keys_match(keys, |column| comment_column(thread, row, column))
                });
            }
            _ => {
                if let Some(rows) = self.relations.get_mut(&table) {
                    rows.retain(|row| !keys_match(keys, |column| row.get(column).map(str::to_string)));
                }
            }
        }
    }
}

fn keys_match(keys: &MatchKeys, lookup: impl Fn(&str) -> Option<String>) -> bool {
    keys.iter()
        .all(|(column, value)| lookup(column).as_deref() == Some(value))
}

fn comment_column(thread: &ThreadRef, row: &CommentRow, column: &str) -> Option<String> {
    let (parent_column, parent) = thread.parent_key();
    match column {
        "id" => Some(row.id.clone()),
        "user_id" => Some(row.user_id.to_string()),
        "body" => Some(row.body.clone()),
        c if c == parent_column => Some(parent.to_string()),
        _ => None,
    }
}

#[async_trait]
impl RemoteMutationService for InMemoryRemote {
    async fn insert(&self, table: Table, record: NewRecord) -> Result<CanonicalRecord, RemoteError> {
        // Suspension point standing in for the network round trip
        tokio::task::yield_now().await;

        self.state.lock().record_call(RemoteCall::Insert(table))?;
        if record.table() != table {
            return Err(RemoteError::new(format!(
                "record for {} cannot be inserted into {table}",
                record.table()
            )));
        }

        match record {
            NewRecord::Comment(comment) => {
                self.check_owner(&comment.user_id)?;
                if comment.body.trim().is_empty() {
                    return Err(RemoteError::new(
                        "new row violates check constraint \"comments_body_check\"",
                    )
                    .with_code("23514"));
                }
                let row = self.state.lock().insert_comment(comment);
                tracing::trace!(%table, id = %row.id, "stored comment");
                Ok(CanonicalRecord::Comment(row))
            }
            NewRecord::Relation(relation) => {
                self.check_owner(&relation.user_id)?;
                let row = self.state.lock().insert_relation(&relation)?;
                tracing::trace!(%table, "stored relation");
                Ok(CanonicalRecord::Relation(row))
            }
        }
    }

    async fn delete(&self, table: Table, keys: MatchKeys) -> Result<(), RemoteError> {
        tokio::task::yield_now().await;

        self.state.lock().record_call(RemoteCall::Delete(table))?;
        if self.session.current().is_none() {
            return Err(RemoteError::new("permission denied").with_code(INSUFFICIENT_PRIVILEGE));
        }
        self.state.lock().delete_matching(table, &keys);
        Ok(())
    }

    fn current_user(&self) -> Option<Identity> {
        self.session.current()
    }
}
