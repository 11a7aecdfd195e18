//! Testing utilities for the moment workspace
//!
//! Shared fixtures plus a remote wrapper that holds calls until released.

#![allow(missing_docs)]

use async_trait::async_trait;
use moment_core::remote::RemoteMutationService;
use moment_core::{
    AuthEvent, CanonicalRecord, CommentRow, Identity, InMemoryRemote, MatchKeys,
    MutationController, NewRecord, RemoteError, Session, SessionSubscription, Table, ThreadRef,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub fn identity() -> Identity {
    Identity::new("u1").with_username("ana")
}

pub fn other_identity() -> Identity {
    Identity::new("u2").with_full_name("Bruno Costa")
}

/// Store with [`identity`] signed in and its profile registered
pub fn signed_in_remote() -> Arc<InMemoryRemote> {
    let me = identity();
    let remote = InMemoryRemote::new(Session::signed_in(me.clone()));
    remote.set_profile(&me);
    Arc::new(remote)
}

pub fn signed_out_remote() -> Arc<InMemoryRemote> {
    Arc::new(InMemoryRemote::new(Session::new()))
}

pub fn controller(remote: &Arc<InMemoryRemote>) -> MutationController {
    MutationController::new(remote.clone())
}

/// Store `bodies` as comments by [`other_identity`] and return the rows
pub fn seeded_thread(
    remote: &InMemoryRemote,
    thread: &ThreadRef,
    bodies: &[&str],
) -> Vec<CommentRow> {
    let author = other_identity();
    remote.set_profile(&author);
    bodies
        .iter()
        .map(|body| remote.seed_comment(thread, &author.id, body))
        .collect()
}

/// Record every session event into a shared vector
pub fn record_events(session: &Session) -> (SessionSubscription, Arc<Mutex<Vec<AuthEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = session.on_change(move |event, _| sink.lock().push(event));
    (subscription, events)
}

/// Remote that parks every insert and delete until released
///
/// Lets a test observe optimistic state while writes are provably in flight.
pub struct GatedRemote {
    inner: Arc<dyn RemoteMutationService>,
    gate: Semaphore,
    held: AtomicUsize,
}

impl GatedRemote {
    pub fn new(inner: Arc<dyn RemoteMutationService>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate: Semaphore::new(0),
            held: AtomicUsize::new(0),
        })
    }

    /// Let `n` parked or future calls through
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Let every call through from now on
    pub fn open(&self) {
        self.gate.close();
    }

    /// Calls currently parked
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Yield until at least `n` calls are parked
    pub async fn wait_for_held(&self, n: usize) {
        while self.held() < n {
            tokio::task::yield_now().await;
        }
    }

    async fn pass(&self) {
        self.held.fetch_add(1, Ordering::SeqCst);
        // A closed gate lets everything through
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.held.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteMutationService for GatedRemote {
    async fn insert(&self, table: Table, record: NewRecord) -> Result<CanonicalRecord, RemoteError> {
        self.pass().await;
        self.inner.insert(table, record).await
    }

    async fn delete(&self, table: Table, keys: MatchKeys) -> Result<(), RemoteError> {
        self.pass().await;
        self.inner.delete(table, keys).await
    }

    fn current_user(&self) -> Option<Identity> {
        self.inner.current_user()
    }
}
