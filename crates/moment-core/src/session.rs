//! Process-wide authentication state
//!
//! Components that need the current identity either read it on demand
//! ([`Session::current`]) or subscribe to changes, through a callback
//! ([`Session::on_change`]) or a `tokio::sync::watch` receiver
//! ([`Session::watch`]).

use crate::error::MutationError;
use crate::types::Identity;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// Kind of session change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthEvent {
    /// A user signed in
    SignedIn,
    /// The user signed out
    SignedOut,
    /// Profile metadata of the signed-in user changed
    UserUpdated,
}

type Listener = Arc<dyn Fn(AuthEvent, Option<&Identity>) + Send + Sync>;

struct Inner {
    state: watch::Sender<Option<Identity>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

/// Shared session handle; clones observe the same state
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Signed-out session
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                state,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Session already signed in as `identity`
    #[must_use]
    pub fn signed_in(identity: Identity) -> Self {
        let session = Self::new();
        session.inner.state.send_replace(Some(identity));
        session
    }

    /// Current identity, if any
    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.inner.state.borrow().clone()
    }

    /// Check if someone is signed in
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// Current identity or `Unauthenticated`
    ///
    /// # Errors
    /// `MutationError::Unauthenticated` when signed out
    pub fn require(&self) -> Result<Identity, MutationError> {
        self.current().ok_or(MutationError::Unauthenticated)
    }

    /// Sign in, replacing any previous identity
    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(user = %identity.id, "signed in");
        self.inner.state.send_replace(Some(identity));
        self.notify(AuthEvent::SignedIn);
    }

    /// Sign out; no event is emitted if already signed out
    pub fn sign_out(&self) {
        if self.inner.state.send_replace(None).is_some() {
            tracing::info!("signed out");
            self.notify(AuthEvent::SignedOut);
        }
    }

    /// Replace profile metadata of the signed-in user
    ///
    /// Returns `false` and leaves the session untouched when signed out or
    /// when `identity` belongs to another user.
    pub fn update(&self, identity: Identity) -> bool {
        let updated = self.inner.state.send_if_modified(|state| match state {
            Some(current) if current.id == identity.id => {
                *current = identity;
                true
            }
            _ => false,
        });
        if updated {
            self.notify(AuthEvent::UserUpdated);
        }
        updated
    }

    /// Register a change callback
    ///
    /// The callback runs synchronously after each change. Dropping the
    /// returned subscription unregisters it.
    #[must_use = "dropping the subscription unregisters the callback"]
    pub fn on_change<F>(&self, callback: F) -> SessionSubscription
    where
        F: Fn(AuthEvent, Option<&Identity>) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(callback)));
        SessionSubscription {
            session: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Async receiver of identity changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.state.subscribe()
    }

    /// Number of registered callbacks
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn notify(&self, event: AuthEvent) {
        // Callbacks run outside the lock so they may subscribe or unsubscribe
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        let identity = self.current();
        for listener in listeners {
            listener(event, identity.as_ref());
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &*self.inner.state.borrow())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle for a callback registered with [`Session::on_change`]
#[derive(Debug)]
pub struct SessionSubscription {
    session: Weak<Inner>,
    id: u64,
}

impl SessionSubscription {
    /// Unregister now
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.session.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn recorder() -> (
        Arc<PlMutex<Vec<(AuthEvent, Option<String>)>>>,
        impl Fn(AuthEvent, Option<&Identity>) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = move |event: AuthEvent, identity: Option<&Identity>| {
            sink.lock()
                .push((event, identity.map(|i| i.id.as_str().to_string())));
        };
        (seen, callback)
    }

    #[test]
    fn sign_in_and_out() {
        let session = Session::new();
        assert!(!session.is_authenticated());
        assert_eq!(session.require(), Err(MutationError::Unauthenticated));

        session.sign_in(Identity::new("u1"));
        assert_eq!(session.require().unwrap().id.as_str(), "u1");

        session.sign_out();
        assert!(session.current().is_none());
    }

    #[test]
    fn callbacks_receive_events() {
        let session = Session::new();
        let (seen, callback) = recorder();
        let _sub = session.on_change(callback);

        session.sign_in(Identity::new("u1"));
        session.update(Identity::new("u1").with_username("ana"));
        session.sign_out();
        session.sign_out();

        assert_eq!(
            *seen.lock(),
            vec![
                (AuthEvent::SignedIn, Some("u1".to_string())),
                (AuthEvent::UserUpdated, Some("u1".to_string())),
                (AuthEvent::SignedOut, None),
            ]
        );
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let session = Session::new();
        let (seen, callback) = recorder();
        let sub = session.on_change(callback);
        assert_eq!(session.listener_count(), 1);

        sub.unsubscribe();
        assert_eq!(session.listener_count(), 0);

        session.sign_in(Identity::new("u1"));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn update_ignores_other_users() {
        let session = Session::signed_in(Identity::new("u1"));
        assert!(!session.update(Identity::new("u2")));
        assert_eq!(session.current().unwrap().id.as_str(), "u1");

        let signed_out = Session::new();
        assert!(!signed_out.update(Identity::new("u1")));
    }

    #[test]
    fn clones_share_state() {
        let a = Session::new();
        let b = a.clone();
        a.sign_in(Identity::new("u1"));
        assert!(b.is_authenticated());
    }

    #[tokio::test]
    async fn watch_receiver_observes_changes() {
        let session = Session::new();
        let mut rx = session.watch();

        session.sign_in(Identity::new("u1").with_full_name("Ana Lima"));
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().as_ref().and_then(|i| i.full_name.clone()),
            Some("Ana Lima".to_string())
        );
    }
}
