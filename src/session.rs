//! Signed-in sessions of the running instance.
//!
//! [`SessionState`] mirrors the identity provider: a listener task follows
//! its session-change notifications for as long as the state lives.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::backend::{IdentityProvider, Session, SessionEvent};

#[derive(Default)]
struct Table {
    open: HashMap<String, Session>,
    /// Closed here before the provider's notification arrived.
    closed: HashSet<String>,
}

type Sessions = Arc<Mutex<Table>>;

fn lock(sessions: &Sessions) -> MutexGuard<'_, Table> {
    // a panic while holding the lock cannot leave the map half-written.
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn apply(sessions: &Sessions, event: SessionEvent) {
    let mut table = lock(sessions);
    match event {
        SessionEvent::SignedIn(session) => {
            if !table.closed.contains(&session.token) {
                table.open.insert(session.token.clone(), session);
            }
        },
        SessionEvent::SignedOut { token } => {
            table.open.remove(&token);
            table.closed.remove(&token);
        },
        SessionEvent::AccountDeleted { uid } => {
            table.open.retain(|_, session| session.account.uid != uid);
        },
    }
}

async fn listen(sessions: Sessions, mut changes: broadcast::Receiver<SessionEvent>) {
    loop {
        match changes.recv().await {
            Ok(event) => apply(&sessions, event),
            Err(RecvError::Lagged(skipped)) => {
                // missed sign-outs cannot be recovered, force everyone to sign in again.
                tracing::warn!(skipped, "session notifications lost, clearing sessions");
                lock(&sessions).open.clear();
            },
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!("session listener stopped");
}

/// Sessions known to this instance, keyed by token.
pub struct SessionState {
    sessions: Sessions,
    listener: JoinHandle<()>,
}

impl SessionState {
    /// Start following the session changes of `identity`.
    pub fn new(identity: &dyn IdentityProvider) -> Self {
        let sessions = Sessions::default();
        let listener = tokio::spawn(listen(Arc::clone(&sessions), identity.session_changes()));

        Self { sessions, listener }
    }

    /// Record a session returned by the identity provider.
    ///
    /// The notification for it may not have reached the listener yet.
    pub fn insert(&self, session: Session) {
        lock(&self.sessions)
            .open
            .insert(session.token.clone(), session);
    }

    /// Forget a signed-out session.
    ///
    /// A late sign-in notification for the same token is ignored.
    pub fn remove(&self, token: &str) {
        let mut table = lock(&self.sessions);
        if table.open.remove(token).is_some() {
            table.closed.insert(token.to_owned());
        }
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        lock(&self.sessions).open.get(token).cloned()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        lock(&self.sessions).open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
