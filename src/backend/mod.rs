//! Ports towards the backend-as-a-service.
//!
//! Persistence, authentication and real-time sync are provided by an
//! external document database and identity provider. The application only
//! talks to them through [`DocumentStore`] and [`IdentityProvider`].
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

pub type Result<T> = std::result::Result<T, BackendError>;

/// Raw document fields, as stored by the database.
pub type Document = serde_json::Map<String, Value>;

/// Latest state pushed to a listener, or the error the listener received.
pub type SnapshotResult = Result<Arc<Snapshot>>;

/// Errors reported by the external services.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("document `{key}` not found in `{collection}`")]
    NotFound { collection: String, key: String },
    #[error("email address is already in use")]
    EmailInUse,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("no authenticated session")]
    NoSession,
    #[error("password must contain at least {min} characters")]
    WeakPassword { min: usize },
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// A stored document and the key the database assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub data: Document,
}

/// Full result set of a collection at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub records: Vec<Record>,
}

/// Standing query on a collection.
///
/// The first call to [`Subscription::next`] yields the current state, later
/// calls wait for the next change. Dropping the handle releases the
/// listener.
pub struct Subscription {
    collection: String,
    receiver: watch::Receiver<SnapshotResult>,
    delivered: bool,
}

impl Subscription {
    /// Create a new [`Subscription`] from a listener channel.
    pub fn new(collection: &str, receiver: watch::Receiver<SnapshotResult>) -> Self {
        tracing::debug!(collection, "subscription opened");

        Self {
            collection: collection.to_owned(),
            receiver,
            delivered: false,
        }
    }

    /// Name of the watched collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Wait for the next snapshot. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        if !self.delivered {
            self.delivered = true;
            return Some(self.receiver.borrow_and_update().clone());
        }

        match self.receiver.changed().await {
            Ok(()) => Some(self.receiver.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Release the listener now.
    pub fn unsubscribe(self) {}

    /// Turn the subscription into a stream of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = SnapshotResult> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next()
                .await
                .map(|snapshot| (snapshot, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::debug!(collection = %self.collection, "subscription released");
    }
}

/// Port for the document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a live subscription on a whole collection.
    async fn subscribe(&self, collection: &str) -> Result<Subscription>;

    /// Insert a document and return the generated key.
    async fn create(&self, collection: &str, data: Document) -> Result<String>;

    /// Insert or replace the document at `key`.
    async fn set(&self, collection: &str, key: &str, data: Document) -> Result<()>;

    /// Shallow merge of `fields` into an existing document.
    async fn update(&self, collection: &str, key: &str, fields: Document) -> Result<()>;

    /// Remove a document. Removing a missing document is not an error.
    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    /// Read a single document.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>>;

    /// One-shot read of a whole collection.
    async fn list(&self, collection: &str) -> Result<Vec<Record>>;
}

/// Account as known by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uid: String,
    pub email: String,
}

/// Signed-in session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub account: Account,
    pub signed_in_at: DateTime<Utc>,
}

/// Session-change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(Session),
    SignedOut { token: String },
    AccountDeleted { uid: String },
}

/// Port for the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account without opening a session for it.
    async fn create_account(&self, email: &str, password: &str) -> Result<Account>;

    /// Create an account and sign it in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        self.create_account(email, password).await?;
        self.sign_in(email, password).await
    }

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Close a session.
    async fn sign_out(&self, token: &str) -> Result<()>;

    /// Subscribe to session changes.
    fn session_changes(&self) -> broadcast::Receiver<SessionEvent>;

    /// Change the password of the account behind `session`.
    async fn update_password(&self, session: &Session, password: &str) -> Result<()>;

    /// Delete the account behind `session`.
    async fn delete_current(&self, session: &Session) -> Result<()>;
}
