//! In-process backend.
//!
//! Stands in for the hosted database and identity service when no remote
//! project is configured, and backs the test-suite.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use rand::distributions::{Alphanumeric, DistString};
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::sync::{broadcast, watch};

use super::{
    Account, BackendError, Document, DocumentStore, IdentityProvider, Record,
    Result, Session, SessionEvent, Snapshot, SnapshotResult, Subscription,
};
use crate::config::Argon2 as ArgonConfig;

const KEY_LENGTH: usize = 20;
const TOKEN_BYTES: usize = 32;
const MIN_PASSWORD_LENGTH: usize = 6;
const EVENTS_CAPACITY: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| BackendError::Unavailable("poisoned lock".into()))
}

struct Collection {
    documents: BTreeMap<String, Document>,
    listeners: watch::Sender<SnapshotResult>,
}

impl Collection {
    fn new() -> Self {
        let (listeners, _) = watch::channel(Ok(Arc::new(Snapshot::default())));
        Self {
            documents: BTreeMap::new(),
            listeners,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self
                .documents
                .iter()
                .map(|(key, data)| Record {
                    key: key.clone(),
                    data: data.clone(),
                })
                .collect(),
        }
    }

    fn publish(&self) {
        let _ = self.listeners.send_replace(Ok(Arc::new(self.snapshot())));
    }
}

/// Document store kept in memory, ordered by key.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryStore {
    /// Create a new [`MemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open listeners on `collection`.
    pub fn listeners(&self, collection: &str) -> usize {
        lock(&self.collections)
            .map(|collections| {
                collections
                    .get(collection)
                    .map(|c| c.listeners.receiver_count())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Push an error to every listener of `collection`.
    ///
    /// Later subscribers see the error too, until the next write publishes
    /// a fresh snapshot.
    #[cfg(test)]
    pub fn fail(&self, collection: &str, error: BackendError) -> Result<()> {
        let mut collections = lock(&self.collections)?;
        let entry = collections
            .entry(collection.to_owned())
            .or_insert_with(Collection::new);
        let _ = entry.listeners.send_replace(Err(error));
        Ok(())
    }

    fn with_collection<T>(
        &self,
        collection: &str,
        apply: impl FnOnce(&mut Collection) -> Result<T>,
    ) -> Result<T> {
        let mut collections = lock(&self.collections)?;
        let entry = collections
            .entry(collection.to_owned())
            .or_insert_with(Collection::new);
        apply(entry)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, collection: &str) -> Result<Subscription> {
        self.with_collection(collection, |c| {
            Ok(Subscription::new(collection, c.listeners.subscribe()))
        })
    }

    async fn create(&self, collection: &str, data: Document) -> Result<String> {
        self.with_collection(collection, |c| {
            let mut key = Alphanumeric.sample_string(&mut OsRng, KEY_LENGTH);
            while c.documents.contains_key(&key) {
                key = Alphanumeric.sample_string(&mut OsRng, KEY_LENGTH);
            }

            c.documents.insert(key.clone(), data);
            c.publish();
            Ok(key)
        })
    }

    async fn set(&self, collection: &str, key: &str, data: Document) -> Result<()> {
        self.with_collection(collection, |c| {
            c.documents.insert(key.to_owned(), data);
            c.publish();
            Ok(())
        })
    }

    async fn update(&self, collection: &str, key: &str, fields: Document) -> Result<()> {
        self.with_collection(collection, |c| {
            let Some(document) = c.documents.get_mut(key) else {
                return Err(BackendError::NotFound {
                    collection: collection.to_owned(),
                    key: key.to_owned(),
                });
            };

            document.extend(fields);
            c.publish();
            Ok(())
        })
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.with_collection(collection, |c| {
            if c.documents.remove(key).is_some() {
                c.publish();
            }
            Ok(())
        })
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Record>> {
        self.with_collection(collection, |c| {
            Ok(c.documents.get(key).map(|data| Record {
                key: key.to_owned(),
                data: data.clone(),
            }))
        })
    }

    async fn list(&self, collection: &str) -> Result<Vec<Record>> {
        self.with_collection(collection, |c| Ok(c.snapshot().records))
    }
}

#[derive(Clone)]
struct StoredAccount {
    account: Account,
    password_hash: String,
}

/// Email/password identity provider kept in memory.
pub struct MemoryIdentity {
    argon2: Argon2<'static>,
    accounts: Mutex<HashMap<String, StoredAccount>>,
    sessions: Mutex<HashMap<String, Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl MemoryIdentity {
    /// Create a new [`MemoryIdentity`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();
        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| BackendError::Unavailable(err.to_string()))?;
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            accounts: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            events,
        })
    }

    async fn hash(&self, password: &str) -> Result<String> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| BackendError::Unavailable(err.to_string()))
        })
        .await
        .map_err(|err| BackendError::Unavailable(err.to_string()))?
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|err| BackendError::Unavailable(err.to_string()))?;
            Ok(argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|err| BackendError::Unavailable(err.to_string()))?
    }

    fn check_session(&self, session: &Session) -> Result<()> {
        if lock(&self.sessions)?.contains_key(&session.token) {
            Ok(())
        } else {
            Err(BackendError::NoSession)
        }
    }

    fn notify(&self, event: SessionEvent) {
        // no listener is not an error.
        let _ = self.events.send(event);
    }
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(BackendError::WeakPassword {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn create_account(&self, email: &str, password: &str) -> Result<Account> {
        check_password(password)?;
        let email = email.trim().to_lowercase();
        if lock(&self.accounts)?.contains_key(&email) {
            return Err(BackendError::EmailInUse);
        }

        let password_hash = self.hash(password).await?;
        let account = Account {
            uid: Alphanumeric.sample_string(&mut OsRng, KEY_LENGTH + 8),
            email: email.clone(),
        };

        let mut accounts = lock(&self.accounts)?;
        if accounts.contains_key(&email) {
            return Err(BackendError::EmailInUse);
        }
        accounts.insert(
            email,
            StoredAccount {
                account: account.clone(),
                password_hash,
            },
        );

        tracing::info!(uid = %account.uid, "account created");
        Ok(account)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim().to_lowercase();
        let stored = lock(&self.accounts)?
            .get(&email)
            .cloned()
            .ok_or(BackendError::InvalidCredentials)?;

        if !self.verify(password, &stored.password_hash).await? {
            return Err(BackendError::InvalidCredentials);
        }

        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let session = Session {
            token: hex::encode(bytes),
            account: stored.account,
            signed_in_at: chrono::Utc::now(),
        };

        lock(&self.sessions)?.insert(session.token.clone(), session.clone());
        self.notify(SessionEvent::SignedIn(session.clone()));

        Ok(session)
    }

    async fn sign_out(&self, token: &str) -> Result<()> {
        if lock(&self.sessions)?.remove(token).is_some() {
            self.notify(SessionEvent::SignedOut {
                token: token.to_owned(),
            });
        }
        Ok(())
    }

    fn session_changes(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn update_password(&self, session: &Session, password: &str) -> Result<()> {
        self.check_session(session)?;
        check_password(password)?;

        let password_hash = self.hash(password).await?;
        let mut accounts = lock(&self.accounts)?;
        let stored = accounts
            .get_mut(&session.account.email)
            .ok_or(BackendError::NoSession)?;
        stored.password_hash = password_hash;

        Ok(())
    }

    async fn delete_current(&self, session: &Session) -> Result<()> {
        self.check_session(session)?;

        lock(&self.accounts)?.remove(&session.account.email);
        lock(&self.sessions)?.retain(|_, s| s.account.uid != session.account.uid);
        self.notify(SessionEvent::AccountDeleted {
            uid: session.account.uid.clone(),
        });

        tracing::info!(uid = %session.account.uid, "account deleted");
        Ok(())
    }
}
