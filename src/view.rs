//! Live views over a collection.

use std::sync::Arc;

use crate::backend::{self, DocumentStore, Record, SnapshotResult, Subscription};

/// Typed decoding of a stored record.
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> backend::Result<Self>;
}

/// Latest items of a collection, kept in sync through a subscription.
///
/// Dropping the view releases its subscription.
pub struct LiveList<T> {
    subscription: Subscription,
    items: Vec<T>,
    loading: bool,
    error: Option<String>,
    error_prefix: &'static str,
}

impl<T: FromRecord> LiveList<T> {
    /// Subscribe to `collection`. `error_prefix` starts every error message.
    pub async fn open(
        store: &Arc<dyn DocumentStore>,
        collection: &str,
        error_prefix: &'static str,
    ) -> backend::Result<Self> {
        let subscription = store.subscribe(collection).await?;

        Ok(Self {
            subscription,
            items: Vec::new(),
            loading: true,
            error: None,
            error_prefix,
        })
    }

    /// Apply a pushed snapshot.
    ///
    /// An error keeps the previous items. Records that cannot be decoded
    /// are skipped.
    pub fn apply(&mut self, snapshot: SnapshotResult) {
        self.loading = false;

        match snapshot {
            Ok(snapshot) => {
                self.items = snapshot
                    .records
                    .iter()
                    .filter_map(|record| match T::from_record(record) {
                        Ok(item) => Some(item),
                        Err(err) => {
                            tracing::warn!(key = %record.key, error = %err, "skipping malformed record");
                            None
                        },
                    })
                    .collect();
                self.error = None;
            },
            Err(err) => {
                tracing::error!(collection = self.subscription.collection(), error = %err, "listener failed");
                self.error = Some(format!("{}{err}", self.error_prefix));
            },
        }
    }

    /// Wait for the next snapshot and apply it.
    ///
    /// Returns `false` once the store stopped pushing.
    pub async fn refresh(&mut self) -> bool {
        match self.subscription.next().await {
            Some(snapshot) => {
                self.apply(snapshot);
                true
            },
            None => false,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message of the last listener error, cleared by the next snapshot.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::backend::{BackendError, Document};
    use crate::declaration::{self, Declaration};

    const PREFIX: &str = "Erreur lors du chargement des déclarations : ";

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_delete_reaches_the_view() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = memory.clone();
        let key = store
            .create(declaration::COLLECTION, doc(json!({ "nom": "Rakoto" })))
            .await
            .unwrap();

        let mut view: LiveList<Declaration> =
            LiveList::open(&store, declaration::COLLECTION, PREFIX).await.unwrap();
        assert!(view.is_loading());

        assert!(view.refresh().await);
        assert!(!view.is_loading());
        assert_eq!(view.items()[0].id, key);

        store.delete(declaration::COLLECTION, &key).await.unwrap();
        assert!(view.refresh().await);
        assert!(view.items().is_empty());

        drop(view);
        assert_eq!(memory.listeners(declaration::COLLECTION), 0);
    }

    #[tokio::test]
    async fn test_error_keeps_items() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = memory.clone();
        store
            .create(declaration::COLLECTION, doc(json!({ "nom": "Rakoto" })))
            .await
            .unwrap();

        let mut view: LiveList<Declaration> =
            LiveList::open(&store, declaration::COLLECTION, PREFIX).await.unwrap();
        view.refresh().await;

        memory
            .fail(declaration::COLLECTION, BackendError::Unavailable("offline".into()))
            .unwrap();
        view.refresh().await;

        assert_eq!(view.items().len(), 1);
        assert_eq!(
            view.error(),
            Some("Erreur lors du chargement des déclarations : backend unavailable: offline")
        );
    }

    #[tokio::test]
    async fn test_skips_malformed_records() {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn DocumentStore> = memory.clone();
        store
            .create(declaration::COLLECTION, doc(json!({ "nom": 12 })))
            .await
            .unwrap();
        store
            .create(declaration::COLLECTION, doc(json!({ "nom": "Rabe" })))
            .await
            .unwrap();

        let mut view: LiveList<Declaration> =
            LiveList::open(&store, declaration::COLLECTION, PREFIX).await.unwrap();
        view.refresh().await;

        assert_eq!(view.items().len(), 1);
        assert_eq!(view.items()[0].child.surname, "Rabe");
    }
}
