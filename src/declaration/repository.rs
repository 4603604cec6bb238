//! Handle database requests.

use std::sync::Arc;

use serde_json::Value;

use super::Declaration;
use crate::backend::{self, BackendError, Document, DocumentStore, Record, Subscription};
use crate::view::FromRecord;

pub const COLLECTION: &str = "declarations";

impl FromRecord for Declaration {
    fn from_record(record: &Record) -> backend::Result<Self> {
        let mut declaration: Declaration =
            serde_json::from_value(Value::Object(record.data.clone()))?;
        declaration.id = record.key.clone();
        Ok(declaration)
    }
}

/// Stored fields of `declaration`, without its key.
fn to_document(declaration: &Declaration) -> backend::Result<Document> {
    match serde_json::to_value(declaration)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        },
        _ => Err(BackendError::Malformed("declaration is not an object".into())),
    }
}

#[derive(Clone)]
pub struct DeclarationRepository {
    store: Arc<dyn DocumentStore>,
}

impl DeclarationRepository {
    /// Create a new [`DeclarationRepository`].
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Listen to every change of the collection.
    pub async fn subscribe(&self) -> backend::Result<Subscription> {
        self.store.subscribe(COLLECTION).await
    }

    /// Insert a new declaration and return its key.
    pub async fn insert(&self, declaration: &Declaration) -> backend::Result<String> {
        let key = self.store.create(COLLECTION, to_document(declaration)?).await?;
        tracing::info!(id = %key, "declaration created");
        Ok(key)
    }

    /// Merge `declaration` into the stored one.
    pub async fn update(&self, id: &str, declaration: &Declaration) -> backend::Result<()> {
        self.store
            .update(COLLECTION, id, to_document(declaration)?)
            .await?;
        tracing::info!(%id, "declaration updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> backend::Result<()> {
        self.store.delete(COLLECTION, id).await?;
        tracing::info!(%id, "declaration deleted");
        Ok(())
    }

    /// Find declaration using its key.
    pub async fn find_by_id(&self, id: &str) -> backend::Result<Option<Declaration>> {
        self.store
            .get(COLLECTION, id)
            .await?
            .map(|record| Declaration::from_record(&record))
            .transpose()
    }

    /// Every readable declaration. Malformed ones are skipped.
    pub async fn list(&self) -> backend::Result<Vec<Declaration>> {
        Ok(self
            .store
            .list(COLLECTION)
            .await?
            .iter()
            .filter_map(|record| match Declaration::from_record(record) {
                Ok(declaration) => Some(declaration),
                Err(err) => {
                    tracing::warn!(id = %record.key, error = %err, "malformed declaration");
                    None
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;

    fn repository() -> (Arc<MemoryStore>, DeclarationRepository) {
        let store = Arc::new(MemoryStore::new());
        (Arc::clone(&store), DeclarationRepository::new(store))
    }

    #[tokio::test]
    async fn test_insert_strips_id() {
        let (store, repo) = repository();
        let mut declaration = Declaration::default();
        declaration.id = "ignored".into();
        declaration.child.surname = "Rakoto".into();

        let key = repo.insert(&declaration).await.unwrap();
        let record = store.get(COLLECTION, &key).await.unwrap().unwrap();
        assert!(!record.data.contains_key("id"));
        assert_eq!(record.data["nom"], "Rakoto");

        let found = repo.find_by_id(&key).await.unwrap().unwrap();
        assert_eq!(found.id, key);
    }

    #[tokio::test]
    async fn test_update_keeps_unknown_fields() {
        let (store, repo) = repository();
        let mut data = Document::new();
        data.insert("nom".into(), "Rabe".into());
        data.insert("archive".into(), "B-12".into());
        let key = store.create(COLLECTION, data).await.unwrap();

        let mut declaration = Declaration::default();
        declaration.child.surname = "Rakoto".into();
        repo.update(&key, &declaration).await.unwrap();

        let record = store.get(COLLECTION, &key).await.unwrap().unwrap();
        assert_eq!(record.data["nom"], "Rakoto");
        assert_eq!(record.data["archive"], "B-12");
    }

    #[tokio::test]
    async fn test_list_skips_malformed() {
        let (store, repo) = repository();
        let mut good = Document::new();
        good.insert("nom".into(), "Rabe".into());
        store.create(COLLECTION, good).await.unwrap();
        let mut bad = Document::new();
        bad.insert("nom".into(), 12.into());
        store.create(COLLECTION, bad).await.unwrap();

        let declarations = repo.list().await.unwrap();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].child.surname, "Rabe");
    }

    #[tokio::test]
    async fn test_missing_declaration() {
        let (_, repo) = repository();
        assert!(repo.find_by_id("nope").await.unwrap().is_none());
        assert!(repo.update("nope", &Declaration::default()).await.is_err());
        assert!(repo.delete("nope").await.is_ok());
    }
}
