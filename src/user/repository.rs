//! Handle database requests.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::backend::{self, BackendError, Document, DocumentStore, Record};
use crate::user::Profile;
use crate::view::FromRecord;

pub const COLLECTION: &str = "users";

impl FromRecord for Profile {
    fn from_record(record: &Record) -> backend::Result<Self> {
        let mut profile: Profile = serde_json::from_value(Value::Object(record.data.clone()))?;
        profile.uid = record.key.clone();
        Ok(profile)
    }
}

fn to_document(value: impl Serialize) -> backend::Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => {
            fields.remove("uid");
            Ok(fields)
        },
        _ => Err(BackendError::Malformed("profile is not an object".into())),
    }
}

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn DocumentStore>,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write [`Profile`] under its uid.
    pub async fn insert(&self, profile: &Profile) -> backend::Result<()> {
        self.store
            .set(COLLECTION, &profile.uid, to_document(profile)?)
            .await
    }

    /// Shallow merge of `fields` into the profile of `uid`.
    pub async fn update(&self, uid: &str, fields: impl Serialize) -> backend::Result<()> {
        self.store.update(COLLECTION, uid, to_document(fields)?).await
    }

    pub async fn touch_last_login(&self, uid: &str, at: DateTime<Utc>) -> backend::Result<()> {
        let mut fields = Document::new();
        fields.insert("lastLogin".into(), serde_json::to_value(at)?);
        self.store.update(COLLECTION, uid, fields).await
    }

    pub async fn delete(&self, uid: &str) -> backend::Result<()> {
        self.store.delete(COLLECTION, uid).await
    }

    /// Find profile using its uid.
    pub async fn find_by_id(&self, uid: &str) -> backend::Result<Option<Profile>> {
        self.store
            .get(COLLECTION, uid)
            .await?
            .map(|record| Profile::from_record(&record))
            .transpose()
    }

    /// Every profile, skipping the ones that cannot be read.
    pub async fn list(&self) -> backend::Result<Vec<Profile>> {
        Ok(self
            .store
            .list(COLLECTION)
            .await?
            .iter()
            .filter_map(|record| match Profile::from_record(record) {
                Ok(profile) => Some(profile),
                Err(err) => {
                    tracing::warn!(uid = %record.key, error = %err, "malformed profile");
                    None
                },
            })
            .collect())
    }
}
