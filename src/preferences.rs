//! Local preferences.
//!
//! Settings live in a single JSON file on the local disk under the
//! `appSettings` key. They are read once on start and written on explicit
//! save only, never through the document database.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use validator::Validate;

pub const SETTINGS_KEY: &str = "appSettings";

#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("cannot access preference file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode settings: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    #[validate(nested)]
    pub general: General,
    pub notifications: Notifications,
    #[validate(nested)]
    pub security: Security,
    pub appearance: Appearance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct General {
    #[validate(length(min = 1, message = "Application name is required."))]
    pub app_name: String,
    #[validate(length(min = 2, max = 5, message = "Language must be a language code."))]
    pub language: String,
    #[validate(length(min = 1, message = "Timezone is required."))]
    pub timezone: String,
}

impl Default for General {
    fn default() -> Self {
        Self {
            app_name: "BackOffice Déclaration".into(),
            language: "fr".into(),
            timezone: "Indian/Antananarivo".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    pub email: bool,
    pub push: bool,
    pub sms: bool,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
            sms: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct Security {
    pub two_factor_auth: bool,
    /// Minutes.
    #[validate(range(min = 1, max = 120, message = "Session timeout must be 1 to 120 minutes."))]
    pub session_timeout: u32,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            two_factor_auth: false,
            session_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    System,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Appearance {
    pub theme: Theme,
    pub font_size: FontSize,
}

/// JSON file holding the saved settings.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    /// Create a new [`PreferenceStore`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read_blob(&self) -> Result<Map<String, Value>, PreferenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(blob)) => Ok(blob),
                Ok(_) | Err(_) => {
                    tracing::error!(path = %self.path.display(), "preference file is not a JSON object");
                    Ok(Map::new())
                },
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Read saved settings, or defaults when nothing usable is stored.
    pub async fn load(&self) -> Result<Settings, PreferenceError> {
        let mut blob = self.read_blob().await?;

        match blob.remove(SETTINGS_KEY) {
            Some(value) => Ok(serde_json::from_value(value).unwrap_or_else(|err| {
                tracing::error!(error = %err, "error parsing saved settings");
                Settings::default()
            })),
            None => Ok(Settings::default()),
        }
    }

    /// Write `settings` under the settings key.
    pub async fn save(&self, settings: &Settings) -> Result<(), PreferenceError> {
        let mut blob = self.read_blob().await?;
        blob.insert(SETTINGS_KEY.to_owned(), serde_json::to_value(settings)?);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(&blob)?).await?;

        tracing::info!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}

/// Settings currently in effect, and where they are saved.
pub struct Preferences {
    store: PreferenceStore,
    current: RwLock<Settings>,
}

impl Preferences {
    /// Load settings from `store`.
    pub async fn load(store: PreferenceStore) -> Result<Self, PreferenceError> {
        let current = store.load().await?;
        Ok(Self {
            store,
            current: RwLock::new(current),
        })
    }

    /// Settings in effect.
    pub async fn current(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Save and apply `settings`.
    pub async fn save(&self, settings: Settings) -> Result<Settings, PreferenceError> {
        let mut current = self.current.write().await;
        self.store.save(&settings).await?;
        *current = settings;
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.json"));

        let settings = store.load().await.unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.general.timezone, "Indian/Antananarivo");
        assert_eq!(settings.security.session_timeout, 30);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.json"));

        let mut settings = Settings::default();
        settings.appearance.theme = Theme::Dark;
        settings.notifications.sms = true;
        store.save(&settings).await.unwrap();

        let raw: Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("preferences.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw[SETTINGS_KEY]["appearance"]["theme"], "dark");

        assert_eq!(store.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_partial_blob_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(
            &path,
            r#"{"appSettings":{"general":{"appName":"Mairie"},"security":{"sessionTimeout":60}}}"#,
        )
        .unwrap();

        let settings = PreferenceStore::new(&path).load().await.unwrap();
        assert_eq!(settings.general.app_name, "Mairie");
        assert_eq!(settings.general.language, "fr");
        assert_eq!(settings.security.session_timeout, 60);
        assert!(settings.notifications.email);
    }

    #[tokio::test]
    async fn test_corrupted_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "not json").unwrap();

        let settings = PreferenceStore::new(&path).load().await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_session_timeout_range() {
        let mut settings = Settings::default();
        settings.security.session_timeout = 0;
        assert!(settings.validate().is_err());

        settings.security.session_timeout = 120;
        assert!(settings.validate().is_ok());
    }
}
