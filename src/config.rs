//! Configuration manager for the back-office.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_TRANSLATION_ENDPOINT: &str = "https://libretranslate.de/translate";
const DEFAULT_TRANSLATION_TIMEOUT: u64 = 10;
const DEFAULT_PREFERENCES_PATH: &str = "preferences.json";
const DEFAULT_LINES_PER_PAGE: usize = 40;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public URL of current instance.
    pub url: String,
    /// Listening port. `PORT` environment variable wins.
    pub port: Option<u16>,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to the text translation API.
    #[serde(skip_serializing)]
    pub translation: Option<Translation>,
    /// Related to the local preference store.
    #[serde(skip_serializing)]
    pub preferences: Option<Preferences>,
    /// Related to declaration documents.
    #[serde(skip_serializing)]
    pub pdf: Option<Pdf>,
    /// Related to Argon2 configuration of the local identity provider.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to traces, logs and metrics export.
    #[serde(skip_serializing)]
    pub telemetry: Option<Telemetry>,
    /// Account created on start when missing.
    #[serde(skip_serializing)]
    pub admin: Option<Admin>,
}

/// Translation API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    /// LibreTranslate compatible `/translate` endpoint.
    pub endpoint: String,
    /// Request timeout, in seconds.
    pub timeout: Option<u64>,
}

impl Default for Translation {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TRANSLATION_ENDPOINT.to_owned(),
            timeout: Some(DEFAULT_TRANSLATION_TIMEOUT),
        }
    }
}

/// Local preference store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// JSON file holding saved settings.
    pub path: PathBuf,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PREFERENCES_PATH),
        }
    }
}

/// Declaration document layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pdf {
    /// Maximum number of lines on one page.
    pub lines_per_page: usize,
}

impl Default for Pdf {
    fn default() -> Self {
        Self {
            lines_per_page: DEFAULT_LINES_PER_PAGE,
        }
    }
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// gRPC endpoint of an OTLP collector.
    pub otlp_endpoint: Option<String>,
    /// Expose `/metrics` for Prometheus.
    #[serde(default)]
    pub prometheus: bool,
}

/// Seed administrator account.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Listening port.
    pub fn port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .or(self.port)
            .unwrap_or(DEFAULT_PORT)
    }

    /// Current application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                // normalize URLs.
                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }
                if let Some(translation) = config.translation.as_mut() {
                    translation.endpoint =
                        self.normalize_url(&translation.endpoint)?;
                }

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}
