//! Text translation through a LibreTranslate compatible API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Translation;

/// Returned in place of a translation when the API call fails.
pub const FAILURE_PLACEHOLDER: &str = "Erreur de traduction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    Fr,
    En,
    Mg,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'static str,
    target: LanguageCode,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Clone)]
pub struct Translator {
    client: Client,
    endpoint: String,
}

impl Translator {
    /// Create a new [`Translator`].
    pub fn new(config: Translation) -> Self {
        let timeout = Duration::from_secs(config.timeout.unwrap_or(10));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "cannot build translation client, using defaults");
                Client::new()
            });

        Self {
            client,
            endpoint: config.endpoint,
        }
    }

    async fn call(&self, text: &str, target: LanguageCode) -> reqwest::Result<String> {
        let body = TranslateRequest {
            q: text,
            source: "auto",
            target,
            format: "text",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<TranslateResponse>()
            .await?;

        Ok(response.translated_text)
    }

    /// Translate `text` into `target`.
    ///
    /// Never fails: blank text gives an empty string, and any failure the
    /// [`FAILURE_PLACEHOLDER`].
    pub async fn translate(&self, text: &str, target: LanguageCode) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        let result = self.call(text, target).await;
        metrics::counter!("translations_total", "success" => result.is_ok().to_string())
            .increment(1);

        result.unwrap_or_else(|err| {
            tracing::error!(error = %err, endpoint = %self.endpoint, "translation failed");
            FAILURE_PLACEHOLDER.to_owned()
        })
    }
}
