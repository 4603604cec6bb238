use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::translate::LanguageCode;

#[derive(Debug, Deserialize)]
pub struct Body {
    pub text: String,
    pub target: LanguageCode,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub translated_text: String,
}

/// Handler of `POST /translate`.
///
/// Translation failures are not errors, the placeholder text is returned
/// instead.
pub async fn handler(State(state): State<AppState>, Json(body): Json<Body>) -> Json<Response> {
    Json(Response {
        translated_text: state.translator.translate(&body.text, body.target).await,
    })
}
