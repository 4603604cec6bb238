use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::Result;
use crate::preferences::Settings;
use crate::router::Valid;

/// Handler of `GET /settings`.
pub async fn get(State(state): State<AppState>) -> Json<Settings> {
    Json(state.preferences.current().await)
}

/// Handler of `PUT /settings`. Settings are only written here.
pub async fn save(
    State(state): State<AppState>,
    Valid(body): Valid<Settings>,
) -> Result<Json<Settings>> {
    Ok(Json(state.preferences.save(body).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::preferences::{SETTINGS_KEY, Theme};
    use crate::{app, make_request, router};

    #[tokio::test]
    async fn test_defaults_then_save() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;
        let app = app(state.clone());

        let response = make_request(Some(&token), app.clone(), Method::GET, "/settings", String::default()).await;
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let mut settings: Settings = serde_json::from_slice(&body).unwrap();
        assert_eq!(settings, Settings::default());

        settings.appearance.theme = Theme::Dark;
        let response = make_request(
            Some(&token),
            app.clone(),
            Method::PUT,
            "/settings",
            serde_json::to_string(&settings).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.preferences.current().await, settings);

        let path = state.config.preferences.as_ref().unwrap().path.clone();
        let raw: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(raw[SETTINGS_KEY]["appearance"]["theme"], "dark");
    }

    #[tokio::test]
    async fn test_invalid_settings_not_saved() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::PUT,
            "/settings",
            json!({ "security": { "sessionTimeout": 0 } }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.preferences.current().await, Settings::default());

        let path = state.config.preferences.as_ref().unwrap().path.clone();
        assert!(!path.exists());
    }
}
