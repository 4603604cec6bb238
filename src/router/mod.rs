//! HTTP API of the back-office.
pub mod dashboard;
pub mod declarations;
pub mod login;
pub mod settings;
pub mod statistics;
pub mod status;
pub mod translate;
pub mod users;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::ServerError;

/// JSON body that passed validation.
#[derive(Debug)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn state() -> crate::AppState {
    use crate::backend::memory::tests::cheap_argon2;
    use crate::config::{Configuration, Translation};

    let dir = tempfile::tempdir().unwrap();
    let mut config = Configuration::default();
    config.name = "Mairie de test".into();
    config.url = "https://etatcivil.example.mg/".into();
    config.translation = Some(Translation {
        endpoint: "http://127.0.0.1:9/translate".into(),
        timeout: Some(1),
    });
    config.preferences = Some(crate::config::Preferences {
        path: dir.path().join("preferences.json"),
    });
    config.argon2 = Some(cheap_argon2());

    let mut state = crate::initialize_state(std::sync::Arc::new(config))
        .await
        .unwrap();
    // removed once the last clone of the state is dropped.
    state.workdir = Some(std::sync::Arc::new(dir));
    state
}

/// Create an account with a profile and return a session token for it.
#[cfg(test)]
pub async fn sign_in(state: &crate::AppState, email: &str) -> String {
    use crate::user::{NewUser, Role, Status};

    state
        .users()
        .create(NewUser {
            email: email.into(),
            password: "secret42".into(),
            display_name: "Agent".into(),
            role: Role::Admin,
            status: Status::Active,
        })
        .await
        .unwrap();

    let session = state.identity.sign_in(email, "secret42").await.unwrap();
    state.sessions.insert(session.clone());
    session.token
}
