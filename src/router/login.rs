//! Sign in, sign up and sign out.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::backend::Session;
use crate::error::Result;
use crate::middleware::bearer;
use crate::router::Valid;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct Body {
    #[validate(email(message = "Adresse email invalide."))]
    pub email: String,
    #[validate(length(min = 1, message = "Le mot de passe est obligatoire."))]
    pub password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub token_type: String,
    pub token: String,
    pub uid: String,
    pub email: String,
}

/// Handler of `POST /login`.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let session = state.identity.sign_in(&body.email, &body.password).await?;
    state.sessions.insert(session.clone());

    if let Err(err) = state.users().touch_last_login(&session).await {
        tracing::error!(uid = %session.account.uid, error = %err, "last login not recorded");
    }

    tracing::info!(uid = %session.account.uid, "signed in");
    Ok(Json(Response {
        token_type: TOKEN_TYPE.to_owned(),
        token: session.token,
        uid: session.account.uid,
        email: session.account.email,
    }))
}

fn passwords_match(body: &RegisterBody) -> std::result::Result<(), ValidationError> {
    if body.password == body.confirm_password {
        Ok(())
    } else {
        Err(ValidationError::new("confirm_password")
            .with_message("Les mots de passe ne correspondent pas.".into()))
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "passwords_match", skip_on_field_errors = false))]
pub struct RegisterBody {
    #[validate(email(message = "Adresse email invalide."))]
    pub email: String,
    #[validate(length(min = 6, message = "Le mot de passe doit contenir au moins 6 caractères."))]
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub uid: String,
    pub email: String,
}

/// Handler of `POST /register`.
///
/// Only creates the account. The client signs in afterwards.
pub async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<RegisterBody>,
) -> Result<(StatusCode, Json<Account>)> {
    let account = state
        .identity
        .create_account(body.email.trim(), &body.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Account {
            uid: account.uid,
            email: account.email,
        }),
    ))
}

/// Handler of `POST /logout`.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let token = bearer(&headers).unwrap_or(&session.token);
    state.identity.sign_out(token).await?;
    state.sessions.remove(token);

    tracing::info!(uid = %session.account.uid, "signed out");
    Ok(StatusCode::NO_CONTENT)
}
