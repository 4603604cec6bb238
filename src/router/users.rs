//! Users-related HTTP API.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::backend::Session;
use crate::error::{Result, ServerError};
use crate::router::Valid;
use crate::router::declarations::DeleteQuery;
use crate::user::{NewUser, Profile, ProfilePatch, UserQuery};

const CONFIRM_DELETE: &str = "Êtes-vous sûr de vouloir supprimer cet utilisateur ?";

#[derive(Debug, Serialize, Deserialize)]
pub struct List {
    pub users: Vec<Profile>,
}

/// Handler of `GET /users?search=&role=&status=`.
async fn list(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<List>> {
    Ok(Json(List {
        users: state.users().list(&query).await?,
    }))
}

/// Handler of `POST /users`.
async fn create(
    State(state): State<AppState>,
    Valid(body): Valid<NewUser>,
) -> Result<(StatusCode, Json<Profile>)> {
    Ok((StatusCode::CREATED, Json(state.users().create(body).await?)))
}

/// Handler of `PATCH /users/{uid}`.
async fn update(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Valid(body): Valid<ProfilePatch>,
) -> Result<Json<Profile>> {
    Ok(Json(state.users().update(&uid, &body).await?))
}

/// Handler of `DELETE /users/{uid}?confirm=true`.
async fn delete(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(uid): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode> {
    if !query.confirm {
        return Err(ServerError::Confirmation(CONFIRM_DELETE));
    }

    state.users().delete(&uid, &session).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordBody {
    #[validate(length(min = 6, message = "Le mot de passe doit contenir au moins 6 caractères."))]
    pub password: String,
}

/// Handler of `PUT /users/@me/password`.
async fn password(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Valid(body): Valid<PasswordBody>,
) -> Result<StatusCode> {
    state.users().change_password(&session, &body.password).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `GET /users` lists, `POST /users` creates.
        .route("/users", get(list).post(create))
        .route("/users/{uid}", patch(update).delete(delete))
        .route("/users/@me/password", put(password))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::user::{Role, Status};
    use crate::{app, make_request, router};

    async fn json_body(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_filter() {
        let state = router::state().await;
        let token = router::sign_in(&state, "admin@mairie.mg").await;
        let app = app(state);

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            "/users",
            json!({
                "email": "rabe@mairie.mg",
                "password": "secret42",
                "displayName": "Rabe",
                "role": "moderator",
                "status": "inactive",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: Profile = serde_json::from_value(json_body(response).await).unwrap();
        assert_eq!(created.role, Role::Moderator);
        assert!(created.last_login.is_none());

        let response = make_request(Some(&token), app.clone(), Method::GET, "/users?role=moderator&status=all", String::default()).await;
        let users = json_body(response).await["users"].as_array().unwrap().clone();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["displayName"], "Rabe");

        let response = make_request(Some(&token), app, Method::GET, "/users?search=RAB", String::default()).await;
        assert_eq!(json_body(response).await["users"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_invalid() {
        let state = router::state().await;
        let token = router::sign_in(&state, "admin@mairie.mg").await;

        let response = make_request(
            Some(&token),
            app(state),
            Method::POST,
            "/users",
            json!({ "email": "not-an-email", "password": "123", "displayName": "" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_patch_keeps_other_fields() {
        let state = router::state().await;
        let token = router::sign_in(&state, "admin@mairie.mg").await;
        let uid = state.sessions.get(&token).unwrap().account.uid;

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::PATCH,
            &format!("/users/{uid}"),
            json!({ "status": "suspended" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let profile = state.users().repo.find_by_id(&uid).await.unwrap().unwrap();
        assert_eq!(profile.status, Status::Suspended);
        assert_eq!(profile.display_name, "Agent");
        assert_eq!(profile.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_patch_missing_user() {
        let state = router::state().await;
        let token = router::sign_in(&state, "admin@mairie.mg").await;

        let response = make_request(
            Some(&token),
            app(state),
            Method::PATCH,
            "/users/missing",
            json!({ "displayName": "Nobody" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_other_user_keeps_account() {
        let state = router::state().await;
        let token = router::sign_in(&state, "admin@mairie.mg").await;
        let other = state
            .users()
            .create(NewUser {
                email: "rabe@mairie.mg".into(),
                password: "secret42".into(),
                display_name: "Rabe".into(),
                role: Role::User,
                status: Status::Active,
            })
            .await
            .unwrap();
        let app = app(state.clone());

        let path = format!("/users/{}", other.uid);
        let response = make_request(Some(&token), app.clone(), Method::DELETE, &path, String::default()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["detail"], CONFIRM_DELETE);

        let response = make_request(Some(&token), app, Method::DELETE, &format!("{path}?confirm=true"), String::default()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        assert!(state.users().repo.find_by_id(&other.uid).await.unwrap().is_none());
        assert!(state.identity.sign_in("rabe@mairie.mg", "secret42").await.is_ok());
    }

    #[tokio::test]
    async fn test_change_own_password() {
        let state = router::state().await;
        let token = router::sign_in(&state, "admin@mairie.mg").await;

        let response = make_request(
            Some(&token),
            app(state.clone()),
            Method::PUT,
            "/users/@me/password",
            json!({ "password": "another42" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.identity.sign_in("admin@mairie.mg", "another42").await.is_ok());
    }
}
