//! Declarations HTTP API.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing;
use axum::{Extension, Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::backend::{Record, Session, SnapshotResult};
use crate::declaration::{self, Declaration};
use crate::error::{Result, ServerError};
use crate::pdf;
use crate::router::Valid;
use crate::view::{FromRecord, LiveList};
use crate::AppState;

/// Prefix of every error message of the declarations list.
pub const LOADING_ERROR: &str = "Erreur lors du chargement des déclarations : ";
const CONFIRM_DELETE: &str = "Voulez-vous vraiment supprimer cette déclaration ?";

fn not_found(id: &str) -> ServerError {
    ServerError::NotFound {
        resource: "declaration",
        id: id.to_owned(),
    }
}

/// Open a live view on the declarations and wait for its first snapshot.
pub async fn current(state: &AppState) -> Result<Vec<Declaration>> {
    let mut view: LiveList<Declaration> =
        LiveList::open(&state.store, declaration::COLLECTION, LOADING_ERROR).await?;
    view.refresh().await;

    match view.error() {
        Some(message) => Err(ServerError::Listener(message.to_owned())),
        None => Ok(view.into_items()),
    }
}

async fn find(state: &AppState, id: &str) -> Result<Declaration> {
    state
        .declarations()
        .find_by_id(id)
        .await?
        .ok_or_else(|| not_found(id))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct List {
    pub declarations: Vec<Declaration>,
}

/// Handler of `GET /declarations`.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<List>> {
    let declarations = current(&state).await?;
    let term = query.search.unwrap_or_default();

    Ok(Json(List {
        declarations: declaration::search(&declarations, &term)
            .into_iter()
            .cloned()
            .collect(),
    }))
}

/// Handler of `POST /declarations`.
pub async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Valid(body): Valid<Declaration>,
) -> Result<(StatusCode, Json<Declaration>)> {
    let _guard = state
        .in_flight
        .begin(&session.account.uid, None)
        .ok_or(ServerError::Conflict)?;

    let mut declaration = body.normalize();
    declaration.id = state.declarations().insert(&declaration).await?;
    metrics::counter!("declarations_written_total", "operation" => "create").increment(1);

    Ok((StatusCode::CREATED, Json(declaration)))
}

/// Handler of `GET /declarations/{id}`, dates cut for the edit form.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Declaration>> {
    Ok(Json(find(&state, &id).await?.for_edit()))
}

/// Handler of `PUT /declarations/{id}`.
pub async fn update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
    Valid(body): Valid<Declaration>,
) -> Result<Json<Declaration>> {
    let _guard = state
        .in_flight
        .begin(&session.account.uid, Some(&id))
        .ok_or(ServerError::Conflict)?;

    find(&state, &id).await?;

    let mut declaration = body.normalize();
    state.declarations().update(&id, &declaration).await?;
    metrics::counter!("declarations_written_total", "operation" => "update").increment(1);

    declaration.id = id;
    Ok(Json(declaration))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// Handler of `DELETE /declarations/{id}?confirm=true`.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode> {
    if !query.confirm {
        return Err(ServerError::Confirmation(CONFIRM_DELETE));
    }

    state.declarations().delete(&id).await?;
    metrics::counter!("declarations_deleted_total").increment(1);

    Ok(StatusCode::NO_CONTENT)
}

fn snapshot_event(snapshot: SnapshotResult) -> Event {
    match snapshot {
        Ok(snapshot) => {
            let declarations: Vec<Declaration> = snapshot
                .records
                .iter()
                .filter_map(|record: &Record| Declaration::from_record(record).ok())
                .collect();
            Event::default()
                .event("snapshot")
                .json_data(&declarations)
                .unwrap_or_else(|err| Event::default().event("error").data(err.to_string()))
        },
        Err(err) => Event::default()
            .event("error")
            .data(format!("{LOADING_ERROR}{err}")),
    }
}

/// Handler of `GET /declarations/events`.
///
/// Every change of the collection is pushed as a `snapshot` event. The
/// subscription is released when the client goes away.
pub async fn events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let subscription = state.declarations().subscribe().await?;
    let stream = subscription
        .into_stream()
        .map(|snapshot| Ok(snapshot_event(snapshot)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Handler of `GET /declarations/{id}/pdf`.
pub async fn preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<pdf::Document>> {
    let declaration = find(&state, &id).await?;
    Ok(Json(pdf::build(&declaration, state.lines_per_page())))
}

/// Handler of `GET /declarations/{id}/pdf/download`.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let declaration = find(&state, &id).await?;
    let document = pdf::build(&declaration, state.lines_per_page());
    let file_name = pdf::file_name(&declaration, state.renderer.extension());

    Ok((
        [
            (header::CONTENT_TYPE, state.renderer.content_type().to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        state.renderer.render(&document)?,
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/declarations", routing::get(list).post(create))
        .route("/declarations/events", routing::get(events))
        .route("/declarations/{id}", routing::get(get).put(update).delete(delete))
        .route("/declarations/{id}/pdf", routing::get(preview))
        .route("/declarations/{id}/pdf/download", routing::get(download))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::backend::BackendError;
    use crate::{app, make_request, router};

    fn unmarried() -> Value {
        json!({
            "nom": "Rakoto",
            "prenom": "Hery",
            "dateNaissance": "2024-03-15",
            "sexe": "M",
            "nomMere": "Martin",
            "prenomMere": "Claire",
            "parentsMaries": false,
            "dateMariageParents": "2020-01-01",
        })
    }

    async fn json_body(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_create_normalizes() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;

        let response = make_request(Some(&token), app(state.clone()), Method::POST, "/declarations", unmarried().to_string()).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        let id = body["id"].as_str().unwrap();
        let stored = state.declarations().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.marriage.marital_status, declaration::NOT_MARRIED_LABEL);
        assert!(stored.marriage.date.is_empty());
        assert!(stored.declared_at.is_some());
    }

    #[tokio::test]
    async fn test_invalid_form_is_not_written() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;

        let mut body = unmarried();
        body["parentsMaries"] = json!(true);
        let response = make_request(Some(&token), app(state.clone()), Method::POST, "/declarations", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"nomPere"));
        assert!(fields.contains(&"prenomPere"));
        assert!(state.declarations().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_submit_is_rejected() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;
        let uid = state.sessions.get(&token).unwrap().account.uid;

        let _pending = state.in_flight.begin(&uid, None).unwrap();
        let response = make_request(Some(&token), app(state.clone()), Method::POST, "/declarations", unmarried().to_string()).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_search_and_update() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;
        let app = app(state.clone());

        let response = make_request(Some(&token), app.clone(), Method::POST, "/declarations", unmarried().to_string()).await;
        let id = json_body(response).await["id"].as_str().unwrap().to_owned();

        let response = make_request(Some(&token), app.clone(), Method::GET, "/declarations?search=mar", String::default()).await;
        assert_eq!(json_body(response).await["declarations"].as_array().unwrap().len(), 1);
        let response = make_request(Some(&token), app.clone(), Method::GET, "/declarations?search=xyz", String::default()).await;
        assert!(json_body(response).await["declarations"].as_array().unwrap().is_empty());

        let mut body = unmarried();
        body["prenom"] = json!("Tojo");
        let response = make_request(Some(&token), app.clone(), Method::PUT, &format!("/declarations/{id}"), body.to_string()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(Some(&token), app, Method::GET, &format!("/declarations/{id}"), String::default()).await;
        assert_eq!(json_body(response).await["prenom"], "Tojo");
    }

    #[tokio::test]
    async fn test_update_missing() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;

        let response = make_request(Some(&token), app(state), Method::PUT, "/declarations/missing", unmarried().to_string()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_needs_confirmation() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;
        let key = state
            .declarations()
            .insert(&serde_json::from_value(unmarried()).unwrap())
            .await
            .unwrap();
        let app = app(state.clone());

        let response = make_request(Some(&token), app.clone(), Method::DELETE, &format!("/declarations/{key}"), String::default()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["detail"], CONFIRM_DELETE);

        let response = make_request(Some(&token), app, Method::DELETE, &format!("/declarations/{key}?confirm=true"), String::default()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.declarations().find_by_id(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listener_error_is_surfaced() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;
        state
            .memory
            .fail(declaration::COLLECTION, BackendError::Unavailable("offline".into()))
            .unwrap();

        let response = make_request(Some(&token), app(state), Method::GET, "/declarations", String::default()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            json_body(response).await["detail"],
            "Erreur lors du chargement des déclarations : backend unavailable: offline"
        );
    }

    #[tokio::test]
    async fn test_list_recovers_after_write() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;
        let app = app(state.clone());
        state
            .memory
            .fail(declaration::COLLECTION, BackendError::Unavailable("offline".into()))
            .unwrap();

        let response = make_request(Some(&token), app.clone(), Method::GET, "/declarations", String::default()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        state
            .declarations()
            .insert(&serde_json::from_value(unmarried()).unwrap())
            .await
            .unwrap();
        let response = make_request(Some(&token), app, Method::GET, "/declarations", String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["declarations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pdf_download() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;
        let key = state
            .declarations()
            .insert(&serde_json::from_value(unmarried()).unwrap())
            .await
            .unwrap();
        let app = app(state);

        let response = make_request(Some(&token), app.clone(), Method::GET, &format!("/declarations/{key}/pdf"), String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["title"], pdf::TITLE);

        let response = make_request(Some(&token), app, Method::GET, &format!("/declarations/{key}/pdf/download"), String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"declaration-Rakoto-Hery.pdf\""
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_events_release_subscription() {
        let state = router::state().await;
        let token = router::sign_in(&state, "agent@mairie.mg").await;

        let response = make_request(Some(&token), app(state.clone()), Method::GET, "/declarations/events", String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.memory.listeners(declaration::COLLECTION), 1);

        let mut body = response.into_body();
        let frame = body.frame().await.unwrap().unwrap();
        let data = frame.into_data().unwrap();
        assert!(String::from_utf8_lossy(&data).starts_with("event: snapshot"));

        drop(body);
        assert_eq!(state.memory.listeners(declaration::COLLECTION), 0);
    }
}
