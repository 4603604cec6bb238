//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::AppState;
use crate::ServerError;
use crate::backend::Session;

const BEARER: &str = "Bearer ";
pub const LOGIN_ROUTE: &str = "/login";

/// Token of the `Authorization` header.
pub fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .map(|value| value.strip_prefix(BEARER).unwrap_or(value).trim())
        .filter(|token| !token.is_empty())
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|header| header.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Let the request through only with a signed-in session.
///
/// The [`Session`] is added to the request extensions. Browsers are sent
/// to the login page, other clients get a `401`.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let session: Option<Session> = bearer(req.headers()).and_then(|token| state.sessions.get(token));

    match session {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        },
        None if wants_html(req.headers()) => Redirect::to(LOGIN_ROUTE).into_response(),
        None => ServerError::Unauthorized.into_response(),
    }
}
