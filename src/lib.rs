//! Back-office for birth declarations of a civil status office.

#[forbid(unsafe_code)]
#[deny(unused_mut)]
pub mod backend;
pub mod config;
pub mod declaration;
pub mod error;
pub mod inflight;
mod middleware;
pub mod pdf;
pub mod preferences;
mod router;
pub mod session;
pub mod statistics;
pub mod telemetry;
pub mod translate;
pub mod user;
pub mod view;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::backend::memory::{MemoryIdentity, MemoryStore};
use crate::backend::{BackendError, DocumentStore, IdentityProvider};
use crate::config::Configuration;
use crate::declaration::DeclarationRepository;
use crate::inflight::InFlight;
use crate::pdf::{PdfRenderer, Renderer};
use crate::preferences::{PreferenceStore, Preferences};
use crate::session::SessionState;
use crate::translate::Translator;
use crate::user::{NewUser, Role, Status, UserService};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: Arc<SessionState>,
    pub translator: Translator,
    pub preferences: Arc<Preferences>,
    pub renderer: Arc<dyn Renderer>,
    pub in_flight: InFlight,
    pub metrics: Option<PrometheusHandle>,
    #[cfg(test)]
    pub memory: Arc<MemoryStore>,
    #[cfg(test)]
    pub workdir: Option<Arc<tempfile::TempDir>>,
}

impl AppState {
    pub fn declarations(&self) -> DeclarationRepository {
        DeclarationRepository::new(Arc::clone(&self.store))
    }

    pub fn users(&self) -> UserService {
        UserService::new(Arc::clone(&self.store), Arc::clone(&self.identity))
    }

    /// Page budget of declaration documents.
    pub fn lines_per_page(&self) -> usize {
        self.config.pdf.clone().unwrap_or_default().lines_per_page
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    // Everything below requires a signed-in session.
    let protected = Router::new()
        .route("/dashboard", get(router::dashboard::handler))
        .route("/statistics", get(router::statistics::handler))
        .route("/settings", get(router::settings::get).put(router::settings::save))
        .route("/translate", post(router::translate::handler))
        .route("/logout", post(router::login::logout))
        .merge(router::declarations::router())
        .merge(router::users::router())
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .route("/register", post(router::login::register))
        .merge(protected)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Create the configured administrator when it does not exist yet.
async fn seed_admin(users: &UserService, config: &Configuration) -> Result<(), ServerError> {
    let Some(admin) = &config.admin else {
        return Ok(());
    };

    let user = NewUser {
        email: admin.email.clone(),
        password: admin.password.clone(),
        display_name: admin
            .display_name
            .clone()
            .unwrap_or_else(|| "Administrateur".to_owned()),
        role: Role::Admin,
        status: Status::Active,
    };

    match users.create(user).await {
        Ok(profile) => {
            tracing::info!(uid = %profile.uid, "administrator account created");
            Ok(())
        },
        Err(ServerError::Backend(BackendError::EmailInUse)) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Initialize the application state.
pub async fn initialize_state(
    config: Arc<Configuration>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = memory.clone();
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(MemoryIdentity::new(config.argon2.clone())?);
    let sessions = Arc::new(SessionState::new(&*identity));

    let translator = Translator::new(config.translation.clone().unwrap_or_default());

    // settings are read once, on start.
    let preferences = PreferenceStore::new(
        config.preferences.clone().unwrap_or_default().path,
    );
    let preferences = Arc::new(Preferences::load(preferences).await?);

    let state = AppState {
        config,
        store,
        identity,
        sessions,
        translator,
        preferences,
        renderer: Arc::new(PdfRenderer),
        in_flight: InFlight::new(),
        metrics: None,
        #[cfg(test)]
        memory,
        #[cfg(test)]
        workdir: None,
    };

    seed_admin(&state.users(), &state.config).await?;

    Ok(state)
}
