use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::Result;
use crate::router::declarations;
use crate::statistics::{self, Statistics};

/// Handler of `GET /statistics`.
pub async fn handler(State(state): State<AppState>) -> Result<Json<Statistics>> {
    let declarations = declarations::current(&state).await?;
    Ok(Json(statistics::compute(&declarations)))
}
