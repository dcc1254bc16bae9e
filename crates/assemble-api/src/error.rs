use axum::http::StatusCode;
use tracing::{error, warn};

use assemble_db::{Database, StoreError};

use crate::auth::AppState;

/// Maps a store failure onto the HTTP status the caller sees. Server-side
/// causes are logged here so handlers don't have to.
pub(crate) fn store_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::InvalidParent(reason) => {
            warn!("Rejected component parent: {}", reason);
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        other => {
            error!("Store error: {}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Runs a blocking store call off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> assemble_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(store_status)
}

/// Trims `raw` and enforces 1..=`max` characters.
pub(crate) fn validate_name(raw: &str, max: usize) -> Result<String, StatusCode> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > max {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(name.to_string())
}
