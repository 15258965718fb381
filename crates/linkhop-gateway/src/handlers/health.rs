use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use crate::state::AppState;

/// 200 when the backend answers its ping. Backends without a health check
/// count as unhealthy.
pub async fn ping_handler(State(state): State<AppState>) -> StatusCode {
    match state.registry.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "health check failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
