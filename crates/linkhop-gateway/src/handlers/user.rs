use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use linkhop_core::ShortCode;
use linkhop_registry::{DeletionRequest, RegistryError};

use crate::error::{AppError, Result};
use crate::model::UserUrl;
use crate::session::{attach, session_token};
use crate::state::AppState;

/// `GET /api/user/urls`: live links of the caller. Never issues a session.
pub async fn list_user_urls_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response> {
    let owner = state
        .identity
        .authenticate(session_token(&headers).as_deref())
        .await?;

    let records = match state.registry.list_by_owner(owner).await {
        Ok(records) => records,
        Err(RegistryError::Unsupported(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let urls: Vec<UserUrl> = records
        .into_iter()
        .filter(|record| !record.deleted)
        .map(|record| UserUrl {
            short_url: state.short_url(&record.code),
            original_url: record.original_url,
        })
        .collect();

    if urls.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    Ok(Json(urls).into_response())
}

/// `DELETE /api/user/urls` with a JSON array of ids. Accepted once queued.
pub async fn delete_user_urls_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(ids): Json<Vec<String>>,
) -> Result<Response> {
    let codes = ids
        .into_iter()
        .map(ShortCode::new)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session = state
        .identity
        .resolve(session_token(&headers).as_deref())
        .await?;

    state.deletions.enqueue(DeletionRequest {
        codes,
        owner_token: session.token.clone(),
    })?;

    attach(StatusCode::ACCEPTED.into_response(), &session)
}
