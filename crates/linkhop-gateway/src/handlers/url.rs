use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use linkhop_core::ShortCode;
use linkhop_registry::{normalize_url, AddOutcome, BatchItem};
use url::Url;

use crate::error::{AppError, Result};
use crate::model::{BatchShortenEntry, BatchShortenItem, ShortenRequest, ShortenResponse};
use crate::session::{attach, session_token};
use crate::state::AppState;

fn status_of(outcome: &AddOutcome) -> StatusCode {
    if outcome.is_conflict() {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    }
}

/// `POST /` with the URL as a plain-text body.
pub async fn create_text_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Response> {
    let session = state
        .identity
        .resolve(session_token(&headers).as_deref())
        .await?;

    let url = normalize_url(&body)?;
    Url::parse(&url).map_err(|e| AppError::BadRequest(format!("invalid url '{url}': {e}")))?;

    let outcome = state.registry.add(&url, session.user_id).await?;
    let response = (
        status_of(&outcome),
        [(CONTENT_TYPE, "text/plain")],
        state.short_url(&outcome.code),
    )
        .into_response();

    attach(response, &session)
}

/// `POST /api/shorten` with `{"url": ...}`.
pub async fn shorten_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ShortenRequest>,
) -> Result<Response> {
    let session = state
        .identity
        .resolve(session_token(&headers).as_deref())
        .await?;

    let outcome = state.registry.add(&request.url, session.user_id).await?;
    let response = (
        status_of(&outcome),
        Json(ShortenResponse {
            result: state.short_url(&outcome.code),
        }),
    )
        .into_response();

    attach(response, &session)
}

/// `POST /api/shorten/batch`.
pub async fn shorten_batch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(items): Json<Vec<BatchShortenItem>>,
) -> Result<Response> {
    if items.is_empty() {
        return Err(AppError::BadRequest("batch is empty".to_string()));
    }

    let session = state
        .identity
        .resolve(session_token(&headers).as_deref())
        .await?;

    let items = items
        .into_iter()
        .map(|item| BatchItem {
            correlation_id: item.correlation_id,
            original_url: item.original_url,
        })
        .collect();

    let entries: Vec<BatchShortenEntry> = state
        .registry
        .add_batch(session.user_id, items)
        .await?
        .into_iter()
        .map(|entry| BatchShortenEntry {
            short_url: state.short_url(&entry.code),
            correlation_id: entry.correlation_id,
        })
        .collect();

    attach((StatusCode::CREATED, Json(entries)).into_response(), &session)
}

/// `GET /{id}`: 307 to the original URL.
pub async fn redirect_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response> {
    let code = ShortCode::new(id).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let url = state.registry.get(&code).await?;
    Ok(Redirect::temporary(&url).into_response())
}
