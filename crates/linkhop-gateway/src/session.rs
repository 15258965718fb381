use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use cookie::Cookie;
use linkhop_registry::Session;

use crate::error::{AppError, Result};

pub const SESSION_COOKIE: &str = "shortener_session";

/// Extracts the raw session token from the request's `Cookie` headers.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|cookie| cookie.ok())
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}

/// Adds a `Set-Cookie` header when the session was just issued.
pub fn attach(mut response: Response, session: &Session) -> Result<Response> {
    if !session.issued {
        return Ok(response);
    }

    let cookie = Cookie::build((SESSION_COOKIE, session.token.as_str()))
        .path("/")
        .http_only(true)
        .build();
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AppError::Internal(format!("unencodable session cookie: {e}")))?;

    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}
