use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use linkhop_registry::RegistryError;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
    Registry(RegistryError),
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::BadRequest(message) => {
                return (StatusCode::BAD_REQUEST, message).into_response();
            }
            AppError::Internal(message) => {
                error!(error = %message, "request failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
            AppError::Registry(err) => err,
        };

        let status = match &err {
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Deleted(_) => StatusCode::GONE,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::Unauthorized => StatusCode::UNAUTHORIZED,
            RegistryError::CapacityExceeded => StatusCode::TOO_MANY_REQUESTS,
            RegistryError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            RegistryError::PipelineClosed | RegistryError::BackendUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RegistryError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            RegistryError::Token(_) | RegistryError::Storage(_) => {
                error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, err.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkhop_core::StorageError;

    fn status_of(err: RegistryError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn batch_conflict_answers_conflict() {
        let err = RegistryError::from(StorageError::Conflict("https://example.com".into()));
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_failures_answer_internal_error() {
        let err = RegistryError::from(StorageError::Query("syntax".into()));
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn availability_failures_answer_unavailable() {
        let err = RegistryError::from(StorageError::Timeout("slow".into()));
        assert_eq!(status_of(err), StatusCode::SERVICE_UNAVAILABLE);
    }
}
