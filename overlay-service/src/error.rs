use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Coarse failure classification surfaced to the operator console.
///
/// A module that parks in `Failed` carries the kind of its last error so the
/// admin UI can prompt corrective action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ResolutionFailure,
    TransportFailure,
    ProtocolFailure,
    MissingConfiguration,
}

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("channel resolution failed: {0}")]
    Resolution(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("protocol failure: {0}")]
    Protocol(String),
}

impl AppError {
    /// Map to the operator-facing taxonomy, where one applies.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Resolution(_) => Some(ErrorKind::ResolutionFailure),
            AppError::Transport(_) => Some(ErrorKind::TransportFailure),
            AppError::Protocol(_) => Some(ErrorKind::ProtocolFailure),
            AppError::MissingConfiguration(_) => Some(ErrorKind::MissingConfiguration),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingConfiguration(_) => StatusCode::BAD_REQUEST,
            AppError::UnknownModule(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_taxonomy() {
        assert_eq!(
            AppError::MissingConfiguration("channel id".into()).kind(),
            Some(ErrorKind::MissingConfiguration)
        );
        assert_eq!(
            AppError::Transport("connect timed out".into()).kind(),
            Some(ErrorKind::TransportFailure)
        );
        assert_eq!(AppError::Config("bad port".into()).kind(), None);
    }

    #[test]
    fn missing_configuration_is_a_client_error() {
        let err = AppError::MissingConfiguration("channel id".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
