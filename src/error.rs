use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the subswitch controller
#[derive(Error, Debug)]
pub enum SubswitchError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // Subscription errors
    #[error("Subscription fetch failed: {0}")]
    SubscriptionFetch(String),

    #[error("Subscription contained no parsable servers")]
    EmptySubscription,

    // Selection errors
    #[error("No usable server among {candidates} candidates")]
    NoUsableServer { candidates: usize },

    // Engine errors
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine control request failed with status {status}: {body}")]
    EngineControl { status: u16, body: String },

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for subswitch operations
pub type Result<T> = std::result::Result<T, SubswitchError>;

impl SubswitchError {
    /// Whether the process should terminate instead of retrying later.
    ///
    /// Only configuration problems are fatal; everything else is transient.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SubswitchError::InvalidConfig(_) | SubswitchError::MissingEnvVar(_)
        )
    }

    /// Whether the candidate server, rather than the engine, is to blame
    pub fn blames_candidate(&self) -> bool {
        !matches!(
            self,
            SubswitchError::EngineUnavailable(_)
                | SubswitchError::Io(_)
                | SubswitchError::Yaml(_)
                | SubswitchError::InvalidConfig(_)
                | SubswitchError::MissingEnvVar(_)
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            SubswitchError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            SubswitchError::SubscriptionFetch(_) | SubswitchError::EngineControl { .. } => {
                StatusCode::BAD_GATEWAY
            }

            SubswitchError::EmptySubscription
            | SubswitchError::NoUsableServer { .. }
            | SubswitchError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            SubswitchError::Io(_)
            | SubswitchError::Yaml(_)
            | SubswitchError::Http(_)
            | SubswitchError::MissingEnvVar(_)
            | SubswitchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SubswitchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for SubswitchError {
    fn from(err: reqwest::Error) -> Self {
        SubswitchError::Http(err.to_string())
    }
}

impl From<url::ParseError> for SubswitchError {
    fn from(err: url::ParseError) -> Self {
        SubswitchError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_errors_are_fatal() {
        assert!(SubswitchError::MissingEnvVar("SUB_URL".into()).is_fatal());
        assert!(SubswitchError::InvalidConfig("bad".into()).is_fatal());

        assert!(!SubswitchError::SubscriptionFetch("down".into()).is_fatal());
        assert!(!SubswitchError::NoUsableServer { candidates: 3 }.is_fatal());
        assert!(!SubswitchError::EngineControl {
            status: 500,
            body: String::new()
        }
        .is_fatal());
    }

    #[test]
    fn test_blame_classification() {
        assert!(SubswitchError::EngineControl {
            status: 404,
            body: "proxy not found".into()
        }
        .blames_candidate());
        assert!(SubswitchError::Http("connection reset".into()).blames_candidate());
        assert!(!SubswitchError::EngineUnavailable("not ready".into()).blames_candidate());
    }

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            SubswitchError::NoUsableServer { candidates: 0 }.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            SubswitchError::SubscriptionFetch("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            SubswitchError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
