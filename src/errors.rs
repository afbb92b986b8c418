use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json
};
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Upstream error: {0}")]
    Integration(#[from] IntegrationError),
    #[error("Method not allowed")]
    MethodNotAllowed,
}

/// Failures talking to a third-party provider
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} response could not be decoded: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

impl IntegrationError {
    pub fn http(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| IntegrationError::Http { provider, source }
    }

    pub fn decode(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |e| IntegrationError::Decode { provider, message: e.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Database(err) => {
                error!("Internal error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Integration(err) => {
                warn!("Integration failure: {}", err);
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string()),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
