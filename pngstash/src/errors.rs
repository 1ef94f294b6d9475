use crate::ingest::{IngestError, IngestErrorKind};
use axum::{
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or wrong basic-auth credentials
    #[error("Not authenticated")]
    Unauthenticated { realm: String },

    /// Invalid request data that never reached the ingestor (e.g. malformed JSON)
    #[error("{message}")]
    BadRequest { message: String },

    /// The ingest endpoint only accepts POST
    #[error("{method} not allowed")]
    MethodNotAllowed { method: Method },

    /// Classified failure from the ingestion pipeline
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::Ingest(e) => match e.kind() {
                IngestErrorKind::BadInput | IngestErrorKind::UnsupportedType => StatusCode::BAD_REQUEST,
                IngestErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { .. } => "Authentication required".to_string(),
            Error::BadRequest { message } => message.clone(),
            Error::MethodNotAllowed { method } => format!("{method} not allowed"),
            Error::Ingest(e) => match e.kind() {
                IngestErrorKind::BadInput => "Bad request".to_string(),
                IngestErrorKind::UnsupportedType => "Unsupported image type".to_string(),
                IngestErrorKind::StorageFailure => "Internal server error".to_string(),
            },
            Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Ingest(e) if e.kind() == IngestErrorKind::StorageFailure => {
                tracing::error!("Storage failure: {}", e);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::MethodNotAllowed { .. } | Error::Ingest(_) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let mut response = (status, self.user_message()).into_response();

        match &self {
            Error::Unauthenticated { realm } => {
                if let Ok(challenge) = HeaderValue::from_str(&format!("Basic realm=\"{realm}\"")) {
                    response.headers_mut().insert(header::WWW_AUTHENTICATE, challenge);
                }
            }
            Error::MethodNotAllowed { .. } => {
                response.headers_mut().insert(header::ALLOW, HeaderValue::from_static("POST"));
            }
            _ => {}
        }

        response
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
