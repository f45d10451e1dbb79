use crate::body::ExtractError;
use crate::names::NameError;
use crate::store::StoreError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Content-Length {length} exceeds maximum upload size of {max} bytes")]
    OversizeInput { length: u64, max: usize },

    #[error("missing or invalid Content-Length")]
    MissingContentLength,

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Malformed multipart body: {0}")]
    MalformedMultipart(&'static str),

    #[error("Malformed form body: {0}")]
    MalformedForm(String),

    #[error("empty data")]
    EmptyPayload,

    #[error("Name space exhausted")]
    NameSpaceExhausted,

    #[error("Name already taken: {0}")]
    StorageCollision(String),

    /// Unknown and empty blobs share this error so existence is not revealed
    #[error("empty data")]
    NotFound,

    #[error("invalid file name")]
    InvalidName,

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedContentType(ct) => AppError::UnsupportedContentType(ct),
            ExtractError::MalformedMultipart(why) => AppError::MalformedMultipart(why),
            ExtractError::MalformedForm(why) => AppError::MalformedForm(why),
            ExtractError::MissingField(field) => {
                AppError::MalformedForm(format!("missing field `{}`", field))
            }
            ExtractError::Io(e) => AppError::BodyRead(e.to_string()),
        }
    }
}

impl From<NameError> for AppError {
    fn from(e: NameError) -> Self {
        match e {
            NameError::Exhausted { .. } => AppError::NameSpaceExhausted,
            NameError::InvalidBounds { .. } => AppError::Internal(e.into()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Collision(name) => AppError::StorageCollision(name),
            StoreError::InvalidName => AppError::InvalidName,
            StoreError::Io(e) => AppError::Io(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::OversizeInput { .. }
            | AppError::MissingContentLength
            | AppError::MalformedMultipart(_)
            | AppError::MalformedForm(_)
            | AppError::EmptyPayload
            | AppError::NotFound
            | AppError::InvalidName
            | AppError::BodyRead(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedContentType(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NameSpaceExhausted => {
                tracing::error!("Name space exhausted: every name length is taken");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::StorageCollision(name) => {
                tracing::error!("Storage collision on freshly allocated name {}", name);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            AppError::Io(_) => "Storage error".to_string(),
            AppError::StorageCollision(_) => "Storage error".to_string(),
            other => other.to_string(),
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\r\n", message),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
