use crate::body;
use crate::config::Config;
use crate::constants::{DOWNLOAD_CHUNK_SIZE, STORE_COLLISION_RETRIES};
use crate::error::{AppError, Result};
use crate::names::{is_valid_name, NameAllocator};
use crate::store::{BlobStore, StoreError};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::PathRejection, ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn BlobStore>,
    pub names: NameAllocator,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn BlobStore>) -> anyhow::Result<Self> {
        let names = NameAllocator::new(config.name_min_length, config.name_max_length)?;
        Ok(Self {
            config: Arc::new(config),
            store,
            names,
        })
    }

    /// `<scheme>://<host>/<name>` for a freshly stored blob.
    fn blob_url(&self, headers: &HeaderMap, name: &str) -> String {
        let host = match &self.config.public_host {
            Some(host) => host.clone(),
            None => headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| self.config.socket_addr().to_string()),
        };
        format!("{}://{}/{}", self.config.scheme, host, name)
    }
}

/// Upload form
pub async fn index() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_LENGTH, INDEX_HTML.len().to_string()),
        ],
        INDEX_HTML,
    )
}

/// Store the payload of a form submission and answer with its URL
pub async fn upload(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    request_body: Body,
) -> Result<Response> {
    // Validate Content-Length before reading any of the body
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or(AppError::MissingContentLength)?;

    if length > state.config.max_payload_size as u64 {
        return Err(AppError::OversizeInput {
            length,
            max: state.config.max_payload_size,
        });
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let raw = axum::body::to_bytes(request_body, length as usize)
        .await
        .map_err(|e| AppError::BodyRead(e.to_string()))?;

    let data = body::extract(raw.as_ref(), length, content_type)?;
    if data.is_empty() {
        return Err(AppError::EmptyPayload);
    }

    let size = data.len();
    let store = state.store.clone();
    let names = state.names;
    let name = tokio::task::spawn_blocking(move || store_new_blob(store.as_ref(), &names, &data))
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    match client {
        Some(ConnectInfo(addr)) => tracing::info!("client {} - stored {} ({} bytes)", addr, name, size),
        None => tracing::info!("Stored {} ({} bytes)", name, size),
    }

    let url = state.blob_url(&headers, &name);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{}\r\n", url),
    )
        .into_response())
}

/// Allocate a free name and write `data` under it.
///
/// A concurrent upload can take the allocated name between the existence
/// check and the create-only write; that case gets a fresh allocation.
fn store_new_blob(store: &dyn BlobStore, names: &NameAllocator, data: &[u8]) -> Result<String> {
    let mut retries_left = STORE_COLLISION_RETRIES;
    loop {
        let name = names.allocate(|candidate| store.exists(candidate))?;
        match store.write(&name, data) {
            Ok(()) => return Ok(name),
            Err(StoreError::Collision(taken)) if retries_left > 0 => {
                tracing::warn!("Name {} was taken before it could be written, reallocating", taken);
                retries_left -= 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Raw blob contents
pub async fn download(
    State(state): State<AppState>,
    name: std::result::Result<Path<String>, PathRejection>,
) -> Result<Response> {
    // A segment that does not percent-decode to UTF-8 is just another bad name
    let Ok(Path(name)) = name else {
        return Err(AppError::InvalidName);
    };

    if !is_valid_name(&name) {
        tracing::debug!("Rejecting invalid name {:?}", name);
        return Err(AppError::InvalidName);
    }

    let store = state.store.clone();
    let lookup = name.clone();
    let data = tokio::task::spawn_blocking(move || store.read(&lookup))
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    if data.is_empty() {
        return Err(AppError::NotFound);
    }

    let content_type = if std::str::from_utf8(&data).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    };

    let len = data.len();
    tracing::debug!("Serving {} ({} bytes)", name, len);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .body(chunked_body(Bytes::from(data)))
        .map_err(|e| AppError::Internal(e.into()))
}

/// Split `data` into frames of at most [`DOWNLOAD_CHUNK_SIZE`] bytes.
fn chunked_body(data: Bytes) -> Body {
    let len = data.len();
    let chunks = (0..len).step_by(DOWNLOAD_CHUNK_SIZE).map(move |start| {
        let end = (start + DOWNLOAD_CHUNK_SIZE).min(len);
        Ok::<_, Infallible>(data.slice(start..end))
    });
    Body::from_stream(futures_util::stream::iter(chunks))
}

/// Any path that is not `/` or a single segment
pub async fn invalid_path(uri: Uri) -> AppError {
    tracing::debug!("Rejecting path {}", uri.path());
    AppError::InvalidName
}
