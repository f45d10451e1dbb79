//! Routing and the connection accept loop.

use crate::config::Config;
use crate::handlers::{self, AppState};
use crate::middleware::security_headers;
use crate::privileges;
use crate::tls;
use axum::{
    extract::ConnectInfo,
    http::Request,
    middleware,
    routing::get,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_io_timeout::TimeoutStream;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::trace::TraceLayer;

/// Routes, optional per-IP rate limiting, tracing and security headers.
///
/// Security headers are applied outermost so responses produced by the other
/// layers (429 from the rate limiter) carry them too.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();

    let app = Router::new()
        .route("/", get(handlers::index).post(handlers::upload))
        .route("/:name", get(handlers::download))
        .fallback(handlers::invalid_path)
        .with_state(state);

    Ok(with_rate_limit(app, &config)?
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers)))
}

/// Per-IP rate limiting, when configured.
fn with_rate_limit(app: Router, config: &Config) -> anyhow::Result<Router> {
    let Some(per_second) = config.rate_limit_per_second else {
        return Ok(app);
    };

    let rate_limit_config = GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(config.rate_limit_burst)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Failed to build rate limit config"))?;

    tracing::info!(
        "Rate limiting to {} requests per second per IP (burst {})",
        per_second,
        config.rate_limit_burst
    );

    Ok(app.layer(GovernorLayer {
        config: Arc::new(rate_limit_config),
    }))
}

/// Bind, optionally drop privileges, and serve connections until Ctrl-C.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let config = state.config.clone();

    let acceptor = if config.tls_enabled() {
        let (cert, key) = config
            .tls_cert_path
            .as_deref()
            .zip(config.tls_key_path.as_deref())
            .ok_or_else(|| anyhow::anyhow!("TLS enabled without certificate and key paths"))?;
        Some(TlsAcceptor::from(tls::load_server_config(cert, key)?))
    } else {
        None
    };

    let app = router(state)?;

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;

    if let Some(user) = &config.run_as_user {
        privileges::drop_to_user(user, &config.data_dir)?;
    }

    tracing::info!(
        "Listening on {} ({}), URLs use {}://",
        addr,
        if acceptor.is_some() { "TLS" } else { "plain HTTP" },
        config.scheme
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("Stopping server...");
                break;
            }
        };

        tokio::spawn(handle_connection(
            stream,
            remote_addr,
            app.clone(),
            acceptor.clone(),
            config.io_timeout,
        ));
    }

    Ok(())
}

/// Serve one accepted connection, over TLS when an acceptor is given.
///
/// Socket reads and writes each fail once they make no progress for
/// `io_timeout`; there is no deadline on a whole request.
pub async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    app: Router,
    acceptor: Option<TlsAcceptor>,
    io_timeout: Duration,
) {
    let mut stream = TimeoutStream::new(stream);
    stream.set_read_timeout(Some(io_timeout));
    stream.set_write_timeout(Some(io_timeout));
    let stream = Box::pin(stream);

    match acceptor {
        Some(acceptor) => match tokio::time::timeout(io_timeout, acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => serve_connection(tls_stream, app, remote_addr, io_timeout).await,
            Ok(Err(e)) => tracing::debug!("client {} - TLS handshake failed: {}", remote_addr, e),
            Err(_) => tracing::debug!("client {} - TLS handshake timed out", remote_addr),
        },
        None => serve_connection(stream, app, remote_addr, io_timeout).await,
    }
}

/// Serve HTTP/1 requests on one connection until the client goes away.
async fn serve_connection<I>(io: I, app: Router, remote_addr: SocketAddr, io_timeout: Duration)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = app.map_request(move |mut request: Request<Incoming>| -> Request<Incoming> {
        request.extensions_mut().insert(ConnectInfo(remote_addr));
        request
    });

    if let Err(err) = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(io_timeout)
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(service))
        .await
    {
        tracing::debug!("client {} - connection closed: {}", remote_addr, err);
    }
}
