//! Purpose: Provide the HTTP/JSON server for genbog.
//! Exports: `ServeConfig`, `serve`, `router`, `validate_config`.
//! Role: Axum routes over `api::Library` plus the error-to-response mapping.
//! Invariants: Every failure becomes a JSON response; nothing escapes as a bare crash.
//! Invariants: ISBN validation failures are 400 `{error, isbn}`; HTTP faults are `{code, name, description}`.
//! Invariants: Loopback-only unless explicitly allowed.

use std::any::Any;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{DefaultBodyLimit, Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use genbog::api::{Error, ErrorKind, Library};

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

const NOT_FOUND_DESCRIPTION: &str = "The requested URL was not found on the server. If you entered the URL manually please check your spelling and try again.";
const METHOD_NOT_ALLOWED_DESCRIPTION: &str = "The method is not allowed for the requested URL.";
const PANIC_MESSAGE: &str = "An internal server error occurred";

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub max_body_bytes: u64,
    pub allow_non_loopback: bool,
}

#[derive(Clone)]
struct AppState {
    library: Library,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    let max_body_bytes = validate_config(&config)?;

    init_tracing();

    let app = router(Library::new(), max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    let local_addr = listener.local_addr().unwrap_or(config.bind);
    tracing::info!(addr = %local_addr, "genbog listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    tracing::info!("genbog stopped");
    Ok(())
}

/// Builds the full route table over `library`.
pub fn router(library: Library, max_body_bytes: usize) -> Router {
    let state = Arc::new(AppState { library });

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/books",
            get(list_books)
                .post(add_books)
                .fallback(|| async { method_not_allowed() }),
        )
        .route(
            "/books/:isbn",
            get(get_book)
                .post(add_book)
                .delete(remove_book)
                .fallback(|| async { method_not_allowed() }),
        )
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

/// Checks `config` and returns the body limit as a platform size.
pub fn validate_config(config: &ServeConfig) -> Result<usize, Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    config.max_body_bytes.try_into().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory.")
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Serialize)]
struct ValidationBody<'a> {
    error: &'a str,
    isbn: &'a str,
}

#[derive(Debug, Serialize)]
struct HttpFaultBody<'a> {
    code: u16,
    name: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct InternalErrorBody<'a> {
    error: &'a str,
}

async fn healthz() -> Response {
    json_response(&json!({ "ok": true }))
}

async fn get_book(
    State(state): State<Arc<AppState>>,
    isbn: Result<AxumPath<String>, PathRejection>,
) -> Response {
    let isbn = match path_isbn(isbn) {
        Ok(isbn) => isbn,
        Err(err) => return error_response(err),
    };
    match state.library.get_book(&isbn) {
        Ok(book) => json_response(&book),
        Err(err) => error_response(err),
    }
}

async fn add_book(
    State(state): State<Arc<AppState>>,
    isbn: Result<AxumPath<String>, PathRejection>,
) -> Response {
    let isbn = match path_isbn(isbn) {
        Ok(isbn) => isbn,
        Err(err) => return error_response(err),
    };
    match state.library.add_book(&isbn) {
        Ok(book) => json_response(&book),
        Err(err) => error_response(err),
    }
}

async fn remove_book(
    State(state): State<Arc<AppState>>,
    isbn: Result<AxumPath<String>, PathRejection>,
) -> Response {
    let isbn = match path_isbn(isbn) {
        Ok(isbn) => isbn,
        Err(err) => return error_response(err),
    };
    match state.library.remove_book(&isbn) {
        Ok(book) => json_response(&book),
        Err(err) => error_response(err),
    }
}

async fn list_books(State(state): State<Arc<AppState>>) -> Response {
    match state.library.list_books() {
        Ok(books) => json_response(&books),
        Err(err) => error_response(err),
    }
}

async fn add_books(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let payload = match batch_payload(&headers, body) {
        Ok(payload) => payload,
        Err(err) => return error_response(err),
    };
    match state.library.add_books(&payload) {
        Ok(books) => json_response(&books),
        Err(err) => error_response(err),
    }
}

async fn not_found() -> Response {
    error_response(Error::new(ErrorKind::NotFound).with_message(NOT_FOUND_DESCRIPTION))
}

fn method_not_allowed() -> Response {
    error_response(
        Error::new(ErrorKind::MethodNotAllowed).with_message(METHOD_NOT_ALLOWED_DESCRIPTION),
    )
}

fn handle_panic(_panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("request handler panicked");
    error_response(Error::new(ErrorKind::Internal).with_message(PANIC_MESSAGE))
}

fn path_isbn(isbn: Result<AxumPath<String>, PathRejection>) -> Result<String, Error> {
    match isbn {
        Ok(AxumPath(isbn)) => Ok(isbn),
        Err(rejection) => Err(Error::new(ErrorKind::MalformedRequest)
            .with_status(rejection.status().as_u16())
            .with_message(rejection.body_text())),
    }
}

fn batch_payload(headers: &HeaderMap, body: Result<Bytes, BytesRejection>) -> Result<Value, Error> {
    if !is_json_content_type(headers) {
        return Err(Error::new(ErrorKind::MalformedRequest)
            .with_status(StatusCode::UNSUPPORTED_MEDIA_TYPE.as_u16())
            .with_message("Did not attempt to load JSON data because the request Content-Type was not 'application/json'."));
    }
    let body = body.map_err(|rejection| {
        Error::new(ErrorKind::MalformedRequest)
            .with_status(rejection.status().as_u16())
            .with_message(rejection.body_text())
    })?;
    serde_json::from_slice(&body).map_err(|err| {
        Error::new(ErrorKind::MalformedRequest)
            .with_status(StatusCode::BAD_REQUEST.as_u16())
            .with_message(format!("Failed to decode JSON object: {err}"))
            .with_source(err)
    })
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(header::CONTENT_TYPE) else {
        return false;
    };
    let Ok(value) = value.to_str() else {
        return false;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn json_response<T: Serialize>(payload: &T) -> Response {
    Json(payload).into_response()
}

fn error_response(err: Error) -> Response {
    match err.kind() {
        ErrorKind::InvalidIsbn => {
            let message = err.message().unwrap_or("invalid ISBN");
            let body = ValidationBody {
                error: message,
                isbn: err.isbn().unwrap_or_default(),
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
        ErrorKind::MalformedRequest => {
            let status = err
                .status()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::BAD_REQUEST);
            http_fault_response(status, &err)
        }
        ErrorKind::NotFound => http_fault_response(StatusCode::NOT_FOUND, &err),
        ErrorKind::MethodNotAllowed => http_fault_response(StatusCode::METHOD_NOT_ALLOWED, &err),
        ErrorKind::Internal | ErrorKind::Io | ErrorKind::Usage => {
            tracing::error!(error = %err, "request failed");
            let body = InternalErrorBody {
                error: err.message().unwrap_or(PANIC_MESSAGE),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn http_fault_response(status: StatusCode, err: &Error) -> Response {
    let body = HttpFaultBody {
        code: status.as_u16(),
        name: status.canonical_reason().unwrap_or("Unknown"),
        description: err.message().unwrap_or_default(),
    };
    (status, Json(body)).into_response()
}
