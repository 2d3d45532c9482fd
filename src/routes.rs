//! Request dispatch: `/ping`, `/upload`, static GETs, and everything else.

use axum::Router;
use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use chrono::Local;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::access::{self, AccessLog};
use crate::auth;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::mounts::MountTable;
use crate::static_files::serve_static;
use crate::upload;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf8";

/// Assembles the application. Auth runs before dispatch, access logging after.
pub fn build_router(
    config: Arc<ServerConfig>,
    mounts: Arc<MountTable>,
    access: Arc<AccessLog>,
) -> Router {
    let mut app = Router::new().route("/ping", post(ping).fallback(dispatch));
    if config.enable_upload {
        let body_limit = match config.body_limit() {
            Some(limit) => DefaultBodyLimit::max(limit),
            None => DefaultBodyLimit::disable(),
        };
        app = app.route(
            "/upload",
            post(upload::upload_files)
                .layer(body_limit)
                .fallback(dispatch),
        );
    }

    let mut app = app
        .fallback(dispatch)
        .layer(middleware::from_fn(access::log_access))
        .layer(middleware::from_fn(auth::require_basic_auth))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = access::client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        );
    if config.compress {
        app = app.layer(CompressionLayer::new());
    }

    app.layer(Extension(config))
        .layer(Extension(mounts))
        .layer(Extension(access))
}

#[derive(Serialize)]
struct Pong {
    message: &'static str,
    time: String,
}

/// `POST /ping`: liveness echo with the server time.
async fn ping() -> Result<Response, ApiError> {
    let body = serde_json::to_string(&Pong {
        message: "pong",
        time: Local::now().format("%Y-%m-%d %H:%M:%S%.f %:z").to_string(),
    })
    .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
        body,
    )
        .into_response())
}

/// Everything not claimed by a route: GET is static content, other POSTs are
/// bad requests, any other method is not found.
async fn dispatch(
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(mounts): Extension<Arc<MountTable>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match method {
        Method::GET => serve_static(&config, &mounts, &uri, &headers)
            .await
            .into_response(),
        Method::POST => (StatusCode::BAD_REQUEST, "Bad Request").into_response(),
        _ => ApiError::not_found().into_response(),
    }
}

/// Make-service helper shared by the plain and TLS listeners.
pub fn into_service(app: Router) -> IntoMakeServiceWithConnectInfo<Router, SocketAddr> {
    app.into_make_service_with_connect_info::<SocketAddr>()
}
