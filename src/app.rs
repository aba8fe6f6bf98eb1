//! Router assembly: routes, auth gate, body limit and request tracing.

use axum::Router;
use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::middleware;
use axum::routing::get;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::auth::{self, AuthConfig};
use crate::config::MAX_UPLOAD_SIZE;
use crate::files;
use crate::frontend;
use crate::http::{method_not_allowed, resolve_client_ip};
use crate::images::ImageStore;
use crate::storage::BlobStore;
use crate::upload;

/// Builds the full application router.
pub fn build_router(
    auth_config: Arc<AuthConfig>,
    blobs: Arc<dyn BlobStore>,
    images: Arc<dyn ImageStore>,
    static_dir: &Path,
) -> Router {
    let file_routes = get(files::list_images)
        .post(upload::upload_image)
        .fallback(method_not_allowed)
        .layer::<_, std::convert::Infallible>(middleware::from_fn(auth::auth_gate))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE));

    Router::new()
        .route("/file", file_routes)
        .route(
            "/token",
            get(auth::get_token).fallback(method_not_allowed),
        )
        .fallback_service(frontend::static_assets(static_dir))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(auth_config))
        .layer(Extension(blobs))
        .layer(Extension(images))
}
