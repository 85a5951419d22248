pub mod health;
pub mod posts;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The complete HTTP surface.
pub fn app(state: AppState) -> Router {
    let max_upload = state.config.uploads.max_bytes;

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/users", users::router())
        .nest("/api/posts", posts::router())
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
