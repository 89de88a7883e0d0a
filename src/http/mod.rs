//! HTTP surface for posts.
//!
//! Thin axum glue over [`PostService`]: multipart parsing on the way in,
//! [`PostResource`](crate::services::PostResource) JSON on the way out.

mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::ServiceError;
use crate::services::PostService;

/// Shared handler state.
pub type AppState = Arc<PostService>;

/// Build the post routes.
pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/posts", get(handlers::index).post(handlers::create))
        .route(
            "/posts/:id",
            get(handlers::show)
                .post(handlers::update)
                .put(handlers::update)
                .delete(handlers::destroy),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the router until Ctrl+C.
pub async fn serve(addr: &str, service: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Storage(_)
            | ServiceError::AssetDeletion { .. }
            | ServiceError::Asset(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if !self.is_client_error() {
            error!(error = %self, "Request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
