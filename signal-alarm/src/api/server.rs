//! Router assembly and the listener task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::v0;
use crate::engine::EngineHandle;
use crate::error::Result;
use crate::store::SignalSource;
use crate::tracing::prelude::*;

#[derive(OpenApi)]
#[openapi(info(
    title = "signal-alarm",
    description = "Control API for the signal alarm daemon"
))]
struct ApiDoc;

/// State shared by all handlers.
#[derive(Clone)]
pub struct SharedState {
    pub engine: EngineHandle,
    pub source: Arc<dyn SignalSource>,
    /// Whether a custom alarm sound was loaded at startup.
    pub custom_sound: bool,
}

/// Build the full router: versioned API, OpenAPI document and Swagger UI.
pub fn router(state: SharedState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until `cancellation` fires.
pub async fn serve(
    addr: SocketAddr,
    state: SharedState,
    cancellation: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancellation.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}
