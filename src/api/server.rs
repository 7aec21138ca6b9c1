//! HTTP server implementation

use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::capabilities::Capabilities;
use crate::capabilities::Collaborators;
use crate::config::AppConfig;
use crate::Result;

/// Full application router with middleware
pub fn app(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .nest("/api", routes::api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        info!("✅ CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Start the API server
pub async fn serve_api(config: &AppConfig, host: String, port: u16, enable_cors: bool) -> Result<()> {
    info!("🚀 Starting docrag API server...");

    let capabilities = Capabilities::resolve(config);
    let collaborators = Collaborators::build(config, &capabilities).await?;
    let state = AppState::new(config, capabilities, collaborators);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    info!("🌐 API server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /api/health          - Health check");
    info!("  POST /api/query           - Answer a question with ranked images");
    info!("  POST /api/index/document  - Index a processed document");
    info!("  POST /api/ingest          - Extract, save and index an upload or step event");
    info!("  POST /api/knowledge-base/init - Store knowledge base identifiers");

    serve_on(listener, state, enable_cors).await
}

/// Serve on an already-bound listener
pub async fn serve_on(listener: TcpListener, state: AppState, enable_cors: bool) -> Result<()> {
    axum::serve(listener, app(state, enable_cors)).await?;
    Ok(())
}
