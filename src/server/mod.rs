pub mod api;
pub mod handlers;
pub mod state;

use axum::{routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::server::state::AppState;

/// API routes, without static file serving
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/generate", get(handlers::generate_chart_json))
        .route("/generate.png", get(handlers::generate_chart_png))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

pub async fn run_server(
    state: AppState,
    host: String,
    port: u16,
    static_dir: Option<String>,
) -> anyhow::Result<()> {
    let mut app = router(Arc::new(state));

    // Optional front end with SPA fallback
    if let Some(static_dir) = &static_dir {
        let static_path = PathBuf::from(static_dir);
        let index_path = static_path.join("index.html");
        let serve_dir =
            ServeDir::new(&static_path).not_found_service(ServeFile::new(&index_path));
        app = app.fallback_service(serve_dir);
        tracing::info!("Serving static files from: {}", static_dir);
    }

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Server listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;

    Ok(())
}
