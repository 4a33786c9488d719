mod logging;

use axum::{Json, Router, routing::get};
use pmoslideshow::{
    ApiDoc, HttpImageValidator, PlaylistManager, SlideshowConfigExt, SqliteStore,
    slideshow_api_router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = pmoconfig::get_config()?;
    let _log_handle = logging::init_logging(&config);

    // ========== Stockage et validation ==========
    let db_path = config.slideshow_db_path()?;
    info!("🗄️ Opening slideshow database {}", db_path.display());
    let store = Arc::new(SqliteStore::open(&db_path)?);

    let validator = Arc::new(HttpImageValidator::new(config.validator_options()?)?);
    let options = config.manager_options()?;
    info!(
        "Validation deadline {:?}, lock timeout {:?}, max batch {}",
        options.validation_timeout, options.lock_timeout, options.max_batch_size
    );
    let manager = PlaylistManager::new(store, validator, options);

    // ========== Routes HTTP ==========
    let app = Router::new()
        .merge(slideshow_api_router(manager))
        .route(
            "/info",
            get(|| async { Json(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })) }),
        )
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );

    let ip: std::net::IpAddr = config.get_bind_address().parse()?;
    let addr = SocketAddr::new(ip, config.get_http_port());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✅ PMOSlideshow running at http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Ctrl+C reçu, arrêt gracieux");
        })
        .await?;

    Ok(())
}
