mod auth;
mod config;
mod middleware;

mod db;
mod error;
mod models;
mod queue;
mod routes;

use std::sync::Arc;

use crate::{
    config::Config,
    models::AppState,
    queue::{PgQueueStore, QueueService, SystemClock},
};

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use axum::http::header;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::from_env()?;
    let pool = db::connect_pg(&cfg.database_url, cfg.db_max_connections).await?;

    // one adapter serves both the queue table and the patient/doctor lookups
    let store = Arc::new(PgQueueStore::new(pool.clone()));
    let queue = QueueService::new(
        store.clone(),
        store,
        Arc::new(SystemClock),
        cfg.queue_numbering,
    );
    tracing::info!(numbering = %queue.numbering(), "walk-in queue ready");

    let state = AppState {
        db: pool,
        session_ttl_hours: cfg.session_ttl_hours,
        queue: Arc::new(queue),
    };

    // The dashboard is served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
