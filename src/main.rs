use std::sync::Arc;

use fieldops_api::config;
use fieldops_api::server;
use fieldops_api::state::AppState;
use fieldops_api::store::{Datastore, MemoryStore, PostgresStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldops_api=debug,tower_http=debug".into()),
        )
        .init();

    let cfg = config::config();
    tracing::info!("environment: {:?}", cfg.environment);

    let datastore: Arc<dyn Datastore> = if std::env::var("DATABASE_URL").is_ok() {
        match PostgresStore::connect().await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!("failed to connect to database: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        tracing::warn!("DATABASE_URL not set, using the in-memory datastore");
        Arc::new(MemoryStore::new())
    };

    let app = server::app(AppState::new(datastore));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
