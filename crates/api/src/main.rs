//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use cache::{CacheStore, InMemoryCache};
use checkout::{LockService, NoopLockService, PostgresLockService};
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve(app: axum::Router, config: &Config) {
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());

    // 3. Pick collaborators: PostgreSQL when configured, in-memory otherwise
    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&url)
                .await
                .expect("failed to connect to database");

            let store = PostgresStore::new(pool.clone());
            store.run_migrations().await.expect("migrations failed");
            tracing::info!(
                max_connections = config.max_connections,
                "database connection established"
            );

            // A lock backend that cannot be reached disables distributed
            // locking for the lifetime of the process; sale creation then
            // relies on the transactional retry path.
            let locks: Arc<dyn LockService> = match PostgresLockService::connect(pool).await {
                Ok(locks) => {
                    tracing::info!("distributed product locks enabled");
                    Arc::new(locks)
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "lock backend unavailable; continuing without distributed locks"
                    );
                    Arc::new(NoopLockService)
                }
            };

            let state = api::create_state(store, locks, cache);
            serve(api::create_app(state, metrics_handle), &config).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            let state = api::create_default_state(InMemoryStore::new());
            serve(api::create_app(state, metrics_handle), &config).await;
        }
    }
}
