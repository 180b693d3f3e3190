use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};

use index_analytics::app;
use index_analytics::config::{AppConfig, DataSource, IndexConstruction};
use index_analytics::logging::{self, LoggingConfig};
use index_analytics::services::csv_import_service;
use index_analytics::services::query_cache::QueryCache;
use index_analytics::state::AppState;
use index_analytics::store::{
    ConstituentStore, InMemoryConstituentStore, IndexDataset, PgConstituentStore,
};

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    logging::init_logging(LoggingConfig::from_env())?;

    let config = AppConfig::from_env().map_err(|e| anyhow!(e))?;

    let cache = QueryCache::new(config.cache_enabled, config.cache_ttl_seconds);

    let store: Arc<dyn ConstituentStore> = match config.data_source {
        DataSource::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres data source")?;

            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .context("Failed to connect to Postgres")?;

            if config.run_migrations {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run migrations")?;
                info!("✓ Migrations applied");
            }

            if config.index_construction != IndexConstruction::Snapshots {
                warn!("INDEX_CONSTRUCTION only applies to CSV data; using stored snapshots");
            }
            info!("📊 Using data source: Postgres");
            Arc::new(PgConstituentStore::new(pool))
        }
        DataSource::Csv => {
            let store = InMemoryConstituentStore::new(IndexDataset::default());
            let result = csv_import_service::import_into(
                &store,
                &cache,
                &config.data_dir,
                config.index_construction,
            )?;
            info!(
                "📊 Using data source: CSV files in {:?} ({} observations, {} snapshots, {:?})",
                config.data_dir, result.observations, result.snapshots, result.origin
            );
            Arc::new(store)
        }
    };

    spawn_cache_sweeper(cache.clone());

    let state = AppState {
        store,
        cache,
        export_timeout: config.export_timeout,
    };
    let app = app::create_app(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🚀 Index analytics backend running at http://{}/", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn spawn_cache_sweeper(cache: QueryCache) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            cache.cleanup_expired();
        }
    });
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
