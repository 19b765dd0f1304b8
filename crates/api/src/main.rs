use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use epro_api::app::{AppServices, build_app};
use epro_infra::{AppConfig, InMemoryProcurementStore, LocalFileStore, PostgresProcurementStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    epro_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let files = Arc::new(LocalFileStore::new(&config.attachment_root));

    let services = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            let store = PostgresProcurementStore::new(pool);
            store.migrate().await.context("failed to apply schema")?;
            AppServices::new(Arc::new(store), files)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on exit)");
            AppServices::new(Arc::new(InMemoryProcurementStore::new()), files)
        }
    };

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        attachment_root = %config.attachment_root.display(),
        "listening"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
