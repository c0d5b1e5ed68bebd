use std::time::Duration;

use tracing::{error, info};
use tokio_postgres_rustls::MakeRustlsConnect;
use deadpool_postgres::{
    Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod, Runtime, Timeouts,
};

use crate::utils::{
    config::Config,
    error::{ApiError, Result},
};

pub type DbPool = Pool;

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_accounts.sql", include_str!("../../../migrations/0001_accounts.sql")),
    ("0002_catalog.sql", include_str!("../../../migrations/0002_catalog.sql")),
    ("0003_events.sql", include_str!("../../../migrations/0003_events.sql")),
    ("0004_knowledge_base.sql", include_str!("../../../migrations/0004_knowledge_base.sql")),
    (
        "0005_knowledge_base_dedupe.sql",
        include_str!("../../../migrations/0005_knowledge_base_dedupe.sql"),
    ),
];

/// Builds the pool without opening a connection; the first checkout connects.
pub fn create_pool(config: &Config) -> Result<DbPool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(config.database_url.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Verified,
    });

    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: config.max_db_connections.max(1) as usize,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(10)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(10)),
        },
        ..Default::default()
    });

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls_connector = MakeRustlsConnect::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );

    cfg.create_pool(Some(Runtime::Tokio1), tls_connector)
        .map_err(|e| ApiError::Database(format!("Failed to create database pool: {}", e)))
}

pub async fn ping(pool: &DbPool) -> Result<()> {
    let client = pool.get().await?;
    client.simple_query("SELECT 1").await?;
    Ok(())
}

pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut client = pool.get().await?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS __migrations (
            filename TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ DEFAULT NOW()
        )",
        )
        .await
        .map_err(|e| ApiError::Database(format!("Failed to create migrations table: {e}")))?;

    for (name, sql) in MIGRATIONS {
        let applied = client
            .query_opt("SELECT 1 FROM __migrations WHERE filename = $1", &[name])
            .await?
            .is_some();
        if applied {
            continue;
        }

        info!("Applying migration {}", name);
        let tx = client.transaction().await?;
        if let Err(e) = tx.batch_execute(sql).await {
            error!("Migration {} failed: {}", name, e);
            return Err(ApiError::Database(format!("Migration {name} failed: {e}")));
        }
        tx.execute("INSERT INTO __migrations (filename) VALUES ($1)", &[name])
            .await?;
        tx.commit().await?;
    }

    info!("Database schema is up to date ({} migrations)", MIGRATIONS.len());
    Ok(())
}
