//! Connectivity check: one read-only unit of work against the configured store.

use std::time::Instant;

use anyhow::Result;
use unitas_core::repository::RepositoryRegistry;
use unitas_core::scope::ScopeMode;
use unitas_core::statement::Statement;
use unitas_infra::sqlite::UnitOfWork;
use unitas_types::config::DatabaseConfig;
use unitas_types::error::DataError;

use super::open_pool;

/// Run the check and return its report.
pub async fn run(config: &DatabaseConfig) -> Result<serde_json::Value> {
    let started = Instant::now();
    let pool = open_pool(config).await?;
    let uow = UnitOfWork::new(pool, RepositoryRegistry::new());

    let outcome = uow
        .atomic(ScopeMode::ReadOnly, |session| async move {
            let rows = session
                .fetch_all(&Statement::new("SELECT sqlite_version() AS version"))
                .await?;
            Ok::<_, DataError>(
                rows.into_iter()
                    .next()
                    .and_then(|row| row.get("version").cloned()),
            )
        })
        .await;

    let status = uow.pool().status();
    let url = uow.pool().url().redacted().to_string();
    uow.dispose().await;

    let version = outcome?;
    tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "check passed");
    Ok(serde_json::json!({
        "url": url,
        "healthy": true,
        "sqlite_version": version,
        "pool": status,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    }))
}

/// Run the check and print its report.
pub async fn check(config: &DatabaseConfig, json: bool, quiet: bool) -> Result<()> {
    let report = run(config).await?;
    if quiet {
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  Database check: ok");
    println!("  URL:            {}", report["url"].as_str().unwrap_or_default());
    if let Some(version) = report["sqlite_version"].as_str() {
        println!("  SQLite:         {version}");
    }
    println!("  Elapsed:        {} ms", report["elapsed_ms"]);
    println!();
    Ok(())
}
