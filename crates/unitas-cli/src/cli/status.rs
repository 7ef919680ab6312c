//! Effective configuration and live pool status.

use anyhow::Result;
use unitas_infra::sqlite::ConnectionUrl;
use unitas_types::config::UnitasConfig;

use super::open_pool;

/// Display the effective configuration, connecting to report pool status.
pub async fn status(config: &UnitasConfig, json: bool) -> Result<()> {
    let db = &config.database;
    let url = ConnectionUrl::parse(&db.url)?;
    let pool_status = match open_pool(db).await {
        Ok(pool) => {
            let status = pool.status();
            pool.dispose().await;
            Some(status)
        }
        Err(err) => {
            tracing::warn!("Could not connect to {}: {err}", url.redacted());
            None
        }
    };

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "database": {
                "url": url.redacted(),
                "dialect": url.dialect(),
                "database": url.database(),
                "pool_size": db.pool_size,
                "max_overflow": db.max_overflow,
                "max_connections": db.max_connections(),
                "acquire_timeout_secs": db.acquire_timeout_secs,
                "echo": db.echo,
            },
            "pool": pool_status,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!("  Unitas v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  ── Database ──");
    println!("  URL:          {}", url.redacted());
    println!("  Dialect:      {}", url.dialect());
    println!("  Database:     {}", url.database());
    println!(
        "  Pool:         {} warm, {} overflow ({} max)",
        db.pool_size,
        db.max_overflow,
        db.max_connections()
    );
    println!("  Echo:         {}", if db.echo { "on" } else { "off" });
    println!();
    println!("  ── Pool ──");
    match pool_status {
        Some(status) => println!(
            "  Connected:    {} open, {} idle",
            status.size, status.idle
        ),
        None => println!("  Connected:    no"),
    }
    println!();
    Ok(())
}
