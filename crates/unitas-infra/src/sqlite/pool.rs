//! Connection pool adapter over a bounded SQLite pool in WAL mode.
//!
//! The pool keeps `pool_size` connections open and may grow by
//! `max_overflow`. Sessions are the only consumers: every session leases one
//! connection for its whole lifetime and returns it on close.

use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use unitas_types::config::DatabaseConfig;
use unitas_types::error::{DataError, DataResult};

use super::session::{Session, SessionKind};
use super::url::ConnectionUrl;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub connected: bool,
    /// Open connections, leased or idle.
    pub size: u32,
    pub idle: usize,
    pub max_connections: u32,
}

/// Owns the connection pool for one database.
pub struct ConnectionPool {
    config: DatabaseConfig,
    url: ConnectionUrl,
    pool: RwLock<Option<SqlitePool>>,
}

impl ConnectionPool {
    /// Validate the configuration and parse the URL. Does not connect.
    pub fn new(config: &DatabaseConfig) -> DataResult<Self> {
        config.validate()?;
        let url = ConnectionUrl::parse(&config.url)?;
        Ok(Self {
            config: config.clone(),
            url,
            pool: RwLock::new(None),
        })
    }

    pub async fn connect_with(config: &DatabaseConfig) -> DataResult<Self> {
        let pool = Self::new(config)?;
        pool.connect().await?;
        Ok(pool)
    }

    /// Open the pool. Calling it on a connected pool is a no-op.
    ///
    /// Connections use WAL journal mode, enforce foreign keys and wait up to
    /// five seconds on a locked database.
    pub async fn connect(&self) -> DataResult<()> {
        if self.is_connected() {
            tracing::debug!(url = %self.url, "pool already connected");
            return Ok(());
        }
        if !self.url.is_sqlite() {
            return Err(DataError::connection(format!(
                "unsupported dialect '{}' in {}",
                self.url.dialect(),
                self.url
            )));
        }

        let mut options = SqliteConnectOptions::from_str(self.url.expose())
            .map_err(|e| DataError::connection(format!("invalid sqlite url {}: {e}", self.url)))?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);
        if !self.config.echo {
            options = options.disable_statement_logging();
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections())
            .min_connections(self.config.pool_size)
            .acquire_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| DataError::connection(format!("failed to connect to {}: {e}", self.url)))?;

        let surplus = {
            let mut slot = self.pool.write().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                Some(pool)
            } else {
                *slot = Some(pool);
                None
            }
        };
        if let Some(surplus) = surplus {
            surplus.close().await;
            return Ok(());
        }

        tracing::info!(
            dialect = self.url.dialect(),
            url = %self.url,
            pool_size = self.config.pool_size,
            max_overflow = self.config.max_overflow,
            "Connected to database"
        );
        Ok(())
    }

    /// Close every connection. Safe to call repeatedly or before `connect`.
    pub async fn dispose(&self) {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pool {
            Some(pool) => {
                pool.close().await;
                tracing::info!(url = %self.url, "Disconnected from database");
            }
            None => tracing::debug!(url = %self.url, "dispose on a pool that is not connected"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Lease a connection and wrap it in a new session.
    ///
    /// Waits up to the configured acquire timeout when every connection is
    /// leased.
    pub async fn open_session(&self, kind: SessionKind) -> DataResult<Session> {
        let pool = self.handle()?;
        let connection = pool
            .acquire()
            .await
            .map_err(|e| DataError::connection(format!("failed to lease a connection: {e}")))?;
        let session = Session::new(connection, kind);
        tracing::debug!(session = %session.id(), %kind, "session opened");
        Ok(session)
    }

    pub fn status(&self) -> PoolStatus {
        let max_connections = self.config.max_connections();
        match self.pool.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(pool) => PoolStatus {
                connected: true,
                size: pool.size(),
                idle: pool.num_idle(),
                max_connections,
            },
            None => PoolStatus {
                connected: false,
                size: 0,
                idle: 0,
                max_connections,
            },
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn url(&self) -> &ConnectionUrl {
        &self.url
    }

    fn handle(&self) -> DataResult<SqlitePool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| DataError::connection(format!("pool for {} is not connected", self.url)))
    }
}
