//! Sessions: one leased connection, its transaction and its pending writes.
//!
//! A transaction is begun lazily by the first statement. Staged writes are
//! held in memory until the next flush or commit and then executed in the
//! order they were staged. Reads never flush.
//!
//! If the last handle to a session is dropped while its transaction is still
//! open (a cancelled or panicking scope), the connection is detached from the
//! pool and closed so the store discards the transaction.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use tokio::sync::Mutex;
use unitas_core::statement::Statement;
use unitas_types::entity::Record;
use unitas_types::error::{DataError, DataResult};
use uuid::Uuid;

use super::row;

/// Unique session identifier, time-sortable (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Registered to a task context by the unit of work.
    Scoped,
    /// Private to one `atomic_concurrent` scope, never registered.
    Concurrent,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scoped => f.write_str("scoped"),
            Self::Concurrent => f.write_str("concurrent"),
        }
    }
}

/// Handle to a session. Clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    kind: SessionKind,
    opened_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

struct SessionState {
    connection: Option<PoolConnection<Sqlite>>,
    in_transaction: bool,
    pending: Vec<Statement>,
}

impl Session {
    pub(crate) fn new(connection: PoolConnection<Sqlite>, kind: SessionKind) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                kind,
                opened_at: Utc::now(),
                state: Mutex::new(SessionState {
                    connection: Some(connection),
                    in_transaction: false,
                    pending: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn kind(&self) -> SessionKind {
        self.inner.kind
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.inner.opened_at
    }

    /// Whether both handles refer to the same session.
    pub fn same_as(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// False once the session has been closed or discarded.
    pub async fn is_open(&self) -> bool {
        self.inner.state.lock().await.connection.is_some()
    }

    pub async fn in_transaction(&self) -> bool {
        self.inner.state.lock().await.in_transaction
    }

    /// Execute a statement now. Returns rows affected.
    pub async fn execute(&self, statement: &Statement) -> DataResult<u64> {
        let mut state = self.inner.state.lock().await;
        let conn = state.transaction("execute").await?;
        let result = row::query(statement)
            .execute(conn)
            .await
            .map_err(|e| DataError::store("execute", e))?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&self, statement: &Statement) -> DataResult<Vec<Record>> {
        let mut state = self.inner.state.lock().await;
        let conn = state.transaction("fetch").await?;
        let rows = row::query(statement)
            .fetch_all(conn)
            .await
            .map_err(|e| DataError::store("fetch", e))?;
        rows.iter().map(row::decode_row).collect()
    }

    pub async fn fetch_optional(&self, statement: &Statement) -> DataResult<Option<Record>> {
        let mut state = self.inner.state.lock().await;
        let conn = state.transaction("fetch").await?;
        let found = row::query(statement)
            .fetch_optional(conn)
            .await
            .map_err(|e| DataError::store("fetch", e))?;
        found.as_ref().map(row::decode_row).transpose()
    }

    /// Queue a write for the next flush.
    pub async fn stage(&self, statement: Statement) -> DataResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.connection.is_none() {
            return Err(DataError::NoActiveSession { operation: "stage" });
        }
        state.pending.push(statement);
        Ok(())
    }

    pub async fn pending_writes(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Execute every staged write, in order, inside the current transaction.
    pub async fn flush(&self) -> DataResult<()> {
        let flushed = self.inner.state.lock().await.flush().await?;
        if flushed > 0 {
            tracing::trace!(session = %self.inner.id, flushed, "flushed pending writes");
        }
        Ok(())
    }

    /// Flush and commit. Later statements run in a new transaction.
    pub async fn commit(&self) -> DataResult<()> {
        self.inner.state.lock().await.commit().await?;
        tracing::debug!(session = %self.inner.id, "session committed");
        Ok(())
    }

    /// Drop staged writes and roll back the open transaction, if any.
    pub async fn rollback(&self) -> DataResult<()> {
        self.inner.state.lock().await.rollback().await?;
        tracing::debug!(session = %self.inner.id, "session rolled back");
        Ok(())
    }

    /// Roll back anything uncommitted and return the connection to the pool.
    ///
    /// Closing twice is a no-op. Every other operation on a closed session
    /// fails with `NoActiveSession`.
    pub async fn close(&self) -> DataResult<()> {
        let closed = self.inner.state.lock().await.close().await?;
        if closed {
            let held = Utc::now() - self.inner.opened_at;
            tracing::debug!(
                session = %self.inner.id,
                kind = %self.inner.kind,
                held_ms = held.num_milliseconds(),
                "session closed"
            );
        }
        Ok(())
    }

    /// Release the connection without awaiting, discarding any open transaction.
    pub(crate) fn discard(&self) {
        match self.inner.state.try_lock() {
            Ok(mut state) => state.discard(),
            Err(_) => tracing::warn!(
                session = %self.inner.id,
                "session busy during discard; released when its last handle drops"
            ),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

impl SessionState {
    fn connection(&mut self, operation: &'static str) -> DataResult<&mut SqliteConnection> {
        self.connection
            .as_deref_mut()
            .ok_or(DataError::NoActiveSession { operation })
    }

    /// The connection, with a transaction begun on it.
    async fn transaction(&mut self, operation: &'static str) -> DataResult<&mut SqliteConnection> {
        let conn = self
            .connection
            .as_deref_mut()
            .ok_or(DataError::NoActiveSession { operation })?;
        if !self.in_transaction {
            // Set before awaiting: a BEGIN dropped mid-flight may still run on
            // the connection, so discard must treat it as open.
            self.in_transaction = true;
            if let Err(e) = sqlx::query("BEGIN").execute(&mut *conn).await {
                self.in_transaction = false;
                return Err(DataError::store("begin", e));
            }
        }
        Ok(conn)
    }

    async fn flush(&mut self) -> DataResult<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let pending = std::mem::take(&mut self.pending);
        let conn = self.transaction("flush").await?;
        for statement in &pending {
            row::query(statement)
                .execute(&mut *conn)
                .await
                .map_err(|e| DataError::store("flush", e))?;
        }
        Ok(pending.len())
    }

    async fn commit(&mut self) -> DataResult<()> {
        self.flush().await?;
        if !self.in_transaction {
            return Ok(());
        }
        let conn = self.connection("commit")?;
        sqlx::query("COMMIT")
            .execute(conn)
            .await
            .map_err(|e| DataError::store("commit", e))?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> DataResult<()> {
        self.pending.clear();
        if !self.in_transaction {
            return Ok(());
        }
        let conn = self.connection("rollback")?;
        match sqlx::query("ROLLBACK").execute(conn).await {
            Ok(_) => {}
            // The store already rolled back on its own (e.g. after a disk or lock error).
            Err(e) if no_active_transaction(&e) => {}
            Err(e) => return Err(DataError::store("rollback", e)),
        }
        self.in_transaction = false;
        Ok(())
    }

    /// Returns whether there was a connection to release.
    async fn close(&mut self) -> DataResult<bool> {
        if self.connection.is_none() {
            return Ok(false);
        }
        let rolled_back = self.rollback().await;
        if rolled_back.is_err() {
            self.discard();
        } else {
            self.connection = None;
        }
        rolled_back.map(|()| true)
    }

    fn discard(&mut self) {
        self.pending.clear();
        if let Some(connection) = self.connection.take() {
            if self.in_transaction {
                self.in_transaction = false;
                tracing::warn!("discarding an open transaction; closing its connection");
                drop(connection.detach());
            }
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.discard();
    }
}

fn no_active_transaction(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.message().contains("no transaction is active"))
}
