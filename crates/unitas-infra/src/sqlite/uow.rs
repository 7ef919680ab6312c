//! Unit of work: transaction scopes bound to task contexts.
//!
//! [`UnitOfWork::atomic`] gives the calling task one session for the whole
//! scope, commits it when the scope succeeds and rolls it back when the scope
//! fails. Scopes entered again from inside a scope join the enclosing one;
//! only the outermost scope commits and releases. Repositories obtained with
//! [`UnitOfWork::get_repository`] run on the current session: the session of
//! the innermost [`UnitOfWork::atomic_concurrent`] closure if one is running,
//! otherwise the task's scoped session.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use unitas_core::repository::{EntityRepository, RepositoryRegistry};
//! # use unitas_core::scope::ScopeMode;
//! # use unitas_core::statement::Statement;
//! # use unitas_infra::sqlite::{ConnectionPool, Session, UnitOfWork};
//! # use unitas_types::config::DatabaseConfig;
//! # use unitas_types::error::DataError;
//! # async fn demo() -> Result<(), DataError> {
//! let pool = Arc::new(ConnectionPool::connect_with(&DatabaseConfig::default()).await?);
//! let uow = UnitOfWork::new(pool, RepositoryRegistry::<Session>::new());
//!
//! let rows = uow
//!     .atomic(ScopeMode::ReadOnly, |session| async move {
//!         session.fetch_all(&Statement::new("SELECT 1 AS one")).await
//!     })
//!     .await?;
//! assert_eq!(rows.len(), 1);
//! uow.dispose().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use unitas_core::repository::{RepositoryRegistry, SessionBound};
use unitas_core::scope::{ScopeLifecycle, ScopeMode, ScopeState};
use unitas_types::error::{DataError, DataResult};

use super::context::{self, ContextId};
use super::pool::ConnectionPool;
use super::scoped::ScopedSessionRegistry;
use super::session::{Session, SessionKind};

pub struct UnitOfWork {
    pool: Arc<ConnectionPool>,
    sessions: ScopedSessionRegistry,
    repositories: RepositoryRegistry<Session>,
    log_pool_status: bool,
}

impl UnitOfWork {
    pub fn new(pool: Arc<ConnectionPool>, repositories: RepositoryRegistry<Session>) -> Self {
        Self {
            log_pool_status: pool.config().log_pool_status,
            sessions: ScopedSessionRegistry::new(Arc::clone(&pool)),
            pool,
            repositories,
        }
    }

    /// Log pool occupancy at the start and end of every scope.
    pub fn with_pool_logging(mut self, enabled: bool) -> Self {
        self.log_pool_status = enabled;
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn repositories(&self) -> &RepositoryRegistry<Session> {
        &self.repositories
    }

    /// Number of task contexts that currently hold a scoped session.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    /// Run `f` inside a transaction scope on the current task's session.
    ///
    /// In the outermost scope: success commits (unless `mode` is read-only),
    /// failure rolls back and returns the error unchanged, and the session is
    /// released either way. In a nested scope no commit happens; a failure
    /// rolls back the shared transaction and propagates.
    ///
    /// If the scope's future is dropped before completing (cancellation or
    /// panic), its transaction is discarded and its session released.
    pub async fn atomic<F, Fut, T, E>(&self, mode: ScopeMode, f: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DataError>,
    {
        if let Some(session) = context::concurrent_session() {
            return join_scope(&session, f).await;
        }
        match ContextId::current() {
            Some(context) => self.run_scope(context, mode, f).await,
            None => {
                let context = ContextId::next();
                context::enter(context, self.run_scope(context, mode, f)).await
            }
        }
    }

    /// Run `f` in a transaction on a fresh session that belongs to no context.
    ///
    /// Commits on success and rolls back on failure independently of any
    /// enclosing scope; the session is closed at exit. While `f` runs, its
    /// session is the current one: `get_repository`, `commit`, `rollback` and
    /// nested `atomic` scopes inside `f` all use it.
    pub async fn atomic_concurrent<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DataError>,
    {
        let session = self.pool.open_session(SessionKind::Concurrent).await?;
        let mut guard = DiscardGuard::session(session.clone());
        let mut lifecycle = ScopeLifecycle::new(ScopeMode::ReadWrite);
        advance(&mut lifecycle, ScopeState::Active);
        tracing::debug!(session = %session.id(), "concurrent scope opened");

        let outcome = context::with_session(session.clone(), f(session.clone())).await;
        let result = settle(&session, &mut lifecycle, outcome).await;
        if let Err(err) = session.close().await {
            tracing::warn!(session = %session.id(), %err, "failed to close concurrent session");
        }
        advance(&mut lifecycle, ScopeState::Closed);
        guard.disarm();
        result
    }

    /// Wrap `operation` so that every call runs inside its own read-write scope.
    pub fn transactional<A, F, Fut, T, E>(
        self: &Arc<Self>,
        operation: F,
    ) -> impl Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static
    where
        A: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<DataError> + Send + 'static,
    {
        let uow = Arc::clone(self);
        let operation = Arc::new(operation);
        move |args: A| -> BoxFuture<'static, Result<T, E>> {
            let uow = Arc::clone(&uow);
            let operation = Arc::clone(&operation);
            Box::pin(async move {
                uow.atomic(ScopeMode::ReadWrite, move |_session| (*operation)(args))
                    .await
            })
        }
    }

    /// The current session: the running concurrent scope's, else the task's.
    pub fn current_session(&self) -> DataResult<Session> {
        self.scoped_session("current_session")
    }

    /// A new `R` bound to the current session.
    pub fn get_repository<R: SessionBound<Session>>(&self) -> DataResult<R> {
        let session = self.scoped_session("get_repository")?;
        self.repositories.resolve(session)
    }

    /// A new `R` bound to an explicit `session`.
    pub fn repository_for<R: SessionBound<Session>>(&self, session: &Session) -> DataResult<R> {
        self.repositories.resolve(session.clone())
    }

    /// Commit the current scope's work so far. Later work in the scope runs
    /// in a new transaction.
    pub async fn commit(&self) -> DataResult<()> {
        self.scoped_session("commit")?.commit().await
    }

    /// Roll back the current scope's uncommitted work.
    pub async fn rollback(&self) -> DataResult<()> {
        self.scoped_session("rollback")?.rollback().await
    }

    /// Release every scoped session and close the pool. Safe to call repeatedly.
    pub async fn dispose(&self) {
        self.sessions.release_all().await;
        self.pool.dispose().await;
    }

    fn scoped_session(&self, operation: &'static str) -> DataResult<Session> {
        context::concurrent_session()
            .or_else(|| ContextId::current().and_then(|context| self.sessions.get(context)))
            .ok_or(DataError::NoActiveSession { operation })
    }

    async fn run_scope<F, Fut, T, E>(
        &self,
        context: ContextId,
        mode: ScopeMode,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DataError>,
    {
        if let Some(session) = self.sessions.get(context) {
            tracing::trace!(%context, "joining enclosing scope");
            return join_scope(&session, f).await;
        }

        let mut guard = DiscardGuard::scoped(&self.sessions, context);
        let session = match self.sessions.get_or_create(context).await {
            Ok(session) => session,
            Err(err) => {
                guard.disarm();
                return Err(E::from(err));
            }
        };
        let mut lifecycle = ScopeLifecycle::new(mode);
        advance(&mut lifecycle, ScopeState::Active);
        tracing::debug!(%context, session = %session.id(), ?mode, "scope opened");
        self.log_pool_status("scope start");

        let outcome = f(session.clone()).await;
        let result = settle(&session, &mut lifecycle, outcome).await;
        if let Err(err) = self.sessions.release(context).await {
            tracing::warn!(%context, %err, "failed to release scoped session");
        }
        advance(&mut lifecycle, ScopeState::Closed);
        guard.disarm();

        self.log_pool_status("scope end");
        result
    }

    fn log_pool_status(&self, phase: &'static str) {
        if !self.log_pool_status {
            return;
        }
        let status = self.pool.status();
        tracing::debug!(
            phase,
            size = status.size,
            idle = status.idle,
            max = status.max_connections,
            "pool status"
        );
    }
}

/// Run a nested scope on the enclosing scope's session. Nothing commits here;
/// a failure rolls back the shared transaction.
async fn join_scope<F, Fut, T, E>(session: &Session, f: F) -> Result<T, E>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    tracing::trace!(session = %session.id(), "nested scope");
    match f(session.clone()).await {
        Ok(value) => Ok(value),
        Err(err) => {
            rollback_quietly(session).await;
            Err(err)
        }
    }
}

/// Commit or roll back according to the scope's outcome.
async fn settle<T, E>(
    session: &Session,
    lifecycle: &mut ScopeLifecycle,
    outcome: Result<T, E>,
) -> Result<T, E>
where
    E: From<DataError>,
{
    match outcome {
        Ok(value) if lifecycle.mode().is_read_only() => Ok(value),
        Ok(value) => match session.commit().await {
            Ok(()) => {
                advance(lifecycle, ScopeState::Committed);
                Ok(value)
            }
            Err(err) => {
                rollback_quietly(session).await;
                advance(lifecycle, ScopeState::RolledBack);
                Err(E::from(err))
            }
        },
        Err(err) => {
            rollback_quietly(session).await;
            advance(lifecycle, ScopeState::RolledBack);
            Err(err)
        }
    }
}

async fn rollback_quietly(session: &Session) {
    if let Err(err) = session.rollback().await {
        tracing::warn!(session = %session.id(), %err, "rollback failed");
    }
}

fn advance(lifecycle: &mut ScopeLifecycle, next: ScopeState) {
    if let Err(err) = lifecycle.advance(next) {
        tracing::error!(%err, "unit of work lifecycle violated");
    }
}

/// Discards a scope's session if the scope is dropped before it finishes.
struct DiscardGuard<'a> {
    target: Option<DiscardTarget<'a>>,
}

enum DiscardTarget<'a> {
    Scoped {
        sessions: &'a ScopedSessionRegistry,
        context: ContextId,
    },
    Concurrent(Session),
}

impl<'a> DiscardGuard<'a> {
    fn scoped(sessions: &'a ScopedSessionRegistry, context: ContextId) -> Self {
        Self {
            target: Some(DiscardTarget::Scoped { sessions, context }),
        }
    }

    fn session(session: Session) -> Self {
        Self {
            target: Some(DiscardTarget::Concurrent(session)),
        }
    }

    fn disarm(&mut self) {
        self.target = None;
    }
}

impl Drop for DiscardGuard<'_> {
    fn drop(&mut self) {
        match self.target.take() {
            Some(DiscardTarget::Scoped { sessions, context }) => {
                tracing::warn!(%context, "scope dropped before completion; discarding its transaction");
                sessions.release_now(context);
            }
            Some(DiscardTarget::Concurrent(session)) => {
                tracing::warn!(session = %session.id(), "concurrent scope dropped before completion; discarding its transaction");
                session.discard();
            }
            None => {}
        }
    }
}
