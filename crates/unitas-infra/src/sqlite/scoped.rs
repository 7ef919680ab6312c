//! Scoped session registry: at most one session per task context.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use unitas_types::error::DataResult;

use super::context::ContextId;
use super::pool::ConnectionPool;
use super::session::{Session, SessionKind};

/// Maps task contexts to their sessions.
///
/// Lookups clone the session handle out of the map; no map guard is held
/// across an `.await`.
pub struct ScopedSessionRegistry {
    pool: Arc<ConnectionPool>,
    sessions: DashMap<ContextId, Session>,
}

impl ScopedSessionRegistry {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, context: ContextId) -> Option<Session> {
        self.sessions.get(&context).map(|entry| entry.value().clone())
    }

    /// The context's session, opening one on first use.
    pub async fn get_or_create(&self, context: ContextId) -> DataResult<Session> {
        if let Some(session) = self.get(context) {
            return Ok(session);
        }

        let created = self.pool.open_session(SessionKind::Scoped).await?;
        let (session, surplus) = match self.sessions.entry(context) {
            Entry::Occupied(existing) => (existing.get().clone(), Some(created)),
            Entry::Vacant(slot) => {
                slot.insert(created.clone());
                (created, None)
            }
        };
        // Another future in the same context registered first.
        if let Some(surplus) = surplus {
            if let Err(err) = surplus.close().await {
                tracing::warn!(%context, %err, "failed to close surplus session");
            }
        }

        tracing::debug!(%context, session = %session.id(), "scoped session registered");
        Ok(session)
    }

    /// Unregister and close the context's session. No-op when none is registered.
    pub async fn release(&self, context: ContextId) -> DataResult<()> {
        let Some((_, session)) = self.sessions.remove(&context) else {
            return Ok(());
        };
        session.close().await
    }

    /// Unregister and discard without awaiting. Used when a scope is dropped mid-flight.
    pub(crate) fn release_now(&self, context: ContextId) {
        if let Some((_, session)) = self.sessions.remove(&context) {
            session.discard();
        }
    }

    pub async fn release_all(&self) {
        let contexts: Vec<ContextId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for context in contexts {
            if let Err(err) = self.release(context).await {
                tracing::warn!(%context, %err, "failed to release scoped session");
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
