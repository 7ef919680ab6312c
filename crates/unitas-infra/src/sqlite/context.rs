//! Task context identity.
//!
//! A context is the tokio task that entered the outermost unit-of-work scope.
//! Its id lives in a task-local cell, so it is visible to everything awaited
//! inside the scope but not to tasks spawned from it.
//!
//! While an `atomic_concurrent` closure runs, its session overrides the
//! context's scoped session for everything awaited inside the closure.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use super::session::Session;

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_CONTEXT: ContextId;
    static CONCURRENT_SESSION: Session;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The context of the running task, if it is inside a scope.
    pub fn current() -> Option<Self> {
        CURRENT_CONTEXT.try_with(|id| *id).ok()
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Run `future` with `context` as the current context.
pub(crate) async fn enter<F: Future>(context: ContextId, future: F) -> F::Output {
    CURRENT_CONTEXT.scope(context, future).await
}

/// Run `future` with `session` as the current session, ahead of any scoped one.
pub(crate) async fn with_session<F: Future>(session: Session, future: F) -> F::Output {
    CONCURRENT_SESSION.scope(session, future).await
}

/// The session of the innermost running `atomic_concurrent` closure.
pub(crate) fn concurrent_session() -> Option<Session> {
    CONCURRENT_SESSION.try_with(Session::clone).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_is_set_only_inside_scope() {
        assert_eq!(ContextId::current(), None);

        let context = ContextId::next();
        let seen = enter(context, async { ContextId::current() }).await;
        assert_eq!(seen, Some(context));
        assert_eq!(ContextId::current(), None);
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit_context() {
        let context = ContextId::next();
        let inherited = enter(context, async {
            tokio::spawn(async { ContextId::current() }).await.unwrap()
        })
        .await;
        assert_eq!(inherited, None);
    }

    #[tokio::test]
    async fn test_concurrent_session_is_visible_only_inside() {
        let pool = crate::sqlite::test_support::test_pool().await;
        let session = pool
            .open_session(crate::sqlite::session::SessionKind::Concurrent)
            .await
            .unwrap();
        assert!(concurrent_session().is_none());

        let seen = with_session(session.clone(), async { concurrent_session() }).await;
        assert!(seen.is_some_and(|s| s.same_as(&session)));
        assert!(concurrent_session().is_none());
        session.close().await.unwrap();
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }
}
