//! SQLite storage layer.
//!
//! A [`pool::ConnectionPool`] leases connections to [`session::Session`]s.
//! The [`uow::UnitOfWork`] binds one session to each task context through the
//! [`scoped::ScopedSessionRegistry`] and decides when it commits; repositories
//! such as [`repository::SqliteRepository`] run their statements on it.

pub mod context;
pub mod pool;
pub mod repository;
mod row;
pub mod scoped;
pub mod session;
pub mod uow;
pub mod url;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::ContextId;
pub use pool::{ConnectionPool, PoolStatus};
pub use repository::SqliteRepository;
pub use scoped::ScopedSessionRegistry;
pub use session::{Session, SessionId, SessionKind};
pub use uow::UnitOfWork;
pub use url::ConnectionUrl;
