//! Infrastructure layer for Unitas.
//!
//! Contains the SQLite implementations of the ports defined in `unitas-core`:
//! the connection pool adapter, task-scoped sessions, the unit of work and the
//! generic entity repository, plus configuration loading.

pub mod config;
pub mod sqlite;
