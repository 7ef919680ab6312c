//! Repository trait definitions.
//!
//! These traits define the "ports" that infrastructure adapters implement.
//! All methods use native async fn in traits (Rust 2024 edition).

pub mod registry;

pub use registry::{RepositoryRegistry, SessionBound, repository_name};

use unitas_types::entity::{Entity, Record};
use unitas_types::error::DataResult;

use crate::statement::Statement;

/// Generic persistence operations for one entity type.
///
/// Every operation runs on the session the repository is bound to and fails
/// with `NoActiveSession` when that session has been closed.
///
/// Naming follows write visibility:
/// - `*_staged` operations queue writes on the session; they reach the store
///   on the next flush or commit.
/// - `*_flushed` operations flush pending writes and execute immediately so
///   store-assigned values come back. They are durable once the enclosing
///   unit of work commits.
/// - `bulk_*` and `execute_*` operations run a single statement immediately.
pub trait EntityRepository<E: Entity>: Send + Sync {
    /// First entity produced by the statement, if any.
    fn fetch_one(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Option<E>>> + Send;

    /// First entity after collapsing duplicate keys produced by fan-out joins.
    fn fetch_one_unique(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Option<E>>> + Send;

    fn fetch_all(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Vec<E>>> + Send;

    /// All entities, deduplicated by primary key in first-seen order.
    fn fetch_all_unique(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Vec<E>>> + Send;

    /// First row as a generic record.
    fn fetch_record(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Option<Record>>> + Send;

    fn fetch_records(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Vec<Record>>> + Send;

    /// Rows deduplicated on full-row equality.
    fn fetch_records_unique(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Vec<Record>>> + Send;

    /// One page of entities. Both arguments must be positive.
    fn paginate(
        &self,
        statement: &Statement,
        page_size: i64,
        page_number: i64,
    ) -> impl std::future::Future<Output = DataResult<Vec<E>>> + Send;

    /// One page of entities, deduplicated within the page.
    fn paginate_unique(
        &self,
        statement: &Statement,
        page_size: i64,
        page_number: i64,
    ) -> impl std::future::Future<Output = DataResult<Vec<E>>> + Send;

    /// Insert and return the stored row, including the assigned key and timestamps.
    fn insert_flushed(&self, entity: &E) -> impl std::future::Future<Output = DataResult<E>> + Send;

    /// Queue an insert. UUID keys are assigned immediately; store-assigned
    /// values are not populated.
    fn insert_staged(&self, entity: E) -> impl std::future::Future<Output = DataResult<E>> + Send;

    /// Insert each entity and return the stored rows in input order.
    fn insert_many_flushed(
        &self,
        entities: &[E],
    ) -> impl std::future::Future<Output = DataResult<Vec<E>>> + Send;

    /// Write every field of an already-stored entity and return the stored row.
    /// Returns `None` when no row has the entity's key.
    fn save_flushed(
        &self,
        entity: &E,
    ) -> impl std::future::Future<Output = DataResult<Option<E>>> + Send;

    /// Insert all entities with one multi-row statement.
    ///
    /// Returns the inputs with UUID keys assigned; store-assigned values are not read back.
    fn bulk_insert(
        &self,
        entities: &[E],
    ) -> impl std::future::Future<Output = DataResult<Vec<E>>> + Send;

    /// Insert raw column mappings with one multi-row statement. Returns rows affected.
    fn bulk_insert_records(
        &self,
        records: &[Record],
    ) -> impl std::future::Future<Output = DataResult<u64>> + Send;

    fn delete_staged(&self, entity: &E) -> impl std::future::Future<Output = DataResult<()>> + Send;

    fn delete_many_staged(
        &self,
        entities: &[E],
    ) -> impl std::future::Future<Output = DataResult<()>> + Send;

    /// Delete immediately. Returns rows affected.
    fn delete_flushed(&self, entity: &E) -> impl std::future::Future<Output = DataResult<u64>> + Send;

    /// Run a delete statement immediately. Returns rows affected.
    fn execute_delete(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<u64>> + Send;

    /// Run an update statement immediately. Returns rows affected.
    fn execute_update(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<u64>> + Send;

    /// Flush, run an update statement with a `RETURNING` clause and return the rows.
    fn execute_update_returning(
        &self,
        statement: &Statement,
    ) -> impl std::future::Future<Output = DataResult<Vec<Record>>> + Send;

    /// Apply `payload` to every entity in place and queue the matching updates.
    fn update_staged(
        &self,
        entities: Vec<E>,
        payload: &Record,
    ) -> impl std::future::Future<Output = DataResult<Vec<E>>> + Send;
}
