//! Generic SQLite repository.
//!
//! Implements `EntityRepository` for any `Entity` on top of a bound
//! [`Session`]. Column and table names come from the entity contract; rows
//! come back as records and are decoded through serde.

use std::marker::PhantomData;

use serde_json::Value;
use unitas_core::dedup::{unique_entities, unique_records};
use unitas_core::pagination::Page;
use unitas_core::repository::{EntityRepository, SessionBound};
use unitas_core::statement::Statement;
use unitas_types::entity::{Entity, EntityId, ID_COLUMN, KeyStrategy, Record, TIMESTAMP_COLUMNS};
use unitas_types::error::{DataError, DataResult};
use uuid::Uuid;

use super::session::Session;

/// SQLite-backed implementation of `EntityRepository<E>`.
///
/// Instances start unbound; the repository registry binds each one to the
/// session of the scope that asked for it.
pub struct SqliteRepository<E> {
    session: Option<Session>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> SqliteRepository<E> {
    pub fn new() -> Self {
        Self {
            session: None,
            _entity: PhantomData,
        }
    }

    /// A repository already bound to `session`.
    pub fn bound(session: Session) -> Self {
        Self {
            session: Some(session),
            _entity: PhantomData,
        }
    }

    fn bound_session(&self, operation: &'static str) -> DataResult<&Session> {
        self.session
            .as_ref()
            .ok_or(DataError::NoActiveSession { operation })
    }

    async fn fetch_entities(&self, statement: &Statement) -> DataResult<Vec<E>> {
        let session = self.bound_session("fetch")?;
        session
            .fetch_all(statement)
            .await?
            .into_iter()
            .map(decode::<E>)
            .collect()
    }

    async fn fetch_page(
        &self,
        statement: &Statement,
        page_size: i64,
        page_number: i64,
    ) -> DataResult<Vec<E>> {
        let page = Page::new(page_size, page_number)?;
        self.fetch_entities(&statement.clone().paginate(&page)).await
    }

    /// Flush pending writes, then run `statement` now.
    async fn execute_now(&self, operation: &'static str, statement: &Statement) -> DataResult<u64> {
        let session = self.bound_session(operation)?;
        session.flush().await?;
        session.execute(statement).await
    }
}

impl<E: Entity> Default for SqliteRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for SqliteRepository<E> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> SessionBound<Session> for SqliteRepository<E> {
    fn bind_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

impl<E: Entity> EntityRepository<E> for SqliteRepository<E> {
    async fn fetch_one(&self, statement: &Statement) -> DataResult<Option<E>> {
        let session = self.bound_session("fetch_one")?;
        session
            .fetch_optional(statement)
            .await?
            .map(decode::<E>)
            .transpose()
    }

    async fn fetch_one_unique(&self, statement: &Statement) -> DataResult<Option<E>> {
        Ok(self.fetch_all_unique(statement).await?.into_iter().next())
    }

    async fn fetch_all(&self, statement: &Statement) -> DataResult<Vec<E>> {
        self.fetch_entities(statement).await
    }

    async fn fetch_all_unique(&self, statement: &Statement) -> DataResult<Vec<E>> {
        Ok(unique_entities(self.fetch_entities(statement).await?))
    }

    async fn fetch_record(&self, statement: &Statement) -> DataResult<Option<Record>> {
        self.bound_session("fetch_record")?
            .fetch_optional(statement)
            .await
    }

    async fn fetch_records(&self, statement: &Statement) -> DataResult<Vec<Record>> {
        self.bound_session("fetch_records")?.fetch_all(statement).await
    }

    async fn fetch_records_unique(&self, statement: &Statement) -> DataResult<Vec<Record>> {
        Ok(unique_records(self.fetch_records(statement).await?))
    }

    async fn paginate(
        &self,
        statement: &Statement,
        page_size: i64,
        page_number: i64,
    ) -> DataResult<Vec<E>> {
        self.fetch_page(statement, page_size, page_number).await
    }

    async fn paginate_unique(
        &self,
        statement: &Statement,
        page_size: i64,
        page_number: i64,
    ) -> DataResult<Vec<E>> {
        Ok(unique_entities(
            self.fetch_page(statement, page_size, page_number).await?,
        ))
    }

    async fn insert_flushed(&self, entity: &E) -> DataResult<E> {
        let session = self.bound_session("insert")?;
        session.flush().await?;

        let record = without_nulls(insert_record(&assign_key(entity)?)?);
        let statement = Statement::insert::<E>(&[record])?.returning(&[]);
        let stored = session
            .fetch_all(&statement)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DataError::invalid_record(E::TYPE_NAME, "insert returned no row"))?;
        decode(stored)
    }

    async fn insert_staged(&self, entity: E) -> DataResult<E> {
        let session = self.bound_session("insert")?;
        let entity = assign_key(&entity)?;
        let record = without_nulls(insert_record(&entity)?);
        session.stage(Statement::insert::<E>(&[record])?).await?;
        Ok(entity)
    }

    async fn insert_many_flushed(&self, entities: &[E]) -> DataResult<Vec<E>> {
        let mut stored = Vec::with_capacity(entities.len());
        for entity in entities {
            stored.push(self.insert_flushed(entity).await?);
        }
        Ok(stored)
    }

    async fn save_flushed(&self, entity: &E) -> DataResult<Option<E>> {
        let session = self.bound_session("save")?;
        let id = key_of(entity)?;
        session.flush().await?;

        let mut record = entity.to_record()?;
        record.retain(|column, _| E::FIELDS.contains(&column.as_str()));
        let statement = Statement::update::<E>(&record)?
            .where_id(&id)
            .returning(&[]);
        session
            .fetch_all(&statement)
            .await?
            .into_iter()
            .next()
            .map(decode::<E>)
            .transpose()
    }

    async fn bulk_insert(&self, entities: &[E]) -> DataResult<Vec<E>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.bound_session("bulk_insert")?;

        let keyed = entities.iter().map(assign_key).collect::<DataResult<Vec<E>>>()?;
        let records = keyed.iter().map(insert_record).collect::<DataResult<Vec<_>>>()?;

        session.flush().await?;
        let inserted = insert_chunked::<E>(session, align_columns(records)).await?;
        tracing::debug!(entity = E::TYPE_NAME, inserted, "bulk insert");
        Ok(keyed)
    }

    async fn bulk_insert_records(&self, records: &[Record]) -> DataResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let stripped = records
            .iter()
            .cloned()
            .map(|mut record| {
                strip_timestamps(&mut record);
                record
            })
            .collect();
        let session = self.bound_session("bulk_insert")?;
        session.flush().await?;
        let inserted = insert_chunked::<E>(session, align_columns(stripped)).await?;
        tracing::debug!(entity = E::TYPE_NAME, inserted, "bulk insert");
        Ok(inserted)
    }

    async fn delete_staged(&self, entity: &E) -> DataResult<()> {
        let session = self.bound_session("delete")?;
        let id = key_of(entity)?;
        session.stage(Statement::delete::<E>().where_id(&id)).await
    }

    async fn delete_many_staged(&self, entities: &[E]) -> DataResult<()> {
        let session = self.bound_session("delete")?;
        let ids = entities.iter().map(key_of).collect::<DataResult<Vec<_>>>()?;
        for id in ids {
            session.stage(Statement::delete::<E>().where_id(&id)).await?;
        }
        Ok(())
    }

    async fn delete_flushed(&self, entity: &E) -> DataResult<u64> {
        let id = key_of(entity)?;
        self.execute_now("delete", &Statement::delete::<E>().where_id(&id))
            .await
    }

    async fn execute_delete(&self, statement: &Statement) -> DataResult<u64> {
        self.execute_now("execute_delete", statement).await
    }

    async fn execute_update(&self, statement: &Statement) -> DataResult<u64> {
        self.execute_now("execute_update", statement).await
    }

    async fn execute_update_returning(&self, statement: &Statement) -> DataResult<Vec<Record>> {
        let session = self.bound_session("execute_update_returning")?;
        session.flush().await?;
        session.fetch_all(statement).await
    }

    async fn update_staged(&self, mut entities: Vec<E>, payload: &Record) -> DataResult<Vec<E>> {
        let session = self.bound_session("update")?;
        let template = Statement::update::<E>(payload)?;
        let ids = entities.iter().map(key_of).collect::<DataResult<Vec<_>>>()?;

        for (entity, id) in entities.iter_mut().zip(ids) {
            entity.update(payload)?;
            session.stage(template.clone().where_id(&id)).await?;
        }
        Ok(entities)
    }
}

// ---------------------------------------------------------------------------
// Record helpers
// ---------------------------------------------------------------------------

fn decode<E: Entity>(record: Record) -> DataResult<E> {
    E::from_record(record).map_err(|e| DataError::store("decode", e))
}

fn key_of<E: Entity>(entity: &E) -> DataResult<EntityId> {
    entity
        .id()
        .ok_or_else(|| DataError::invalid_record(E::TYPE_NAME, "entity has no primary key"))
}

/// A copy of `entity` with a generated UUID key when its type uses one and none is set.
fn assign_key<E: Entity>(entity: &E) -> DataResult<E> {
    let mut record = entity.to_record()?;
    if E::PRIMARY_KEY == KeyStrategy::Uuid && entity.id().is_none() {
        record.insert(
            ID_COLUMN.to_string(),
            Value::String(Uuid::now_v7().to_string()),
        );
    }
    Ok(E::from_record(record)?)
}

/// Insert columns for `entity`: no timestamps, no unset key.
fn insert_record<E: Entity>(entity: &E) -> DataResult<Record> {
    let mut record = entity.to_record()?;
    record.retain(|column, _| E::has_column(column));
    strip_timestamps(&mut record);
    if record.get(ID_COLUMN).is_some_and(Value::is_null) {
        record.remove(ID_COLUMN);
    }
    Ok(record)
}

fn strip_timestamps(record: &mut Record) {
    for column in TIMESTAMP_COLUMNS {
        record.remove(column);
    }
}

/// Unset columns take their store defaults on single-row inserts.
fn without_nulls(mut record: Record) -> Record {
    record.retain(|_, value| !value.is_null());
    record
}

/// Most parameters SQLite accepts in one statement.
const MAX_BIND_PARAMS: usize = 32_766;

/// Insert aligned `rows` as multi-row statements that each stay under the
/// store's parameter limit. When more than one statement is needed they run
/// under a savepoint, so a failing chunk leaves none of the rows behind.
async fn insert_chunked<E: Entity>(session: &Session, rows: Vec<Record>) -> DataResult<u64> {
    let columns = rows.first().map_or(0, |row| row.len());
    let rows_per_statement = (MAX_BIND_PARAMS / columns.max(1)).max(1);
    let statements = rows
        .chunks(rows_per_statement)
        .map(Statement::insert::<E>)
        .collect::<DataResult<Vec<_>>>()?;

    if let [statement] = statements.as_slice() {
        return session.execute(statement).await;
    }
    tracing::trace!(entity = E::TYPE_NAME, statements = statements.len(), "chunked bulk insert");
    session.execute(&Statement::new("SAVEPOINT bulk_insert")).await?;
    let mut inserted = 0;
    for statement in &statements {
        match session.execute(statement).await {
            Ok(count) => inserted += count,
            Err(err) => {
                for undo in ["ROLLBACK TO bulk_insert", "RELEASE bulk_insert"] {
                    if let Err(undo_err) = session.execute(&Statement::new(undo)).await {
                        tracing::warn!(%undo_err, "failed to undo partial bulk insert");
                    }
                }
                return Err(err);
            }
        }
    }
    session.execute(&Statement::new("RELEASE bulk_insert")).await?;
    Ok(inserted)
}

/// Give every record the union of all records' columns, filling gaps with null.
fn align_columns(records: Vec<Record>) -> Vec<Record> {
    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for column in record.keys() {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }
    records
        .into_iter()
        .map(|mut record| {
            for column in &columns {
                record.entry(column.clone()).or_insert(Value::Null);
            }
            record
        })
        .collect()
}
