//! Shared fixtures for the storage tests: a temp-file database with a small
//! schema, entities that map onto it and a ready unit of work.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unitas_core::repository::{EntityRepository, RepositoryRegistry, SessionBound};
use unitas_core::statement::{Statement, TIMESTAMP_NOW};
use unitas_types::config::DatabaseConfig;
use unitas_types::entity::{Entity, EntityId, KeyStrategy};
use unitas_types::error::DataResult;
use uuid::Uuid;

use super::pool::ConnectionPool;
use super::repository::SqliteRepository;
use super::session::{Session, SessionKind};
use super::uow::UnitOfWork;

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// URL of a fresh database file that outlives the test.
pub(crate) fn temp_database_url() -> String {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unitas_test.db");
    // Keep the directory alive for the test's lifetime.
    std::mem::forget(dir);
    format!("sqlite://{}?mode=rwc", path.display())
}

/// Connected pool with the test schema.
pub(crate) async fn test_pool() -> Arc<ConnectionPool> {
    test_pool_with(|_| {}).await
}

pub(crate) async fn test_pool_with(configure: impl FnOnce(&mut DatabaseConfig)) -> Arc<ConnectionPool> {
    let mut config = DatabaseConfig {
        pool_size: 2,
        max_overflow: 4,
        ..DatabaseConfig::with_url(temp_database_url())
    };
    configure(&mut config);

    let pool = ConnectionPool::connect_with(&config).await.unwrap();
    create_schema(&pool).await;
    Arc::new(pool)
}

async fn create_schema(pool: &ConnectionPool) {
    let timestamps = format!(
        "created_at TEXT NOT NULL DEFAULT ({TIMESTAMP_NOW}), \
         updated_at TEXT NOT NULL DEFAULT ({TIMESTAMP_NOW})"
    );
    let ddl = [
        format!(
            "CREATE TABLE account (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             name TEXT NOT NULL, \
             email TEXT, \
             {timestamps})"
        ),
        format!(
            "CREATE TABLE membership (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             account_id INTEGER NOT NULL REFERENCES account(id), \
             team TEXT NOT NULL, \
             {timestamps})"
        ),
        format!(
            "CREATE TABLE tag (\
             id TEXT PRIMARY KEY, \
             label TEXT NOT NULL UNIQUE, \
             {timestamps})"
        ),
    ];

    let session = pool.open_session(SessionKind::Scoped).await.unwrap();
    for statement in ddl {
        session.execute(&Statement::new(statement)).await.unwrap();
    }
    session.commit().await.unwrap();
    session.close().await.unwrap();
}

/// Committed row count, read on a separate connection.
pub(crate) async fn count_rows(pool: &ConnectionPool, table: &str) -> i64 {
    let session = pool.open_session(SessionKind::Concurrent).await.unwrap();
    let row = session
        .fetch_optional(&Statement::new(format!("SELECT COUNT(*) AS total FROM {table}")))
        .await
        .unwrap()
        .unwrap();
    session.close().await.unwrap();
    row["total"].as_i64().unwrap()
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Account {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Account {
    const TYPE_NAME: &'static str = "Account";
    const PRIMARY_KEY: KeyStrategy = KeyStrategy::AutoIncrement;
    const FIELDS: &'static [&'static str] = &["name", "email"];

    fn id(&self) -> Option<EntityId> {
        self.id.map(EntityId::Int)
    }
}

pub(crate) fn account(name: &str) -> Account {
    Account {
        id: None,
        name: name.to_string(),
        email: None,
        created_at: None,
        updated_at: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Membership {
    #[serde(default)]
    pub id: Option<i64>,
    pub account_id: i64,
    pub team: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Membership {
    const TYPE_NAME: &'static str = "Membership";
    const PRIMARY_KEY: KeyStrategy = KeyStrategy::AutoIncrement;
    const FIELDS: &'static [&'static str] = &["account_id", "team"];

    fn id(&self) -> Option<EntityId> {
        self.id.map(EntityId::Int)
    }
}

pub(crate) fn membership(account_id: i64, team: &str) -> Membership {
    Membership {
        id: None,
        account_id,
        team: team.to_string(),
        created_at: None,
        updated_at: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Tag {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub label: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Tag {
    const TYPE_NAME: &'static str = "Tag";
    const PRIMARY_KEY: KeyStrategy = KeyStrategy::Uuid;
    const FIELDS: &'static [&'static str] = &["label"];

    fn id(&self) -> Option<EntityId> {
        self.id.map(EntityId::Uuid)
    }
}

pub(crate) fn tag(label: &str) -> Tag {
    Tag {
        id: None,
        label: label.to_string(),
        created_at: None,
        updated_at: None,
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Account repository with a custom finder layered on the generic one.
#[derive(Default)]
pub(crate) struct AccountDirectory {
    accounts: SqliteRepository<Account>,
}

impl AccountDirectory {
    pub(crate) async fn find_by_email(&self, email: &str) -> DataResult<Option<Account>> {
        self.accounts
            .fetch_one(&Statement::select::<Account>().where_eq("email", email))
            .await
    }
}

impl SessionBound<Session> for AccountDirectory {
    fn bind_session(&mut self, session: Session) {
        self.accounts.bind_session(session);
    }

    fn session(&self) -> Option<&Session> {
        self.accounts.session()
    }
}

pub(crate) fn registry() -> RepositoryRegistry<Session> {
    RepositoryRegistry::new()
        .with::<SqliteRepository<Account>>()
        .with::<SqliteRepository<Membership>>()
        .with::<SqliteRepository<Tag>>()
        .with::<AccountDirectory>()
}

pub(crate) fn unit_of_work(pool: Arc<ConnectionPool>) -> UnitOfWork {
    UnitOfWork::new(pool, registry())
}

pub(crate) async fn test_uow() -> Arc<UnitOfWork> {
    Arc::new(unit_of_work(test_pool().await))
}
