//! The entity base contract.
//!
//! Every persisted entity has a primary key, a `created_at` stamp set by the
//! store on insert and an `updated_at` stamp set by the store on every
//! generated update. Entities are plain serde structs; the trait below adds
//! the naming and record conversions the repositories rely on.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use unitas_types::entity::{Entity, EntityId, KeyStrategy};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct UserAccount {
//!     #[serde(default)]
//!     id: Option<i64>,
//!     name: String,
//!     #[serde(default)]
//!     created_at: Option<String>,
//!     #[serde(default)]
//!     updated_at: Option<String>,
//! }
//!
//! impl Entity for UserAccount {
//!     const TYPE_NAME: &'static str = "UserAccount";
//!     const PRIMARY_KEY: KeyStrategy = KeyStrategy::AutoIncrement;
//!     const FIELDS: &'static [&'static str] = &["name"];
//!
//!     fn id(&self) -> Option<EntityId> {
//!         self.id.map(EntityId::Int)
//!     }
//! }
//!
//! assert_eq!(UserAccount::table_name(), "user_account");
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EntityError;
use crate::naming::{to_camel_case, to_snake_case};

/// Generic key-value view of an entity or a result row.
pub type Record = serde_json::Map<String, Value>;

pub const ID_COLUMN: &str = "id";
pub const CREATED_AT_COLUMN: &str = "created_at";
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Columns whose values are assigned by the store, never by callers.
pub const TIMESTAMP_COLUMNS: [&str; 2] = [CREATED_AT_COLUMN, UPDATED_AT_COLUMN];

/// How an entity type's primary key is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Auto-incrementing integer assigned by the store.
    AutoIncrement,
    /// UUID generated client-side before insert.
    Uuid,
}

/// A primary key value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Uuid(Uuid),
}

impl EntityId {
    /// Read a key from a record value. Strings are accepted only when they parse as UUIDs.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Uuid::parse_str(s).ok().map(Self::Uuid),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(id) => Value::from(*id),
            Self::Uuid(id) => Value::String(id.to_string()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Uuid(id) => write!(f, "{id}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

/// Key casing for [`Entity::to_record_cased`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyCase {
    #[default]
    Snake,
    Camel,
}

/// Base contract for persisted entity types.
///
/// Implementors declare their type name, key strategy and domain fields; the
/// `id`, `created_at` and `updated_at` columns are implied for every entity.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name the table name is derived from.
    const TYPE_NAME: &'static str;
    const PRIMARY_KEY: KeyStrategy;
    /// Domain columns, excluding `id` and the timestamps.
    const FIELDS: &'static [&'static str];

    /// Primary key, absent until assigned.
    fn id(&self) -> Option<EntityId>;

    /// Storage name: the snake_case form of [`Entity::TYPE_NAME`].
    fn table_name() -> String {
        to_snake_case(Self::TYPE_NAME)
    }

    /// Every column of the entity: `id`, the domain fields, then the timestamps.
    fn columns() -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(Self::FIELDS.len() + 3);
        columns.push(ID_COLUMN);
        columns.extend_from_slice(Self::FIELDS);
        columns.extend(TIMESTAMP_COLUMNS);
        columns
    }

    fn has_column(name: &str) -> bool {
        name == ID_COLUMN || Self::FIELDS.contains(&name) || TIMESTAMP_COLUMNS.contains(&name)
    }

    /// Serialize to a generic mapping keyed by column name.
    fn to_record(&self) -> Result<Record, EntityError> {
        let value = serde_json::to_value(self).map_err(|source| EntityError::Conversion {
            entity: Self::TYPE_NAME,
            source,
        })?;
        match value {
            Value::Object(record) => Ok(record),
            _ => Err(EntityError::NotAMapping {
                entity: Self::TYPE_NAME,
            }),
        }
    }

    fn to_record_cased(&self, case: KeyCase) -> Result<Record, EntityError> {
        let record = self.to_record()?;
        Ok(match case {
            KeyCase::Snake => record,
            KeyCase::Camel => record
                .into_iter()
                .map(|(key, value)| (to_camel_case(&key), value))
                .collect(),
        })
    }

    /// Build an instance from a mapping, ignoring keys that are not columns
    /// and keys whose value is null.
    fn from_record(record: Record) -> Result<Self, EntityError> {
        let filtered: Record = record
            .into_iter()
            .filter(|(key, value)| !value.is_null() && Self::has_column(key))
            .collect();
        serde_json::from_value(Value::Object(filtered)).map_err(|source| EntityError::Conversion {
            entity: Self::TYPE_NAME,
            source,
        })
    }

    /// Factory from keyword-style `(column, value)` pairs.
    fn build<I, K>(fields: I) -> Result<Self, EntityError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::from_record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Assign every key of `payload` to the matching field in place.
    ///
    /// Unknown keys are rejected and leave the instance untouched.
    fn update(&mut self, payload: &Record) -> Result<(), EntityError> {
        let mut record = self.to_record()?;
        for (key, value) in payload {
            if !Self::has_column(key) {
                return Err(EntityError::UnknownField {
                    entity: Self::TYPE_NAME,
                    field: key.clone(),
                });
            }
            record.insert(key.clone(), value.clone());
        }
        *self = Self::from_record(record)?;
        Ok(())
    }

    /// Copy every column of `other` onto `self`.
    fn merge_from(&mut self, other: &Self) -> Result<(), EntityError> {
        let record = other.to_record()?;
        self.update(&record)
    }
}
