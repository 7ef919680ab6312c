use thiserror::Error;

/// Boxed cause carried by [`DataError::StoreOperation`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for data-access operations.
pub type DataResult<T> = Result<T, DataError>;

/// Errors surfaced by the data-access layer.
#[derive(Debug, Error)]
pub enum DataError {
    /// The pool could not be created or a connection could not be leased.
    #[error("connection error: {message}")]
    Connection { message: String },

    /// A session-bound operation was attempted outside any open scope, or on a
    /// session that has already been closed.
    #[error("no active session for {operation}")]
    NoActiveSession { operation: &'static str },

    #[error("repository not registered: {name}")]
    RepositoryNotFound { name: String },

    #[error("invalid pagination: page size {page_size} and page number {page_number} must both be positive")]
    InvalidPagination { page_size: i64, page_number: i64 },

    /// The store rejected or failed a statement. The original cause is kept as
    /// the error source.
    #[error("store operation '{operation}' failed: {source}")]
    StoreOperation {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// A caller-supplied record or payload cannot be applied to the entity.
    #[error("invalid record for {entity}: {message}")]
    InvalidRecord { entity: String, message: String },
}

impl DataError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn store(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::StoreOperation {
            operation,
            source: source.into(),
        }
    }

    pub fn invalid_record(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

/// Errors converting between entities and generic records.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("{entity} did not serialize to a key-value mapping")]
    NotAMapping { entity: &'static str },

    #[error("{entity} has no field '{field}'")]
    UnknownField { entity: &'static str, field: String },

    #[error("failed to convert {entity}: {source}")]
    Conversion {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl EntityError {
    pub fn entity(&self) -> &'static str {
        match self {
            Self::NotAMapping { entity }
            | Self::UnknownField { entity, .. }
            | Self::Conversion { entity, .. } => entity,
        }
    }
}

impl From<EntityError> for DataError {
    fn from(err: EntityError) -> Self {
        DataError::invalid_record(err.entity(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_invalid_pagination_display() {
        let err = DataError::InvalidPagination {
            page_size: 0,
            page_number: 1,
        };
        assert_eq!(
            err.to_string(),
            "invalid pagination: page size 0 and page number 1 must both be positive"
        );
    }

    #[test]
    fn test_store_operation_keeps_source() {
        let cause = std::io::Error::other("disk full");
        let err = DataError::store("flush", cause);
        assert!(err.to_string().contains("flush"));
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("disk full"));
    }

    #[test]
    fn test_entity_error_converts_to_invalid_record() {
        let err: DataError = EntityError::UnknownField {
            entity: "Account",
            field: "nickname".to_string(),
        }
        .into();
        match err {
            DataError::InvalidRecord { entity, message } => {
                assert_eq!(entity, "Account");
                assert!(message.contains("nickname"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
