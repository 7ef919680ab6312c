//! Conversion between statement values and SQLite rows.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Column, Database, Row, TypeInfo, ValueRef};
use unitas_core::statement::Statement;
use unitas_types::entity::Record;
use unitas_types::error::{DataError, DataResult};

type SqliteQuery<'q> = Query<'q, Sqlite, <Sqlite as Database>::Arguments<'q>>;

/// Prepare `statement` with its parameters bound in order.
pub(crate) fn query(statement: &Statement) -> SqliteQuery<'_> {
    statement
        .params()
        .iter()
        .fold(sqlx::query(statement.sql()), bind_value)
}

// Arrays and objects are stored as JSON text.
fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Decode a row into a record keyed by column name.
///
/// Columns declared `BOOLEAN` become booleans and BLOBs become base64 text;
/// everything else follows the value's storage class.
pub(crate) fn decode_row(row: &SqliteRow) -> DataResult<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| DataError::store("decode", e))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let declared = column.type_info().name().to_ascii_uppercase();
            let storage = raw.type_info().name().to_ascii_uppercase();
            decode_value(row, index, &declared, &storage)?
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

fn decode_value(row: &SqliteRow, index: usize, declared: &str, storage: &str) -> DataResult<Value> {
    let decode_err = |e: sqlx::Error| DataError::store("decode", e);
    if declared == "BOOLEAN" || declared == "BOOL" {
        return row.try_get_unchecked::<bool, _>(index).map(Value::Bool).map_err(decode_err);
    }
    let value = match storage {
        "INTEGER" | "INT4" | "INT8" | "BIGINT" | "BOOLEAN" => {
            Value::from(row.try_get_unchecked::<i64, _>(index).map_err(decode_err)?)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            Value::from(row.try_get_unchecked::<f64, _>(index).map_err(decode_err)?)
        }
        "BLOB" => {
            let bytes = row.try_get_unchecked::<Vec<u8>, _>(index).map_err(decode_err)?;
            Value::String(BASE64.encode(bytes))
        }
        _ => Value::String(row.try_get_unchecked::<String, _>(index).map_err(decode_err)?),
    };
    Ok(value)
}
