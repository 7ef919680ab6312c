//! Parameterized statements executed by sessions and repositories.
//!
//! A [`Statement`] is SQL text with positional `?` placeholders and the
//! values bound to them. Entity-aware constructors derive table and column
//! names from the [`Entity`] contract. Conditions, sort terms and appended
//! fragments are kept per clause and rendered in SQL order.

use std::fmt;

use serde_json::Value;
use unitas_types::entity::{Entity, EntityId, ID_COLUMN, Record, TIMESTAMP_COLUMNS, UPDATED_AT_COLUMN};
use unitas_types::error::{DataError, DataResult};

use crate::pagination::Page;

/// Store expression for the current instant, formatted as RFC 3339 in UTC.
///
/// Generated updates assign it to `updated_at`; schemas use it as the column
/// default for both timestamps.
pub const TIMESTAMP_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Sort direction for [`Statement::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Quote an identifier, doubling any embedded quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A statement's text kept as separate clauses so conditions and sort
/// terms land in the right place whatever order the builder is called in.
///
/// Rendered order: head, `WHERE`, grouping, `ORDER BY`, the rest of the raw
/// text (`LIMIT`, `RETURNING`, ...), then appended fragments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    head: String,
    /// Raw text from the first top-level `GROUP BY` up to `ORDER BY` or the rest.
    group: String,
    /// Raw text from the first top-level `LIMIT`/`OFFSET`/`RETURNING` on.
    rest: String,
    /// Placeholders in `head`, which decides where condition params go.
    head_placeholders: usize,
    raw_params: Vec<Value>,
    raw_where: bool,
    conditions: Vec<String>,
    condition_params: Vec<Value>,
    order: Vec<String>,
    tail: Vec<String>,
    tail_params: Vec<Value>,
    bind_to: Clause,
    sql: String,
    params: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Clause {
    #[default]
    Raw,
    Condition,
    Tail,
}

impl Statement {
    /// A statement from raw SQL. Top-level `WHERE`, `GROUP BY`, `ORDER BY`,
    /// `LIMIT`, `OFFSET` and `RETURNING` clauses in it are recognised, so
    /// later conditions and sort terms extend them.
    pub fn new(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let words = top_level_words(&sql);
        // Byte range of the first top-level run of `keywords`.
        let find = |keywords: &[&str]| -> Option<(usize, usize)> {
            (0..words.len()).find_map(|i| {
                let window = words.get(i..i + keywords.len())?;
                window
                    .iter()
                    .zip(keywords)
                    .all(|((_, _, word), keyword)| word.eq_ignore_ascii_case(keyword))
                    .then(|| (window[0].0, window[keywords.len() - 1].1))
            })
        };

        let group_at = find(&["GROUP", "BY"]).map(|(start, _)| start);
        let order_at = find(&["ORDER", "BY"]);
        let rest_at = [find(&["LIMIT"]), find(&["OFFSET"]), find(&["RETURNING"])]
            .into_iter()
            .flatten()
            .map(|(start, _)| start)
            .min();

        let len = sql.len();
        let rest_start = rest_at.unwrap_or(len);
        let order_start = order_at.map_or(rest_start, |(start, _)| start.min(rest_start));
        let head_end = group_at.map_or(order_start, |start| start.min(order_start));

        let head = sql[..head_end].trim_end().to_string();
        let group = sql[head_end..order_start].trim().to_string();
        let mut order = Vec::new();
        if let Some((_, by_end)) = order_at.filter(|(start, _)| *start < rest_start) {
            let terms = sql[by_end..rest_start].trim();
            if !terms.is_empty() {
                order.push(terms.to_string());
            }
        }
        let rest = sql[rest_start..].trim().to_string();
        let raw_where = words
            .iter()
            .any(|(start, _, word)| *start < head_end && word.eq_ignore_ascii_case("WHERE"));

        Self {
            head_placeholders: count_placeholders(&head),
            head,
            group,
            rest,
            raw_where,
            order,
            ..Self::default()
        }
        .rendered()
    }

    fn from_parts(sql: String, params: Vec<Value>) -> Self {
        Self {
            head_placeholders: params.len(),
            head: sql,
            raw_params: params,
            ..Self::default()
        }
        .rendered()
    }

    /// `SELECT * FROM <table>`.
    pub fn select<E: Entity>() -> Self {
        Self::new(format!("SELECT * FROM {}", quote_ident(&E::table_name())))
    }

    /// `SELECT COUNT(*) AS total FROM <table>`.
    pub fn count<E: Entity>() -> Self {
        Self::new(format!(
            "SELECT COUNT(*) AS total FROM {}",
            quote_ident(&E::table_name())
        ))
    }

    /// Multi-row `INSERT`. Every row must carry the same columns as the first.
    pub fn insert<E: Entity>(rows: &[Record]) -> DataResult<Self> {
        let table = quote_ident(&E::table_name());
        let first = rows
            .first()
            .ok_or_else(|| DataError::invalid_record(E::TYPE_NAME, "insert needs at least one row"))?;

        if first.is_empty() {
            if rows.len() == 1 {
                return Ok(Self::new(format!("INSERT INTO {table} DEFAULT VALUES")));
            }
            return Err(DataError::invalid_record(
                E::TYPE_NAME,
                "multi-row insert needs at least one column",
            ));
        }

        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        if let Some(unknown) = columns.iter().find(|c| !E::has_column(c)) {
            return Err(DataError::invalid_record(
                E::TYPE_NAME,
                format!("unknown column '{unknown}'"),
            ));
        }

        let mut params = Vec::with_capacity(rows.len() * columns.len());
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() || columns.iter().any(|c| !row.contains_key(*c)) {
                return Err(DataError::invalid_record(
                    E::TYPE_NAME,
                    format!("row {index} does not have the same columns as the first row"),
                ));
            }
            params.extend(
                columns
                    .iter()
                    .map(|c| row.get(*c).cloned().unwrap_or(Value::Null)),
            );
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let tuple = format!("({})", vec!["?"; columns.len()].join(", "));
        let values = vec![tuple; rows.len()].join(", ");

        Ok(Self::from_parts(
            format!("INSERT INTO {table} ({column_list}) VALUES {values}"),
            params,
        ))
    }

    /// `UPDATE <table> SET ...`, always stamping `updated_at`.
    ///
    /// The key and the timestamps cannot be assigned.
    pub fn update<E: Entity>(assignments: &Record) -> DataResult<Self> {
        let mut sets = Vec::with_capacity(assignments.len() + 1);
        let mut params = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            if column == ID_COLUMN || TIMESTAMP_COLUMNS.contains(&column.as_str()) {
                return Err(DataError::invalid_record(
                    E::TYPE_NAME,
                    format!("column '{column}' cannot be assigned by an update"),
                ));
            }
            if !E::has_column(column) {
                return Err(DataError::invalid_record(
                    E::TYPE_NAME,
                    format!("unknown column '{column}'"),
                ));
            }
            sets.push(format!("{} = ?", quote_ident(column)));
            params.push(value.clone());
        }
        sets.push(format!("{} = {TIMESTAMP_NOW}", quote_ident(UPDATED_AT_COLUMN)));

        Ok(Self::from_parts(
            format!(
                "UPDATE {} SET {}",
                quote_ident(&E::table_name()),
                sets.join(", ")
            ),
            params,
        ))
    }

    /// `DELETE FROM <table>`.
    pub fn delete<E: Entity>() -> Self {
        Self::new(format!("DELETE FROM {}", quote_ident(&E::table_name())))
    }

    /// Add a condition, joined with `AND` to any earlier condition.
    pub fn filter(mut self, clause: &str, params: impl IntoIterator<Item = Value>) -> Self {
        self.conditions.push(clause.to_string());
        self.condition_params.extend(params);
        self.bind_to = Clause::Condition;
        self.rendered()
    }

    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        let clause = format!("{} = ?", quote_ident(column));
        self.filter(&clause, [value.into()])
    }

    pub fn where_id(self, id: &EntityId) -> Self {
        self.where_eq(ID_COLUMN, id.to_value())
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order
            .push(format!("{} {}", quote_ident(column), order.as_sql()));
        self.rendered()
    }

    /// `RETURNING` the given columns, or every column when empty.
    pub fn returning(self, columns: &[&str]) -> Self {
        if columns.is_empty() {
            return self.push("RETURNING *");
        }
        let list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        self.push(&format!("RETURNING {list}"))
    }

    /// `LIMIT ? OFFSET ?` for the page.
    pub fn paginate(self, page: &Page) -> Self {
        self.push("LIMIT ? OFFSET ?")
            .bind(page.limit())
            .bind(page.offset())
    }

    /// Append raw SQL after everything else in the statement.
    pub fn push(mut self, fragment: &str) -> Self {
        self.tail.push(fragment.trim().to_string());
        self.bind_to = Clause::Tail;
        self.rendered()
    }

    /// Bind the value for the next placeholder of the most recently added
    /// raw text or condition.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.bind_to {
            Clause::Raw => self.raw_params.push(value),
            Clause::Condition => self.condition_params.push(value),
            Clause::Tail => self.tail_params.push(value),
        }
        self.rendered()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    fn rendered(mut self) -> Self {
        let mut parts: Vec<String> = Vec::new();
        parts.push(self.head.clone());
        if !self.conditions.is_empty() {
            let keyword = if self.raw_where { "AND" } else { "WHERE" };
            parts.push(format!("{keyword} {}", self.conditions.join(" AND ")));
        }
        parts.push(self.group.clone());
        if !self.order.is_empty() {
            parts.push(format!("ORDER BY {}", self.order.join(", ")));
        }
        parts.push(self.rest.clone());
        parts.extend(self.tail.iter().cloned());
        parts.retain(|part| !part.is_empty());
        self.sql = parts.join(" ");

        let split = self.head_placeholders.min(self.raw_params.len());
        self.params = self.raw_params[..split]
            .iter()
            .chain(&self.condition_params)
            .chain(&self.raw_params[split..])
            .chain(&self.tail_params)
            .cloned()
            .collect();
        self
    }
}

/// Words outside quotes and parentheses, with their byte ranges.
fn top_level_words(sql: &str) -> Vec<(usize, usize, &str)> {
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut word_start: Option<usize> = None;

    for (index, ch) in sql.char_indices() {
        let is_word = ch.is_ascii_alphanumeric() || ch == '_';
        if let Some(start) = word_start.filter(|_| !is_word) {
            if depth == 0 {
                words.push((start, index, &sql[start..index]));
            }
            word_start = None;
        }
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ if is_word && word_start.is_none() => word_start = Some(index),
                _ => {}
            },
        }
    }
    if let Some(start) = word_start.filter(|_| depth == 0) {
        words.push((start, sql.len(), &sql[start..]));
    }
    words
}

/// `?` placeholders outside quoted text.
fn count_placeholders(sql: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut count = 0;
    for ch in sql.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' | '`' => quote = Some(ch),
                '[' => quote = Some(']'),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use unitas_types::entity::KeyStrategy;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct LineItem {
        id: Option<i64>,
        sku: String,
        quantity: i64,
    }

    impl Entity for LineItem {
        const TYPE_NAME: &'static str = "LineItem";
        const PRIMARY_KEY: KeyStrategy = KeyStrategy::AutoIncrement;
        const FIELDS: &'static [&'static str] = &["sku", "quantity"];

        fn id(&self) -> Option<EntityId> {
            self.id.map(EntityId::Int)
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_select_with_filters_and_order() {
        let stmt = Statement::select::<LineItem>()
            .where_eq("sku", "A-1")
            .filter("\"quantity\" > ?", [json!(2)])
            .order_by("id", Order::Desc)
            .order_by("sku", Order::Asc);
        assert_eq!(
            stmt.sql(),
            "SELECT * FROM \"line_item\" WHERE \"sku\" = ? AND \"quantity\" > ? ORDER BY \"id\" DESC, \"sku\" ASC"
        );
        assert_eq!(stmt.params(), &[json!("A-1"), json!(2)]);
    }

    #[test]
    fn test_raw_where_is_detected() {
        let stmt = Statement::new("SELECT * FROM line_item WHERE quantity > 1").where_eq("sku", "B");
        assert_eq!(
            stmt.sql(),
            "SELECT * FROM line_item WHERE quantity > 1 AND \"sku\" = ?"
        );
    }

    #[test]
    fn test_clause_order_does_not_depend_on_call_order() {
        let page = Page::new(5, 2).unwrap();
        let stmt = Statement::select::<LineItem>()
            .order_by("id", Order::Asc)
            .paginate(&page)
            .where_eq("sku", "A-1")
            .order_by("sku", Order::Desc);
        assert_eq!(
            stmt.sql(),
            "SELECT * FROM \"line_item\" WHERE \"sku\" = ? ORDER BY \"id\" ASC, \"sku\" DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(stmt.params(), &[json!("A-1"), json!(5), json!(5)]);
    }

    #[test]
    fn test_raw_clauses_are_found_across_lines() {
        let stmt = Statement::new("SELECT *\nFROM line_item\nWHERE quantity > ?\nORDER BY id\nLIMIT ?")
            .bind(1)
            .bind(10)
            .where_eq("sku", "B")
            .order_by("sku", Order::Asc);
        assert_eq!(
            stmt.sql(),
            "SELECT *\nFROM line_item\nWHERE quantity > ? AND \"sku\" = ? ORDER BY id, \"sku\" ASC LIMIT ?"
        );
        assert_eq!(stmt.params(), &[json!(1), json!("B"), json!(10)]);
    }

    #[test]
    fn test_where_inside_subquery_or_literal_is_not_a_clause() {
        let stmt = Statement::new(
            "SELECT * FROM line_item WHERE_ROOT IN (SELECT id FROM line_item WHERE quantity > 1) \
             GROUP BY sku",
        )
        .filter("label <> ' ORDER BY '", std::iter::empty());
        assert!(stmt.sql().contains(
            "(SELECT id FROM line_item WHERE quantity > 1) WHERE label <> ' ORDER BY ' GROUP BY sku"
        ));
    }

    #[test]
    fn test_multi_row_insert() {
        let rows = vec![
            record(json!({"sku": "A", "quantity": 1})),
            record(json!({"sku": "B", "quantity": 2})),
        ];
        let stmt = Statement::insert::<LineItem>(&rows).unwrap().returning(&["id"]);
        let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        let column_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        assert_eq!(
            stmt.sql(),
            format!("INSERT INTO \"line_item\" ({column_list}) VALUES (?, ?), (?, ?) RETURNING \"id\"")
        );
        let expected: Vec<Value> = rows
            .iter()
            .flat_map(|row| columns.iter().map(|c| row[*c].clone()))
            .collect();
        assert_eq!(stmt.params(), expected.as_slice());
    }

    #[test]
    fn test_insert_rejects_mismatched_rows() {
        let rows = vec![
            record(json!({"sku": "A", "quantity": 1})),
            record(json!({"sku": "B"})),
        ];
        let err = Statement::insert::<LineItem>(&rows).unwrap_err();
        assert!(matches!(err, DataError::InvalidRecord { .. }));
        assert!(Statement::insert::<LineItem>(&[]).is_err());
    }

    #[test]
    fn test_update_stamps_updated_at() {
        let stmt = Statement::update::<LineItem>(&record(json!({"quantity": 5})))
            .unwrap()
            .where_id(&EntityId::Int(9));
        assert_eq!(
            stmt.sql(),
            format!("UPDATE \"line_item\" SET \"quantity\" = ?, \"updated_at\" = {TIMESTAMP_NOW} WHERE \"id\" = ?")
        );
        assert_eq!(stmt.params(), &[json!(5), json!(9)]);
    }

    #[test]
    fn test_update_rejects_managed_columns() {
        for column in ["id", "created_at", "updated_at"] {
            let mut payload = Record::new();
            payload.insert(column.to_string(), json!("x"));
            assert!(Statement::update::<LineItem>(&payload).is_err(), "{column}");
        }
    }

    #[test]
    fn test_paginate_binds_limit_and_offset() {
        let page = Page::new(10, 3).unwrap();
        let stmt = Statement::select::<LineItem>()
            .order_by("id", Order::Asc)
            .paginate(&page);
        assert!(stmt.sql().ends_with("ORDER BY \"id\" ASC LIMIT ? OFFSET ?"));
        assert_eq!(stmt.params(), &[json!(10), json!(20)]);
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
