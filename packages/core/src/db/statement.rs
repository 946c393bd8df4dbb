//! Statements, Bound Values and Raw Identifiers
//!
//! Every statement the data space sends to the engine is a [`Statement`]: SQL
//! text plus the values bound to its `?` placeholders. Statements are built from
//! three kinds of fragments that never mix:
//!
//! - static SQL text (`&'static str`, must not carry placeholders)
//! - raw identifiers ([`Identifier`], rendered double-quoted as table/column names)
//! - bound values ([`SqlValue`], always sent as parameters, never interpolated)
//!
//! ```rust
//! use dataspace_core::db::{Identifier, Statement};
//!
//! let table = Identifier::new("tb_3f2a").unwrap();
//! let stmt = Statement::builder()
//!     .sql("SELECT * FROM ")
//!     .ident(&table)
//!     .sql(" WHERE title = ")
//!     .bind("Tasks")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(stmt.sql(), "SELECT * FROM \"tb_3f2a\" WHERE title = ?");
//! assert_eq!(stmt.params().len(), 1);
//! ```

use crate::db::error::DatabaseError;
use crate::db::sql_parser::{self, count_placeholders};
use crate::models::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Longest identifier accepted from callers
const MAX_IDENTIFIER_LEN: usize = 128;

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert a JSON value coming from an action argument or an import.
    ///
    /// Arrays and objects are stored as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SqlValue::Null => serde_json::Value::Null,
            SqlValue::Integer(i) => serde_json::Value::from(*i),
            SqlValue::Real(f) => serde_json::Value::from(*f),
            SqlValue::Text(s) => serde_json::Value::from(s.as_str()),
            SqlValue::Blob(b) => serde_json::Value::from(b.clone()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl From<SqlValue> for libsql::Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => libsql::Value::Null,
            SqlValue::Integer(i) => libsql::Value::Integer(i),
            SqlValue::Real(f) => libsql::Value::Real(f),
            SqlValue::Text(s) => libsql::Value::Text(s),
            SqlValue::Blob(b) => libsql::Value::Blob(b),
        }
    }
}

impl From<libsql::Value> for SqlValue {
    fn from(value: libsql::Value) -> Self {
        match value {
            libsql::Value::Null => SqlValue::Null,
            libsql::Value::Integer(i) => SqlValue::Integer(i),
            libsql::Value::Real(f) => SqlValue::Real(f),
            libsql::Value::Text(s) => SqlValue::Text(s),
            libsql::Value::Blob(b) => SqlValue::Blob(b),
        }
    }
}

/// A table or column name interpolated structurally into SQL text
///
/// Identifiers built with [`Identifier::new`] are restricted to
/// `[A-Za-z_][A-Za-z0-9_]*`, so a bound value can never be smuggled into an
/// identifier position. Rendering always double-quotes the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.len() > MAX_IDENTIFIER_LEN || !IDENTIFIER_RE.is_match(&name) {
            return Err(ValidationError::InvalidIdentifier(name));
        }
        Ok(Self(name))
    }

    /// Name reported by the engine itself (e.g. `pragma_table_info`).
    ///
    /// Such names may contain characters rejected by [`Identifier::new`]; they
    /// are still rendered quoted with embedded quotes doubled.
    pub(crate) fn from_engine(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0.replace('"', "\"\""))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse statement classification used to decide what a caller must refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// SELECT, WITH, PRAGMA, EXPLAIN, VALUES
    Read,
    /// INSERT, UPDATE, DELETE, REPLACE
    Write,
    /// CREATE, DROP, ALTER
    Schema,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT, RELEASE; never accepted as free-form SQL
    Transaction,
    Other,
}

impl StatementKind {
    /// Kind of the first statement in `sql`; unreadable text is `Other`
    pub fn classify(sql: &str) -> Self {
        sql_parser::inspect(sql)
            .map(|(kind, _)| kind)
            .unwrap_or(StatementKind::Other)
    }

    /// Whether the catalog or field metadata may be stale after running it
    pub fn changes_schema(&self) -> bool {
        matches!(self, StatementKind::Schema)
    }
}

/// SQL text with its bound values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    sql: String,
    #[serde(default)]
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn builder() -> StatementBuilder {
        StatementBuilder::default()
    }

    /// Static SQL over fixed tables with positional values.
    ///
    /// Fails if the number of `?` placeholders differs from `params.len()`.
    pub fn with_params(sql: &'static str, params: Vec<SqlValue>) -> Result<Self, ValidationError> {
        let placeholders = count_placeholders(sql)?;
        if placeholders != params.len() {
            return Err(ValidationError::PlaceholderMismatch {
                placeholders,
                values: params.len(),
            });
        }
        Ok(Self {
            sql: sql.to_string(),
            params,
        })
    }

    /// Static SQL without placeholders
    pub fn text(sql: &'static str) -> Result<Self, ValidationError> {
        Self::with_params(sql, Vec::new())
    }

    /// SQL produced by the engine itself, such as a `sqlite_master.sql` definition
    /// captured before a table is dropped.
    pub(crate) fn from_engine(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    pub(crate) fn rendered(sql: String, params: Vec<SqlValue>) -> Self {
        Self { sql, params }
    }

    /// `INSERT INTO <table> (<cols>) VALUES (<values>)` for a captured row
    pub fn insert_row(table: &Identifier, row: &SqlRow) -> Result<Self, ValidationError> {
        let columns: Vec<Identifier> = row.columns().iter().map(Identifier::from_engine).collect();
        Statement::builder()
            .sql("INSERT INTO ")
            .ident(table)
            .sql(" (")
            .idents(&columns)
            .sql(") VALUES (")
            .bind_all(row.values().iter().cloned())
            .sql(")")
            .build()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn kind(&self) -> StatementKind {
        StatementKind::classify(&self.sql)
    }

    pub(crate) fn libsql_params(&self) -> libsql::params::Params {
        libsql::params::Params::Positional(self.params.iter().cloned().map(Into::into).collect())
    }
}

/// Incremental statement construction from typed fragments
///
/// The first invalid fragment is remembered and reported by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct StatementBuilder {
    sql: String,
    params: Vec<SqlValue>,
    error: Option<ValidationError>,
}

impl StatementBuilder {
    /// Append static SQL text. Text carrying a `?` is rejected.
    pub fn sql(mut self, text: &'static str) -> Self {
        if self.error.is_none() {
            match count_placeholders(text) {
                Ok(0) => self.sql.push_str(text),
                Ok(_) => self.error = Some(ValidationError::InlinePlaceholder(text.to_string())),
                Err(e) => self.error = Some(e),
            }
        }
        self
    }

    pub fn ident(mut self, ident: &Identifier) -> Self {
        self.sql.push_str(&ident.quoted());
        self
    }

    /// Comma separated identifier list
    pub fn idents(mut self, idents: &[Identifier]) -> Self {
        let list: Vec<String> = idents.iter().map(Identifier::quoted).collect();
        self.sql.push_str(&list.join(", "));
        self
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.sql.push('?');
        self.params.push(value.into());
        self
    }

    /// Comma separated placeholders, one per value
    pub fn bind_all(mut self, values: impl IntoIterator<Item = SqlValue>) -> Self {
        let mut first = true;
        for value in values {
            if !first {
                self.sql.push_str(", ");
            }
            first = false;
            self.sql.push('?');
            self.params.push(value);
        }
        self
    }

    pub fn build(self) -> Result<Statement, ValidationError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Statement {
                sql: self.sql,
                params: self.params,
            }),
        }
    }
}

/// One result row, columns in engine order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    fn require(&self, column: &str) -> Result<&SqlValue, DatabaseError> {
        self.get(column)
            .ok_or_else(|| DatabaseError::row_decode(column, "present column"))
    }

    pub fn text(&self, column: &str) -> Result<String, DatabaseError> {
        self.opt_text(column)?
            .ok_or_else(|| DatabaseError::row_decode(column, "non-null text"))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, DatabaseError> {
        match self.require(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Integer(i) => Ok(Some(i.to_string())),
            SqlValue::Real(f) => Ok(Some(f.to_string())),
            SqlValue::Blob(_) => Err(DatabaseError::row_decode(column, "text")),
        }
    }

    pub fn integer(&self, column: &str) -> Result<i64, DatabaseError> {
        match self.require(column)? {
            SqlValue::Integer(i) => Ok(*i),
            SqlValue::Real(f) => Ok(*f as i64),
            _ => Err(DatabaseError::row_decode(column, "integer")),
        }
    }

    pub fn real(&self, column: &str) -> Result<f64, DatabaseError> {
        match self.require(column)? {
            SqlValue::Integer(i) => Ok(*i as f64),
            SqlValue::Real(f) => Ok(*f),
            _ => Err(DatabaseError::row_decode(column, "real")),
        }
    }

    pub fn boolean(&self, column: &str) -> Result<bool, DatabaseError> {
        Ok(self.integer(column)? != 0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .cloned()
            .zip(self.values.iter().map(SqlValue::to_json))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(Identifier::new("tb_abc123").is_ok());
        assert!(Identifier::new("_id").is_ok());
        assert!(Identifier::new("1abc").is_err());
        assert!(Identifier::new("title; DROP TABLE x").is_err());
        assert!(Identifier::new("'Tasks'").is_err());
        assert!(Identifier::new("").is_err());
    }

    #[test]
    fn test_engine_identifier_quotes_are_doubled() {
        let ident = Identifier::from_engine("odd\"name");
        assert_eq!(ident.quoted(), "\"odd\"\"name\"");
    }

    #[test]
    fn test_builder_rejects_inline_placeholder() {
        let err = Statement::builder()
            .sql("SELECT * FROM t WHERE id = ?")
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InlinePlaceholder(_)));
    }

    #[test]
    fn test_builder_allows_question_mark_inside_literal() {
        let stmt = Statement::builder()
            .sql("SELECT 'why?' AS q")
            .build()
            .unwrap();
        assert_eq!(stmt.sql(), "SELECT 'why?' AS q");
    }

    #[test]
    fn test_with_params_checks_count() {
        assert!(Statement::with_params("SELECT ?", vec![1.into()]).is_ok());
        let err = Statement::with_params("SELECT ?, ?", vec![1.into()]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::PlaceholderMismatch {
                placeholders: 2,
                values: 1
            }
        );
        assert!(matches!(
            Statement::with_params("SELECT ?1", vec![1.into()]),
            Err(ValidationError::UnsupportedPlaceholder(_))
        ));
    }

    #[test]
    fn test_insert_row_statement() {
        let row = SqlRow::new(
            vec!["_id".to_string(), "title".to_string()],
            vec!["r1".into(), SqlValue::Null],
        );
        let table = Identifier::new("tb_x").unwrap();
        let stmt = Statement::insert_row(&table, &row).unwrap();
        assert_eq!(
            stmt.sql(),
            "INSERT INTO \"tb_x\" (\"_id\", \"title\") VALUES (?, ?)"
        );
        assert_eq!(stmt.params(), &[SqlValue::from("r1"), SqlValue::Null]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(StatementKind::classify("  select 1"), StatementKind::Read);
        assert_eq!(
            StatementKind::classify("-- note\nINSERT INTO t VALUES (1)"),
            StatementKind::Write
        );
        assert_eq!(
            StatementKind::classify("/* x */ CREATE TABLE t (a)"),
            StatementKind::Schema
        );
        assert_eq!(StatementKind::classify("commit"), StatementKind::Transaction);
        assert_eq!(StatementKind::classify("VACUUM"), StatementKind::Other);
    }

    #[test]
    fn test_builder_ignores_question_mark_in_comment() {
        let stmt = Statement::builder()
            .sql("SELECT 1 -- why?\n")
            .build()
            .unwrap();
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_value_json_conversion() {
        assert_eq!(SqlValue::from_json(&serde_json::json!(true)), SqlValue::Integer(1));
        assert_eq!(SqlValue::from_json(&serde_json::json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(
            SqlValue::from_json(&serde_json::json!({"a": 1})),
            SqlValue::Text("{\"a\":1}".to_string())
        );
    }
}
