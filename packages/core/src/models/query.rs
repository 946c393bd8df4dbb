//! Structured View Queries
//!
//! A saved view stores its query as SQL text. To edit sorting and filtering the
//! text is parsed with sqlparser into a [`SelectStatement`], changed through
//! typed methods on the AST and serialized back. Supported shape:
//!
//! ```text
//! SELECT [DISTINCT] <projection> FROM <single table>
//!     [WHERE <expr>] [ORDER BY <expr> [ASC|DESC], ...] [LIMIT <n> [OFFSET <m>]]
//! ```
//!
//! Anything else (joins, grouping, compound selects, derived sources, several
//! statements) is rejected.
//!
//! ```rust
//! use dataspace_core::models::{SelectStatement, SortDirection};
//!
//! let mut query = SelectStatement::parse("select * from tb_1 where done = 0").unwrap();
//! query.sort_by("title", SortDirection::Desc).unwrap();
//! assert_eq!(
//!     query.to_string(),
//!     "SELECT * FROM tb_1 WHERE done = 0 ORDER BY title DESC"
//! );
//! ```

use crate::db::Identifier;
use crate::models::ValidationError;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{Expr, GroupByExpr, OrderByExpr, Query, SetExpr, Statement, TableFactor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::Token;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn is_asc(&self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(ValidationError::invalid_argument(format!(
                "sort direction must be asc or desc, got '{s}'"
            )))
        }
    }
}

/// Parsed single-table SELECT
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    query: Box<Query>,
    source: String,
}

impl SelectStatement {
    /// `SELECT * FROM <table>`, the canonical query of a table's first view
    pub fn select_all(table: &Identifier) -> Result<Self, ValidationError> {
        Self::parse(&format!("SELECT * FROM {}", table.as_str()))
            .or_else(|_| Self::parse(&format!("SELECT * FROM {}", table.quoted())))
    }

    pub fn parse(sql: &str) -> Result<Self, ValidationError> {
        let dialect = SQLiteDialect {};
        let mut statements = Parser::parse_sql(&dialect, sql).map_err(parse_error)?;
        if statements.len() != 1 {
            return Err(ValidationError::invalid_query(
                "expected exactly one SELECT statement",
            ));
        }
        let query = match statements.remove(0) {
            Statement::Query(query) => query,
            other => {
                return Err(ValidationError::invalid_query(format!(
                    "expected a SELECT statement, got: {other}"
                )))
            }
        };
        let source = single_source(&query)?;
        Ok(Self { query, source })
    }

    /// Unquoted name of the table the query reads
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filter(&self) -> Option<String> {
        match self.query.body.as_ref() {
            SetExpr::Select(select) => select.selection.as_ref().map(ToString::to_string),
            _ => None,
        }
    }

    pub fn order_by(&self) -> &[OrderByExpr] {
        &self.query.order_by
    }

    /// Sort by `column`: flip an existing term whose direction differs, leave an
    /// identical term alone, otherwise append. Returns whether anything changed.
    pub fn sort_by(
        &mut self,
        column: &str,
        direction: SortDirection,
    ) -> Result<bool, ValidationError> {
        if let Some(term) = self
            .query
            .order_by
            .iter_mut()
            .find(|t| is_column(&t.expr, column))
        {
            if term.asc.unwrap_or(true) == direction.is_asc() {
                return Ok(false);
            }
            term.asc = Some(direction.is_asc());
            return Ok(true);
        }

        let term = column_term(column, direction)?;
        self.query.order_by.push(term);
        Ok(true)
    }

    /// Drop every ORDER BY term on `column`. Returns whether anything changed.
    pub fn remove_sort(&mut self, column: &str) -> bool {
        let before = self.query.order_by.len();
        self.query.order_by.retain(|t| !is_column(&t.expr, column));
        self.query.order_by.len() != before
    }

    /// Replace the WHERE clause.
    ///
    /// The text must be one expression: anything after it (ORDER BY, LIMIT, a
    /// second statement) is rejected.
    pub fn set_filter(&mut self, filter: Option<&str>) -> Result<(), ValidationError> {
        let selection = match filter.map(str::trim).filter(|e| !e.is_empty()) {
            Some(text) => Some(parse_filter(text)?),
            None => None,
        };
        let SetExpr::Select(select) = self.query.body.as_mut() else {
            return Err(ValidationError::invalid_query("not a simple SELECT"));
        };
        select.selection = selection;
        Ok(())
    }
}

impl fmt::Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query)
    }
}

impl FromStr for SelectStatement {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_error(e: ParserError) -> ValidationError {
    ValidationError::invalid_query(e.to_string())
}

fn unsupported<T>(clause: impl Into<String>) -> Result<T, ValidationError> {
    Err(ValidationError::UnsupportedClause(clause.into()))
}

/// Check the query shape and return its table name
fn single_source(query: &Query) -> Result<String, ValidationError> {
    if query.with.is_some() {
        return unsupported("WITH");
    }
    if query.fetch.is_some() {
        return unsupported("FETCH");
    }
    if !query.locks.is_empty() {
        return unsupported("FOR UPDATE");
    }

    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        SetExpr::SetOperation { op, .. } => return unsupported(format!("compound SELECT ({op})")),
        other => {
            return Err(ValidationError::invalid_query(format!(
                "expected a SELECT, got: {other}"
            )))
        }
    };
    if select.into.is_some() {
        return unsupported("INTO");
    }
    match &select.group_by {
        GroupByExpr::Expressions(exprs) if exprs.is_empty() => {}
        _ => return unsupported("GROUP BY"),
    }
    if select.having.is_some() {
        return unsupported("HAVING");
    }
    if !select.named_window.is_empty() {
        return unsupported("WINDOW");
    }

    let table = match select.from.as_slice() {
        [] => return Err(ValidationError::invalid_query("missing FROM clause")),
        [table] => table,
        _ => return unsupported("multiple sources"),
    };
    if !table.joins.is_empty() {
        return unsupported("JOIN");
    }
    match &table.relation {
        TableFactor::Table { name, .. } => match name.0.as_slice() {
            [ident] => Ok(ident.value.clone()),
            _ => unsupported(format!("qualified source {name}")),
        },
        _ => unsupported("derived source"),
    }
}

fn is_column(expr: &Expr, column: &str) -> bool {
    matches!(expr, Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case(column))
}

/// ORDER BY term on `column`, written bare when that reads back as the same
/// column and double-quoted otherwise
fn column_term(column: &str, direction: SortDirection) -> Result<OrderByExpr, ValidationError> {
    let bare = parse_order_term(&format!("{column} {}", direction.as_sql()))
        .ok()
        .filter(|term| {
            matches!(&term.expr, Expr::Identifier(ident)
                if ident.quote_style.is_none() && ident.value == column)
        });
    match bare {
        Some(term) => Ok(term),
        None => parse_order_term(&format!(
            "{} {}",
            Identifier::from_engine(column).quoted(),
            direction.as_sql()
        )),
    }
}

fn parse_order_term(text: &str) -> Result<OrderByExpr, ValidationError> {
    let dialect = SQLiteDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(text)
        .map_err(parse_error)?;
    let term = parser.parse_order_by_expr().map_err(parse_error)?;
    if parser.peek_token().token != Token::EOF {
        return Err(ValidationError::invalid_query(format!(
            "malformed ORDER BY term: {text}"
        )));
    }
    Ok(term)
}

fn parse_filter(text: &str) -> Result<Expr, ValidationError> {
    let dialect = SQLiteDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(text)
        .map_err(parse_error)?;
    let expr = parser.parse_expr().map_err(parse_error)?;
    if parser.peek_token().token != Token::EOF {
        return Err(ValidationError::invalid_query(format!(
            "filter must be a single WHERE expression: {text}"
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> SelectStatement {
        SelectStatement::parse(sql).unwrap()
    }

    #[test]
    fn test_select_all_is_canonical() {
        let table = Identifier::new("tb_abc").unwrap();
        let query = SelectStatement::select_all(&table).unwrap();
        assert_eq!(query.to_string(), "SELECT * FROM tb_abc");
        assert_eq!(query.source(), "tb_abc");
        assert_eq!(parse("SELECT * FROM tb_abc"), query);
    }

    #[test]
    fn test_parse_all_clauses() {
        let query = parse(
            "select distinct title, \"cl_1a2b\" from tb_x where (a = 'x, y' or b > 2) \
             order by title desc, lower(name) limit 10 offset 20;",
        );
        assert_eq!(query.source(), "tb_x");
        assert!(query.filter().is_some_and(|f| f.contains("'x, y'")));
        assert_eq!(query.order_by().len(), 2);
        assert_eq!(query.order_by()[0].asc, Some(false));
        assert!(query.to_string().ends_with("LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn test_quoted_source_is_unquoted() {
        assert_eq!(parse("SELECT * FROM \"tb_Q\"").source(), "tb_Q");
    }

    #[test]
    fn test_serialization_is_stable() {
        for sql in [
            "SELECT * FROM tb_x",
            "SELECT title FROM tb_x WHERE title LIKE '%order by%'",
            "SELECT * FROM tb_x ORDER BY \"title\" ASC, _id DESC LIMIT 5 OFFSET 10",
            "SELECT DISTINCT a FROM tb_y WHERE b IN (SELECT b FROM tb_y WHERE c = 'it''s')",
        ] {
            let once = parse(sql);
            let twice = parse(&once.to_string());
            assert_eq!(once, twice, "{sql}");
            assert_eq!(once.to_string(), twice.to_string());
        }
    }

    #[test]
    fn test_comments_are_ignored() {
        let query = parse("SELECT * -- all\nFROM t /* ORDER BY x */");
        assert_eq!(query.source(), "t");
        assert!(query.order_by().is_empty());
    }

    #[test]
    fn test_sort_by_appends_flips_and_is_idempotent() {
        let mut query = parse("SELECT * FROM tb_x");
        assert!(query.sort_by("title", SortDirection::Asc).unwrap());
        let after_first = query.clone();
        assert!(!query.sort_by("title", SortDirection::Asc).unwrap());
        assert_eq!(query, after_first);

        assert!(query.sort_by("title", SortDirection::Desc).unwrap());
        assert_eq!(query.order_by().len(), 1);
        assert_eq!(query.to_string(), "SELECT * FROM tb_x ORDER BY title DESC");
        assert!(query.sort_by("order", SortDirection::Asc).unwrap());
        assert_eq!(
            query.to_string(),
            "SELECT * FROM tb_x ORDER BY title DESC, \"order\" ASC"
        );
    }

    #[test]
    fn test_sort_matches_unquoted_and_quoted_columns() {
        let mut query = parse("SELECT * FROM t ORDER BY Title ASC, \"cl_9f\" DESC");
        assert!(!query.sort_by("title", SortDirection::Asc).unwrap());
        assert!(!query.sort_by("cl_9f", SortDirection::Desc).unwrap());
        assert!(query.remove_sort("cl_9f"));
        assert!(!query.remove_sort("cl_9f"));
        assert_eq!(query.to_string(), "SELECT * FROM t ORDER BY Title ASC");
    }

    #[test]
    fn test_set_filter() {
        let mut query = parse("SELECT * FROM t ORDER BY title ASC");
        query.set_filter(Some("status = 'done'")).unwrap();
        assert_eq!(
            query.to_string(),
            "SELECT * FROM t WHERE status = 'done' ORDER BY title ASC"
        );

        assert!(query.set_filter(Some("1 = 1 ORDER BY x")).is_err());
        assert!(query.set_filter(Some("1 = 1; DROP TABLE t")).is_err());
        assert!(query.set_filter(Some("a IN (SELECT b FROM u")).is_err());
        assert_eq!(query.filter().as_deref(), Some("status = 'done'"));

        query.set_filter(None).unwrap();
        assert_eq!(query.filter(), None);
    }

    #[test]
    fn test_rejects_unsupported_shapes() {
        for sql in [
            "SELECT a, COUNT(*) FROM t GROUP BY a",
            "SELECT * FROM a JOIN b ON a.x = b.x",
            "SELECT * FROM a, b",
            "SELECT * FROM (SELECT * FROM t)",
            "SELECT * FROM a UNION SELECT * FROM b",
            "SELECT * FROM main.t",
            "WITH x AS (SELECT 1) SELECT * FROM x",
        ] {
            assert!(
                matches!(
                    SelectStatement::parse(sql),
                    Err(ValidationError::UnsupportedClause(_))
                ),
                "{sql}"
            );
        }
        assert!(SelectStatement::parse("SELECT * FROM t; DELETE FROM t").is_err());
        assert!(SelectStatement::parse("DELETE FROM t").is_err());
        assert!(SelectStatement::parse("SELECT * FROM t WHERE").is_err());
        assert!(SelectStatement::parse("SELECT 1").is_err());
    }
}
