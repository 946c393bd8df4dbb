//! Free-form SQL entry point
//!
//! Advanced and AI-driven callers send arbitrary SQL, but they still have to
//! separate identifiers from values at the call site:
//!
//! - `{name}` holes are filled with named [`Identifier`]s
//! - `?` placeholders are filled, in order, with bound [`SqlValue`]s
//! - every `UUID()` call outside literals becomes its own placeholder bound to a
//!   fresh id, so `INSERT ... VALUES (UUID()), (UUID())` yields two distinct ids
//! - comments are stripped
//! - exactly one statement is accepted, and never `BEGIN`/`COMMIT`/`ROLLBACK`
//!
//! ```rust
//! use dataspace_core::db::{FreeformSql, Identifier};
//!
//! let stmt = FreeformSql::new("UPDATE {table} SET title = ? WHERE _id = ?")
//!     .ident("table", Identifier::new("tb_1").unwrap())
//!     .bind("Done")
//!     .bind("row-1")
//!     .render()
//!     .unwrap();
//! assert_eq!(stmt.sql(), "UPDATE \"tb_1\" SET title = ? WHERE _id = ?");
//! ```

use crate::db::sql_parser::{
    count_placeholders, inspect, is_anonymous_placeholder, is_comment, named_placeholder,
    next_significant, token_text, tokenize,
};
use crate::db::{Identifier, SqlValue, Statement, StatementKind};
use crate::models::ValidationError;
use sqlparser::tokenizer::Token;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Caller-supplied SQL with separated identifiers and values
#[derive(Debug, Clone, Default)]
pub struct FreeformSql {
    template: String,
    identifiers: BTreeMap<String, Identifier>,
    values: Vec<SqlValue>,
}

impl FreeformSql {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            ..Default::default()
        }
    }

    pub fn ident(mut self, hole: impl Into<String>, ident: Identifier) -> Self {
        self.identifiers.insert(hole.into(), ident);
        self
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn kind(&self) -> StatementKind {
        StatementKind::classify(&self.template)
    }

    /// Render to an executable statement, rejecting any mix-up between
    /// identifiers and values.
    ///
    /// The result must be exactly one statement, and never transaction control:
    /// every call already runs inside a transaction owned by the data space.
    pub fn render(&self) -> Result<Statement, ValidationError> {
        let placeholders = count_placeholders(&self.template)?;
        if placeholders != self.values.len() {
            return Err(ValidationError::PlaceholderMismatch {
                placeholders,
                values: self.values.len(),
            });
        }

        let tokens = tokenize(&self.template)?;
        let mut sql = String::with_capacity(self.template.len());
        let mut params = Vec::with_capacity(self.values.len());
        let mut values = self.values.iter();
        let mut used = BTreeSet::new();

        let mut idx = 0;
        while idx < tokens.len() {
            if let Some(named) = named_placeholder(&tokens, idx) {
                return Err(ValidationError::UnsupportedPlaceholder(named));
            }
            if let Some(close) = uuid_call_end(&tokens, idx) {
                sql.push('?');
                params.push(SqlValue::Text(Uuid::new_v4().simple().to_string()));
                idx = close + 1;
                continue;
            }
            match &tokens[idx] {
                token if is_anonymous_placeholder(token) => {
                    let value = values.next().cloned().ok_or(
                        ValidationError::PlaceholderMismatch {
                            placeholders,
                            values: self.values.len(),
                        },
                    )?;
                    sql.push('?');
                    params.push(value);
                }
                Token::LBrace => {
                    let (hole, close) = identifier_hole(&tokens, idx)?;
                    let ident = self
                        .identifiers
                        .get(hole)
                        .ok_or_else(|| ValidationError::MissingIdentifier(hole.to_string()))?;
                    sql.push_str(&ident.quoted());
                    used.insert(hole.to_string());
                    idx = close;
                }
                token if is_comment(token) => sql.push(' '),
                Token::EOF => {}
                token => sql.push_str(&token_text(token)),
            }
            idx += 1;
        }

        if let Some(unused) = self.identifiers.keys().find(|name| !used.contains(*name)) {
            return Err(ValidationError::UnusedIdentifier(unused.clone()));
        }

        let sql = sql.trim().to_string();
        match inspect(&sql)? {
            (_, 0) => Err(ValidationError::invalid_query("no statement")),
            (StatementKind::Transaction, _) => Err(ValidationError::TransactionControl(sql)),
            (_, 1) => Ok(Statement::rendered(sql, params)),
            _ => Err(ValidationError::invalid_query(
                "only one statement is allowed per call",
            )),
        }
    }
}

/// `{ name }` starting at `open`: the hole name and the index of `}`
fn identifier_hole(tokens: &[Token], open: usize) -> Result<(&str, usize), ValidationError> {
    let malformed = || ValidationError::invalid_query("malformed identifier hole");
    let name_at = next_significant(tokens, open + 1).ok_or_else(malformed)?;
    let name = match &tokens[name_at] {
        Token::Word(w) if w.quote_style.is_none() => w.value.as_str(),
        _ => return Err(malformed()),
    };
    let close = next_significant(tokens, name_at + 1).ok_or_else(malformed)?;
    if tokens[close] != Token::RBrace {
        return Err(malformed());
    }
    Ok((name, close))
}

/// If the word at `idx` is a `UUID ( )` call, the index of its `)`
fn uuid_call_end(tokens: &[Token], idx: usize) -> Option<usize> {
    match &tokens[idx] {
        Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case("uuid") => {}
        _ => return None,
    }
    if idx > 0 && tokens[idx - 1] == Token::Period {
        return None;
    }
    let open = next_significant(tokens, idx + 1)?;
    if tokens[open] != Token::LParen {
        return None;
    }
    let close = next_significant(tokens, open + 1)?;
    (tokens[close] == Token::RParen).then_some(close)
}
