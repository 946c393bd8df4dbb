//! SQL text inspection using sqlparser.
//!
//! Statements are tokenized and parsed with [`SQLiteDialect`] before they reach
//! the connection: to count `?` placeholders, to classify a statement, and to
//! reject text carrying more than one statement.

use crate::db::statement::StatementKind;
use crate::models::ValidationError;
use sqlparser::ast::Statement as SqlStatement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// Tokens of `sql`, whitespace and comments included
pub(crate) fn tokenize(sql: &str) -> Result<Vec<Token>, ValidationError> {
    let dialect = SQLiteDialect {};
    Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| ValidationError::invalid_query(e.to_string()))
}

pub(crate) fn is_comment(token: &Token) -> bool {
    matches!(
        token,
        Token::Whitespace(Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_))
    )
}

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_) | Token::EOF)
}

/// Index of the first token at or after `from` that is not whitespace
pub(crate) fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|idx| !is_trivia(&tokens[*idx]))
}

pub(crate) fn is_anonymous_placeholder(token: &Token) -> bool {
    matches!(token, Token::Placeholder(p) if p == "?")
}

/// A numbered or named parameter (`?1`, `$name`, `:name`, `@name`) starting at `idx`
pub(crate) fn named_placeholder(tokens: &[Token], idx: usize) -> Option<String> {
    match &tokens[idx] {
        Token::Placeholder(p) if p != "?" => Some(p.clone()),
        Token::Word(w) if w.quote_style.is_none() && w.value.starts_with('$') => {
            Some(w.value.clone())
        }
        prefix @ (Token::Colon | Token::AtSign) => match tokens.get(idx + 1) {
            Some(Token::Word(w)) if w.quote_style.is_none() => Some(format!("{prefix}{}", w.value)),
            _ => None,
        },
        _ => None,
    }
}

/// Count anonymous `?` placeholders; numbered or named ones are rejected
pub(crate) fn count_placeholders(sql: &str) -> Result<usize, ValidationError> {
    let tokens = tokenize(sql)?;
    let mut count = 0;
    for idx in 0..tokens.len() {
        if let Some(named) = named_placeholder(&tokens, idx) {
            return Err(ValidationError::UnsupportedPlaceholder(named));
        }
        if is_anonymous_placeholder(&tokens[idx]) {
            count += 1;
        }
    }
    Ok(count)
}

/// SQL text of one token.
///
/// The tokenizer hands literals and quoted identifiers back unescaped, so
/// their quotes are doubled again here.
pub(crate) fn token_text(token: &Token) -> String {
    match token {
        Token::SingleQuotedString(s) => format!("'{}'", s.replace('\'', "''")),
        Token::Word(w) => match w.quote_style {
            None => w.value.clone(),
            Some('[') => format!("[{}]", w.value),
            Some(q) => format!("{q}{}{q}", w.value.replace(q, &format!("{q}{q}"))),
        },
        other => other.to_string(),
    }
}

/// Kind of the first statement in `sql` and the number of statements.
///
/// SQLite accepts statements the parser does not model (`VACUUM`, `REINDEX`,
/// ...); those fall back to the leading keyword of each `;`-separated part.
pub(crate) fn inspect(sql: &str) -> Result<(StatementKind, usize), ValidationError> {
    let dialect = SQLiteDialect {};
    match Parser::parse_sql(&dialect, sql) {
        Ok(statements) => {
            let kind = match statements.first().and_then(kind_of) {
                Some(kind) => kind,
                None => leading_kind(&tokenize(sql)?),
            };
            Ok((kind, statements.len()))
        }
        Err(e) => {
            tracing::debug!("Parser fallback for statement kind: {}", e);
            let tokens = tokenize(sql)?;
            let parts: Vec<&[Token]> = tokens
                .split(|t| *t == Token::SemiColon)
                .filter(|part| part.iter().any(|t| !is_trivia(t)))
                .collect();
            let kind = parts
                .first()
                .map(|part| leading_kind(part))
                .unwrap_or(StatementKind::Other);
            Ok((kind, parts.len()))
        }
    }
}

fn kind_of(stmt: &SqlStatement) -> Option<StatementKind> {
    match stmt {
        SqlStatement::Query(_) | SqlStatement::Explain { .. } | SqlStatement::Pragma { .. } => {
            Some(StatementKind::Read)
        }
        SqlStatement::Insert { .. } | SqlStatement::Update { .. } | SqlStatement::Delete { .. } => {
            Some(StatementKind::Write)
        }
        SqlStatement::CreateTable { .. }
        | SqlStatement::CreateView { .. }
        | SqlStatement::CreateIndex { .. }
        | SqlStatement::AlterTable { .. }
        | SqlStatement::Drop { .. } => Some(StatementKind::Schema),
        SqlStatement::StartTransaction { .. }
        | SqlStatement::Commit { .. }
        | SqlStatement::Rollback { .. }
        | SqlStatement::Savepoint { .. } => Some(StatementKind::Transaction),
        _ => None,
    }
}

fn leading_kind(tokens: &[Token]) -> StatementKind {
    let keyword = tokens.iter().find(|t| !is_trivia(t)).and_then(|t| match t {
        Token::Word(w) if w.quote_style.is_none() => Some(w.keyword),
        _ => None,
    });
    match keyword {
        Some(
            Keyword::SELECT | Keyword::WITH | Keyword::PRAGMA | Keyword::EXPLAIN | Keyword::VALUES,
        ) => StatementKind::Read,
        Some(Keyword::INSERT | Keyword::UPDATE | Keyword::DELETE | Keyword::REPLACE) => {
            StatementKind::Write
        }
        Some(Keyword::CREATE | Keyword::DROP | Keyword::ALTER) => StatementKind::Schema,
        Some(
            Keyword::BEGIN
            | Keyword::COMMIT
            | Keyword::END
            | Keyword::ROLLBACK
            | Keyword::SAVEPOINT
            | Keyword::RELEASE,
        ) => StatementKind::Transaction,
        _ => StatementKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_placeholders_skips_literals_and_comments() {
        assert_eq!(count_placeholders("SELECT ? FROM t WHERE a = ?").unwrap(), 2);
        assert_eq!(count_placeholders("SELECT 'why?' -- or ?\n, \"q?\"").unwrap(), 0);
        assert!(matches!(
            count_placeholders("SELECT ?1"),
            Err(ValidationError::UnsupportedPlaceholder(_))
        ));
        assert!(matches!(
            count_placeholders("SELECT :name"),
            Err(ValidationError::UnsupportedPlaceholder(_))
        ));
    }

    #[test]
    fn test_token_text_restores_escapes() {
        let tokens = tokenize("SELECT 'it''s', \"a\"\"b\"").unwrap();
        let text: String = tokens.iter().map(token_text).collect();
        assert_eq!(text, "SELECT 'it''s', \"a\"\"b\"");
    }

    #[test]
    fn test_inspect_counts_statements() {
        assert_eq!(inspect("SELECT 1;").unwrap(), (StatementKind::Read, 1));
        assert_eq!(inspect("SELECT 1; DELETE FROM t").unwrap().1, 2);
        assert_eq!(inspect("VACUUM").unwrap(), (StatementKind::Other, 1));
        assert_eq!(inspect("  -- nothing\n").unwrap().1, 0);
    }

    #[test]
    fn test_transaction_control_is_recognized() {
        for sql in [
            "BEGIN",
            "begin immediate",
            "COMMIT",
            "END TRANSACTION",
            "ROLLBACK",
            "SAVEPOINT s1",
            "RELEASE SAVEPOINT s1",
        ] {
            assert_eq!(inspect(sql).unwrap().0, StatementKind::Transaction, "{sql}");
        }
    }
}
