//! Single-query parsing on top of sqlparser.

use lakesync_core::ParseError;
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::{Dialect, DuckDbDialect, GenericDialect, SnowflakeDialect};
use sqlparser::parser::Parser;

/// SQL dialect used to parse incoming queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    #[default]
    Generic,
    DuckDb,
    Snowflake,
}

impl SqlDialect {
    fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::DuckDb => Box::new(DuckDbDialect {}),
            Self::Snowflake => Box::new(SnowflakeDialect {}),
        }
    }
}

/// Parse `sql` with the generic dialect.
pub fn parse_query(sql: &str) -> Result<Query, ParseError> {
    parse_query_with(SqlDialect::Generic, sql)
}

/// Parse exactly one query statement.
pub fn parse_query_with(dialect: SqlDialect, sql: &str) -> Result<Query, ParseError> {
    if sql.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let dialect = dialect.dialect();
    let mut statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| {
        ParseError::Invalid {
            reason: e.to_string(),
        }
    })?;

    match statements.len() {
        0 => return Err(ParseError::Empty),
        1 => {}
        count => return Err(ParseError::MultipleStatements { count }),
    }

    match statements.remove(0) {
        Statement::Query(query) => Ok(*query),
        other => Err(ParseError::UnsupportedStatement {
            kind: statement_kind(&other),
        }),
    }
}

/// Leading keyword of a statement, e.g. `INSERT`.
fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_select() {
        let query = parse_query("SELECT a FROM t WHERE b > 1").unwrap();
        assert_eq!(query.to_string(), "SELECT a FROM t WHERE b > 1");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(parse_query("   ").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            parse_query("SELEC FROM"),
            Err(ParseError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_multiple_statements() {
        assert_eq!(
            parse_query("SELECT 1; SELECT 2").unwrap_err(),
            ParseError::MultipleStatements { count: 2 }
        );
    }

    #[test]
    fn test_parse_rejects_non_query() {
        let err = parse_query("DELETE FROM orders").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnsupportedStatement {
                kind: "DELETE".to_string()
            }
        );
    }

    #[test]
    fn test_parse_with_dialects() {
        for dialect in [SqlDialect::Generic, SqlDialect::DuckDb, SqlDialect::Snowflake] {
            assert!(parse_query_with(dialect, "SELECT * FROM db.public.orders").is_ok());
        }
    }
}
