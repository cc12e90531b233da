use async_trait::async_trait;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};

use crate::{QueryResult, ShardlineError, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    MySql,
    Postgres,
    Sqlite,
}

impl SqlDialect {
    pub(crate) fn parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::MySql => Box::new(MySqlDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }

    /// Case-normalizes an identifier the way the dialect resolves names.
    /// PostgreSQL keeps quoted identifiers verbatim; MySQL and SQLite
    /// table names are matched case-insensitively.
    pub fn normalize_identifier(self, value: &str, quote_style: Option<char>) -> String {
        match (self, quote_style) {
            (Self::Postgres, Some(_)) => value.to_string(),
            _ => value.to_ascii_lowercase(),
        }
    }

    /// Numbered markers (`$1`) cannot be re-indexed when a rewrite adds or
    /// drops parameters.
    pub fn uses_numbered_markers(self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Where NULL sorts when ORDER BY names no NULLS FIRST/LAST: MySQL and
    /// SQLite treat it as the smallest value, PostgreSQL as the largest.
    pub fn nulls_sort_smallest(self) -> bool {
        !matches!(self, Self::Postgres)
    }
}

/// One physical data source. Implementations own the connection handling;
/// the engine only dispatches rewritten SQL and parameters.
#[async_trait(?Send)]
pub trait ShardBackend: Send + Sync {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, ShardlineError>;
}
