use std::fmt;
use std::sync::Arc;

use crate::{ShardlineError, Value};

/// Turns a plaintext value into its stored form (ciphertext, digest, ...).
pub trait ValueTransformer: Send + Sync {
    fn transform(&self, value: &Value) -> Result<Value, ShardlineError>;
}

impl<F> ValueTransformer for F
where
    F: Fn(&Value) -> Result<Value, ShardlineError> + Send + Sync,
{
    fn transform(&self, value: &Value) -> Result<Value, ShardlineError> {
        self(value)
    }
}

/// A logic column whose bound values are stored transformed. With an
/// assisted-query column, writes also fill that column and equality
/// lookups are redirected to it.
#[derive(Clone)]
pub struct ColumnTransformRule {
    pub table: String,
    pub column: String,
    pub transformer: Arc<dyn ValueTransformer>,
    pub assisted_query: Option<AssistedQueryColumn>,
}

#[derive(Clone)]
pub struct AssistedQueryColumn {
    pub column: String,
    pub transformer: Arc<dyn ValueTransformer>,
}

impl ColumnTransformRule {
    pub fn new(table: &str, column: &str, transformer: Arc<dyn ValueTransformer>) -> Self {
        Self {
            table: table.to_ascii_lowercase(),
            column: column.to_ascii_lowercase(),
            transformer,
            assisted_query: None,
        }
    }

    pub fn with_assisted_query(
        mut self,
        column: &str,
        transformer: Arc<dyn ValueTransformer>,
    ) -> Self {
        self.assisted_query = Some(AssistedQueryColumn {
            column: column.to_string(),
            transformer,
        });
        self
    }

    pub fn matches(&self, table: &str, column: &str) -> bool {
        self.table.eq_ignore_ascii_case(table) && self.column.eq_ignore_ascii_case(column)
    }
}

impl fmt::Debug for ColumnTransformRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnTransformRule")
            .field("table", &self.table)
            .field("column", &self.column)
            .field(
                "assisted_query",
                &self.assisted_query.as_ref().map(|assisted| &assisted.column),
            )
            .finish_non_exhaustive()
    }
}
