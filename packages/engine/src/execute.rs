//! Dispatches rewritten units to their data sources.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::try_join_all;

use crate::rewrite::ExecutionUnit;
use crate::{QueryResult, ShardBackend, ShardlineError};

/// Physical data sources by name.
pub type BackendMap = BTreeMap<String, Arc<dyn ShardBackend>>;

/// Runs every unit concurrently and returns results in unit order. The
/// first failure wins; no unit is retried.
pub async fn execute_units(
    backends: &BackendMap,
    units: &[ExecutionUnit],
) -> Result<Vec<QueryResult>, ShardlineError> {
    let calls = units
        .iter()
        .map(|unit| {
            let backend = backends.get(&unit.data_source).ok_or_else(|| {
                ShardlineError::configuration(format!(
                    "no backend is registered for data source '{}'",
                    unit.data_source
                ))
            });
            async move {
                let backend = backend?;
                tracing::trace!(data_source = %unit.data_source, sql = %unit.sql, "executing unit");
                backend.execute(&unit.sql, &unit.parameters).await
            }
        })
        .collect::<Vec<_>>();
    try_join_all(calls).await
}
