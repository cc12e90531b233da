use std::fmt;

use tracing::{debug, info};

use crate::condition::extract_sharding_conditions;
use crate::execute::{execute_units, BackendMap};
use crate::keygen::{resolve_generated_key, GeneratedKeyContext};
use crate::merge::{
    merge_query_results, merge_update_counts, MemoryQueryResult, MergeContext, QueryResultCursor,
};
use crate::rewrite::{ColumnTransformRule, ExecutionUnit, RewriteContext, RewriteEngine};
use crate::route::{route_statement, RouteContext};
use crate::sql::{bind_statement, ProjectionKind, SelectContext, StatementContext};
use crate::{ShardingRule, ShardlineError, SqlDialect, Value};

pub struct OpenShardlineConfig {
    pub rule: ShardingRule,
    pub backends: BackendMap,
    pub dialect: SqlDialect,
    pub transforms: Vec<ColumnTransformRule>,
    /// Token generators; `None` uses the built-in set.
    pub rewrite_engine: Option<RewriteEngine>,
}

impl OpenShardlineConfig {
    pub fn new(rule: ShardingRule, backends: BackendMap, dialect: SqlDialect) -> Self {
        Self {
            rule,
            backends,
            dialect,
            transforms: Vec::new(),
            rewrite_engine: None,
        }
    }

    pub fn with_transform(mut self, transform: ColumnTransformRule) -> Self {
        self.transforms.push(transform);
        self
    }
}

/// Every stage output for one logical statement.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub statement: StatementContext,
    pub select: Option<SelectContext>,
    pub generated_key: Option<GeneratedKeyContext>,
    pub route: RouteContext,
    pub units: Vec<ExecutionUnit>,
    pub params: Vec<Value>,
}

pub enum ExecuteOutcome {
    Rows(Box<dyn QueryResultCursor>),
    Affected(u64),
}

impl fmt::Debug for ExecuteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(cursor) => f
                .debug_struct("Rows")
                .field("columns", &cursor.columns())
                .finish_non_exhaustive(),
            Self::Affected(count) => f.debug_tuple("Affected").field(count).finish(),
        }
    }
}

impl ExecuteOutcome {
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Affected(count) => Some(*count),
            Self::Rows(_) => None,
        }
    }

    pub fn into_cursor(self) -> Option<Box<dyn QueryResultCursor>> {
        match self {
            Self::Rows(cursor) => Some(cursor),
            Self::Affected(_) => None,
        }
    }
}

pub struct Shardline {
    rule: ShardingRule,
    backends: BackendMap,
    dialect: SqlDialect,
    transforms: Vec<ColumnTransformRule>,
    rewrite_engine: RewriteEngine,
}

impl fmt::Debug for Shardline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shardline")
            .field("dialect", &self.dialect)
            .field("data_sources", &self.backends.keys().collect::<Vec<_>>())
            .field("rewrite_engine", &self.rewrite_engine)
            .finish_non_exhaustive()
    }
}

pub async fn open_shardline(config: OpenShardlineConfig) -> Result<Shardline, ShardlineError> {
    config.rule.validate()?;
    if let Some(missing) = config
        .rule
        .data_sources()
        .iter()
        .find(|data_source| !config.backends.contains_key(data_source.as_str()))
    {
        return Err(ShardlineError::configuration(format!(
            "no backend is registered for data source '{missing}'"
        )));
    }
    info!(
        dialect = ?config.dialect,
        data_sources = config.backends.len(),
        tables = config.rule.table_rules().count(),
        "opened shardline runtime"
    );
    Ok(Shardline {
        rule: config.rule,
        backends: config.backends,
        dialect: config.dialect,
        transforms: config.transforms,
        rewrite_engine: config.rewrite_engine.unwrap_or_default(),
    })
}

impl Shardline {
    pub fn rule(&self) -> &ShardingRule {
        &self.rule
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Binds, routes and rewrites `sql` without touching any backend.
    pub fn plan(&self, sql: &str, params: &[Value]) -> Result<ExecutionPlan, ShardlineError> {
        let statement = bind_statement(sql, params.len(), self.dialect)?;
        let select = statement
            .select
            .as_ref()
            .map(SelectContext::new)
            .transpose()?;
        let generated_key = resolve_generated_key(&statement, params, &self.rule)?;
        let conditions =
            extract_sharding_conditions(&statement, params, &self.rule, generated_key.as_ref())?;
        let route = route_statement(&statement, &conditions, &self.rule)?;
        let units = self.rewrite_engine.rewrite(&RewriteContext {
            statement: &statement,
            params,
            route: &route,
            select: select.as_ref(),
            generated_key: generated_key.as_ref(),
            transforms: &self.transforms,
        })?;
        debug!(
            kind = ?statement.kind,
            units = units.len(),
            full_route = route.full_route,
            always_false = route.always_false,
            "planned statement"
        );
        Ok(ExecutionPlan {
            statement,
            select,
            generated_key,
            route,
            units,
            params: params.to_vec(),
        })
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecuteOutcome, ShardlineError> {
        let plan = self.plan(sql, params)?;
        self.execute_plan(&plan).await
    }

    pub async fn execute_plan(&self, plan: &ExecutionPlan) -> Result<ExecuteOutcome, ShardlineError> {
        let results = execute_units(&self.backends, &plan.units).await?;
        if !plan.statement.kind.is_query() {
            return Ok(ExecuteOutcome::Affected(merge_update_counts(&results)));
        }
        if results.is_empty() {
            return Ok(ExecuteOutcome::Rows(Box::new(MemoryQueryResult::new(
                projection_labels(plan.select.as_ref()),
                Vec::new(),
            ))));
        }
        let cursors = results
            .into_iter()
            .map(|result| Box::new(MemoryQueryResult::from(result)) as Box<dyn QueryResultCursor>)
            .collect();
        let merged = merge_query_results(
            &MergeContext {
                select: plan.select.as_ref(),
                params: &plan.params,
                dialect: self.dialect,
            },
            cursors,
        )?;
        Ok(ExecuteOutcome::Rows(merged))
    }
}

/// Column labels of an empty result. Wildcards cannot be expanded without a
/// backend, so they contribute nothing.
fn projection_labels(select: Option<&SelectContext>) -> Vec<String> {
    select
        .map(|select| {
            select
                .projections
                .iter()
                .filter(|projection| !matches!(projection.kind, ProjectionKind::Wildcard))
                .map(|projection| projection.label())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{open_shardline, ExecuteOutcome, OpenShardlineConfig};
    use crate::algorithm::ModShardingAlgorithm;
    use crate::execute::BackendMap;
    use crate::{
        ErrorCode, QueryResult, ShardBackend, ShardingRule, ShardingStrategy, ShardlineError,
        SqlDialect, TableRule, Value,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    #[async_trait(?Send)]
    impl ShardBackend for CountingBackend {
        async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult, ShardlineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(QueryResult::with_rows(vec!["id".to_string()], Vec::new()))
        }
    }

    fn rule() -> ShardingRule {
        ShardingRule::new().with_table_rule(
            TableRule::from_inline("t_order", "ds_0.t_order_${0..1}")
                .expect("table rule")
                .with_table_strategy(ShardingStrategy::standard(
                    "id",
                    Arc::new(ModShardingAlgorithm::new(2).expect("algorithm")),
                )),
        )
    }

    #[tokio::test]
    async fn rejects_rules_without_backends() {
        let error = open_shardline(OpenShardlineConfig::new(
            rule(),
            BackendMap::new(),
            SqlDialect::Sqlite,
        ))
        .await
        .err()
        .expect("must fail");
        assert_eq!(error.code(), ErrorCode::Configuration);
    }

    #[tokio::test]
    async fn always_false_statements_skip_every_backend() {
        let backend = Arc::new(CountingBackend::default());
        let mut backends = BackendMap::new();
        backends.insert("ds_0".to_string(), backend.clone());
        let shardline = open_shardline(OpenShardlineConfig::new(rule(), backends, SqlDialect::Sqlite))
            .await
            .expect("open");
        let outcome = shardline
            .execute("SELECT id FROM t_order WHERE id = 1 AND id = 2", &[])
            .await
            .expect("execute");
        let ExecuteOutcome::Rows(mut cursor) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(cursor.columns(), ["id".to_string()]);
        assert!(!cursor.next().expect("next"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
