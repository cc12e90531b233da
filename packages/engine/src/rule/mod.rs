//! Sharding topology: which logic tables are sharded, where their actual
//! tables live and which strategies pick among them.

pub(crate) mod inline;
mod table;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::algorithm::{AlgorithmFactory, ShardingAlgorithm};
use crate::config::{KeyGenerateStrategyConfig, ShardingRuleConfig, ShardingStrategyConfig};
use crate::keygen::KeyGenerateAlgorithm;
use crate::ShardlineError;

pub use inline::expand_inline_expression;
pub use table::{DataNode, KeyGenerateStrategy, ShardingStrategy, TableRule};

#[derive(Debug, Clone, Default)]
pub struct ShardingRule {
    tables: BTreeMap<String, TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: BTreeSet<String>,
    data_sources: Vec<String>,
    default_data_source: Option<String>,
    default_database_strategy: Option<ShardingStrategy>,
    default_table_strategy: Option<ShardingStrategy>,
    default_key_generate_strategy: Option<KeyGenerateStrategy>,
    strict_routing: bool,
}

impl ShardingRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_rule(mut self, rule: TableRule) -> Self {
        for data_source in rule.data_sources() {
            self.add_data_source(&data_source);
        }
        self.tables.insert(rule.logic_table.clone(), rule);
        self
    }

    pub fn with_binding_group<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.binding_groups.push(
            tables
                .into_iter()
                .map(|table| table.as_ref().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    pub fn with_broadcast_table(mut self, table: &str) -> Self {
        self.broadcast_tables.insert(table.to_ascii_lowercase());
        self
    }

    pub fn with_data_source(mut self, data_source: &str) -> Self {
        self.add_data_source(data_source);
        self
    }

    pub fn with_default_data_source(mut self, data_source: &str) -> Self {
        self.add_data_source(data_source);
        self.default_data_source = Some(data_source.to_string());
        self
    }

    pub fn with_default_database_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.default_database_strategy = Some(strategy);
        self
    }

    pub fn with_default_table_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.default_table_strategy = Some(strategy);
        self
    }

    pub fn with_default_key_generate_strategy(mut self, strategy: KeyGenerateStrategy) -> Self {
        self.default_key_generate_strategy = Some(strategy);
        self
    }

    pub fn with_strict_routing(mut self, strict: bool) -> Self {
        self.strict_routing = strict;
        self
    }

    fn add_data_source(&mut self, data_source: &str) {
        if !self.data_sources.iter().any(|known| known == data_source) {
            self.data_sources.push(data_source.to_string());
        }
    }

    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.tables.get(&logic_table.to_ascii_lowercase())
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.tables.values()
    }

    pub fn is_broadcast(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .contains(&logic_table.to_ascii_lowercase())
    }

    pub fn database_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.database_strategy
            .as_ref()
            .or(self.default_database_strategy.as_ref())
    }

    pub fn table_strategy<'a>(&'a self, rule: &'a TableRule) -> Option<&'a ShardingStrategy> {
        rule.table_strategy
            .as_ref()
            .or(self.default_table_strategy.as_ref())
    }

    pub fn key_generate_strategy<'a>(
        &'a self,
        rule: &'a TableRule,
    ) -> Option<&'a KeyGenerateStrategy> {
        rule.key_generate_strategy
            .as_ref()
            .or(self.default_key_generate_strategy.as_ref())
    }

    /// Sharding columns of a logic table, database strategy first.
    pub fn sharding_columns(&self, logic_table: &str) -> Vec<String> {
        let Some(rule) = self.table_rule(logic_table) else {
            return Vec::new();
        };
        let mut columns: Vec<String> = Vec::new();
        for strategy in [self.database_strategy(rule), self.table_strategy(rule)]
            .into_iter()
            .flatten()
        {
            if let Some(column) = strategy.column() {
                if !columns.iter().any(|known| known == column) {
                    columns.push(column.to_string());
                }
            }
        }
        columns
    }

    pub fn is_sharding_column(&self, logic_table: &str, column: &str) -> bool {
        self.sharding_columns(logic_table)
            .iter()
            .any(|known| known.eq_ignore_ascii_case(column))
    }

    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        let logic_table = logic_table.to_ascii_lowercase();
        self.binding_groups
            .iter()
            .find(|group| group.contains(&logic_table))
            .map(Vec::as_slice)
    }

    pub fn is_binding_pair(&self, left: &str, right: &str) -> bool {
        self.binding_group(left)
            .is_some_and(|group| group.iter().any(|table| table.eq_ignore_ascii_case(right)))
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    /// Where unconfigured tables live: the explicit default, or the only
    /// data source when there is exactly one.
    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref().or_else(|| {
            if self.data_sources.len() == 1 {
                self.data_sources.first().map(String::as_str)
            } else {
                None
            }
        })
    }

    pub fn strict_routing(&self) -> bool {
        self.strict_routing
    }

    /// Checks cross-table consistency. Binding tables must share the exact
    /// shape of their topology so shard indexes line up.
    pub fn validate(&self) -> Result<(), ShardlineError> {
        for group in &self.binding_groups {
            let mut rules = Vec::with_capacity(group.len());
            for table in group {
                rules.push(self.table_rule(table).ok_or_else(|| {
                    ShardlineError::configuration(format!(
                        "binding table '{table}' has no table rule"
                    ))
                })?);
            }
            let Some((first, rest)) = rules.split_first() else {
                continue;
            };
            for other in rest {
                let same_shape = first.data_sources() == other.data_sources()
                    && first.data_sources().iter().all(|data_source| {
                        first.actual_tables_in(data_source).len()
                            == other.actual_tables_in(data_source).len()
                    });
                if !same_shape {
                    return Err(ShardlineError::configuration(format!(
                        "binding tables '{}' and '{}' have different data node layouts",
                        first.logic_table, other.logic_table
                    )));
                }
            }
        }
        for table in &self.broadcast_tables {
            if self.tables.contains_key(table) {
                return Err(ShardlineError::configuration(format!(
                    "table '{table}' cannot be both sharded and broadcast"
                )));
            }
        }
        if let Some(default) = &self.default_data_source {
            if !self.data_sources.contains(default) {
                return Err(ShardlineError::configuration(format!(
                    "default data source '{default}' is not a known data source"
                )));
            }
        }
        Ok(())
    }

    /// Resolves serializable configuration into strategy objects. Every
    /// named algorithm is built once and shared by the tables using it.
    pub fn from_config(
        config: &ShardingRuleConfig,
        factory: &AlgorithmFactory,
    ) -> Result<Self, ShardlineError> {
        let mut algorithms: BTreeMap<&str, Arc<dyn ShardingAlgorithm>> = BTreeMap::new();
        for (name, algorithm) in &config.sharding_algorithms {
            algorithms.insert(name, factory.create_sharding(algorithm).map_err(|error| {
                ShardlineError::configuration(format!("sharding algorithm '{name}': {error}"))
            })?);
        }
        let mut generators: BTreeMap<&str, Arc<dyn KeyGenerateAlgorithm>> = BTreeMap::new();
        for (name, generator) in &config.key_generators {
            generators.insert(
                name,
                factory.create_key_generator(generator).map_err(|error| {
                    ShardlineError::configuration(format!("key generator '{name}': {error}"))
                })?,
            );
        }

        let sharding_strategy = |config: &ShardingStrategyConfig| match config {
            ShardingStrategyConfig::None => Ok(ShardingStrategy::None),
            ShardingStrategyConfig::Standard {
                sharding_column,
                algorithm_name,
            } => algorithms
                .get(algorithm_name.as_str())
                .map(|algorithm| ShardingStrategy::standard(sharding_column, algorithm.clone()))
                .ok_or_else(|| {
                    ShardlineError::configuration(format!(
                        "unknown sharding algorithm '{algorithm_name}'"
                    ))
                }),
        };
        let key_strategy = |config: &KeyGenerateStrategyConfig| {
            generators
                .get(config.generator_name.as_str())
                .map(|generator| KeyGenerateStrategy::new(&config.column, generator.clone()))
                .ok_or_else(|| {
                    ShardlineError::configuration(format!(
                        "unknown key generator '{}'",
                        config.generator_name
                    ))
                })
        };

        let mut rule = Self::new().with_strict_routing(config.props.strict_routing);
        for data_source in &config.data_sources {
            rule = rule.with_data_source(data_source);
        }
        for (logic_table, table) in &config.tables {
            let mut table_rule = TableRule::from_inline(logic_table, &table.actual_data_nodes)
                .map_err(|error| {
                    ShardlineError::configuration(format!("table '{logic_table}': {error}"))
                })?;
            if let Some(strategy) = &table.database_strategy {
                table_rule = table_rule.with_database_strategy(sharding_strategy(strategy)?);
            }
            if let Some(strategy) = &table.table_strategy {
                table_rule = table_rule.with_table_strategy(sharding_strategy(strategy)?);
            }
            if let Some(strategy) = &table.key_generate_strategy {
                table_rule = table_rule.with_key_generate_strategy(key_strategy(strategy)?);
            }
            rule = rule.with_table_rule(table_rule);
        }
        for group in &config.binding_tables {
            rule = rule.with_binding_group(group);
        }
        for table in &config.broadcast_tables {
            rule = rule.with_broadcast_table(table);
        }
        if let Some(data_source) = &config.default_data_source {
            rule = rule.with_default_data_source(data_source);
        }
        if let Some(strategy) = &config.default_database_strategy {
            rule = rule.with_default_database_strategy(sharding_strategy(strategy)?);
        }
        if let Some(strategy) = &config.default_table_strategy {
            rule = rule.with_default_table_strategy(sharding_strategy(strategy)?);
        }
        if let Some(strategy) = &config.default_key_generate_strategy {
            rule = rule.with_default_key_generate_strategy(key_strategy(strategy)?);
        }
        rule.validate()?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::{ShardingRule, TableRule};
    use crate::algorithm::AlgorithmFactory;
    use crate::config::ShardingRuleConfig;
    use crate::ErrorCode;

    fn config() -> ShardingRuleConfig {
        ShardingRuleConfig::from_json(
            r#"{
                "tables": {
                    "t_order": {
                        "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
                        "database_strategy": {
                            "standard": { "sharding_column": "user_id", "algorithm_name": "db_mod" }
                        },
                        "table_strategy": {
                            "standard": { "sharding_column": "order_id", "algorithm_name": "table_mod" }
                        },
                        "key_generate_strategy": { "column": "order_id", "generator_name": "snowflake" }
                    },
                    "t_order_item": {
                        "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}",
                        "database_strategy": {
                            "standard": { "sharding_column": "user_id", "algorithm_name": "db_mod" }
                        },
                        "table_strategy": {
                            "standard": { "sharding_column": "order_id", "algorithm_name": "table_mod" }
                        }
                    }
                },
                "binding_tables": [["t_order", "t_order_item"]],
                "broadcast_tables": ["t_dict"],
                "sharding_algorithms": {
                    "db_mod": { "type": "MOD", "props": { "sharding-count": 2 } },
                    "table_mod": { "type": "MOD", "props": { "sharding-count": 2 } }
                },
                "key_generators": { "snowflake": { "type": "SNOWFLAKE", "props": { "worker-id": 7 } } }
            }"#,
        )
        .expect("config")
    }

    #[test]
    fn builds_rules_from_configuration() {
        let rule = ShardingRule::from_config(&config(), &AlgorithmFactory::with_builtins())
            .expect("rule");
        assert_eq!(rule.data_sources(), ["ds_0", "ds_1"]);
        assert_eq!(rule.sharding_columns("T_ORDER"), vec!["user_id", "order_id"]);
        assert!(rule.is_sharding_column("t_order_item", "ORDER_ID"));
        assert!(rule.is_binding_pair("t_order", "t_order_item"));
        assert!(rule.is_broadcast("t_dict"));
        let order = rule.table_rule("t_order").expect("t_order");
        assert_eq!(
            rule.key_generate_strategy(order).map(|strategy| strategy.column.as_str()),
            Some("order_id")
        );
        assert!(rule.default_data_source().is_none());
    }

    #[test]
    fn unknown_algorithm_names_fail_at_build_time() {
        let mut config = config();
        config.sharding_algorithms.remove("table_mod");
        let error = ShardingRule::from_config(&config, &AlgorithmFactory::with_builtins())
            .expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::Configuration);
    }

    #[test]
    fn binding_tables_must_share_layout() {
        let rule = ShardingRule::new()
            .with_table_rule(TableRule::from_inline("a", "ds_0.a_${0..1}").expect("a"))
            .with_table_rule(TableRule::from_inline("b", "ds_0.b_${0..2}").expect("b"))
            .with_binding_group(["a", "b"]);
        assert_eq!(
            rule.validate().expect_err("must fail").code(),
            ErrorCode::Configuration
        );
    }

    #[test]
    fn single_data_source_is_the_implicit_default() {
        let rule = ShardingRule::new().with_data_source("ds_main");
        assert_eq!(rule.default_data_source(), Some("ds_main"));
    }
}
