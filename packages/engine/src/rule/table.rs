use std::fmt;
use std::sync::Arc;

use crate::algorithm::{PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};
use crate::condition::ConditionValue;
use crate::keygen::KeyGenerateAlgorithm;
use crate::ShardlineError;

/// One physical table: `data_source.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ShardlineError> {
        let text = text.trim();
        match text.split_once('.') {
            Some((data_source, table))
                if !data_source.is_empty() && !table.is_empty() && !table.contains('.') =>
            {
                Ok(Self::new(data_source, table))
            }
            _ => Err(ShardlineError::configuration(format!(
                "data node '{text}' must look like 'data_source.table'"
            ))),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    Standard {
        column: String,
        algorithm: Arc<dyn ShardingAlgorithm>,
    },
    /// Every available target participates.
    None,
}

impl ShardingStrategy {
    pub fn standard(column: &str, algorithm: Arc<dyn ShardingAlgorithm>) -> Self {
        Self::Standard {
            column: column.to_ascii_lowercase(),
            algorithm,
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Standard { column, .. } => Some(column),
            Self::None => None,
        }
    }

    /// Targets for one condition on the sharding column, in
    /// `available_targets` order. A missing condition selects every target;
    /// a range the algorithm maps to no target selects none.
    pub fn do_sharding(
        &self,
        logic_table: &str,
        available_targets: &[String],
        condition: Option<&ConditionValue>,
    ) -> Result<Vec<String>, ShardlineError> {
        let (column, algorithm) = match self {
            Self::None => return Ok(available_targets.to_vec()),
            Self::Standard { column, algorithm } => (column.as_str(), algorithm),
        };
        let routed = match condition {
            None => return Ok(available_targets.to_vec()),
            Some(ConditionValue::AlwaysFalse) => return Ok(Vec::new()),
            Some(ConditionValue::Set(values)) => {
                let mut routed = Vec::new();
                for value in values {
                    let target = algorithm
                        .do_precise_sharding(
                            available_targets,
                            &PreciseShardingValue {
                                logic_table,
                                column,
                                value,
                            },
                        )?
                        .ok_or_else(|| {
                            ShardlineError::unresolvable(format!(
                                "{} algorithm maps {logic_table}.{column} = {value} to no target \
                                 among {available_targets:?}",
                                algorithm.type_name()
                            ))
                        })?;
                    if !available_targets.contains(&target) {
                        return Err(ShardlineError::unresolvable(format!(
                            "{} algorithm returned unknown target '{target}' for {logic_table}.{column}",
                            algorithm.type_name()
                        )));
                    }
                    routed.push(target);
                }
                routed
            }
            Some(ConditionValue::Range(range)) => {
                let routed = algorithm.do_range_sharding(
                    available_targets,
                    &RangeShardingValue {
                        logic_table,
                        column,
                        range,
                    },
                )?;
                if routed.is_empty() {
                    tracing::debug!(
                        table = logic_table,
                        column,
                        algorithm = algorithm.type_name(),
                        "range holds no sharding value"
                    );
                }
                routed
            }
        };
        Ok(available_targets
            .iter()
            .filter(|target| routed.contains(target))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct KeyGenerateStrategy {
    pub column: String,
    pub generator: Arc<dyn KeyGenerateAlgorithm>,
}

impl KeyGenerateStrategy {
    pub fn new(column: &str, generator: Arc<dyn KeyGenerateAlgorithm>) -> Self {
        Self {
            column: column.to_ascii_lowercase(),
            generator,
        }
    }
}

/// Topology of one logic table. A missing strategy falls back to the
/// rule-level default.
#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub data_nodes: Vec<DataNode>,
    pub database_strategy: Option<ShardingStrategy>,
    pub table_strategy: Option<ShardingStrategy>,
    pub key_generate_strategy: Option<KeyGenerateStrategy>,
}

impl TableRule {
    pub fn new(logic_table: &str, data_nodes: Vec<DataNode>) -> Result<Self, ShardlineError> {
        if data_nodes.is_empty() {
            return Err(ShardlineError::configuration(format!(
                "table '{logic_table}' has no actual data nodes"
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for node in &data_nodes {
            if !seen.insert(node) {
                return Err(ShardlineError::configuration(format!(
                    "table '{logic_table}' lists data node '{node}' twice"
                )));
            }
        }
        Ok(Self {
            logic_table: logic_table.to_ascii_lowercase(),
            data_nodes,
            database_strategy: None,
            table_strategy: None,
            key_generate_strategy: None,
        })
    }

    /// Builds the rule from an inline expression such as
    /// `ds_${0..1}.t_order_${0..3}`.
    pub fn from_inline(logic_table: &str, actual_data_nodes: &str) -> Result<Self, ShardlineError> {
        let nodes = super::inline::expand_inline_expression(actual_data_nodes)?
            .iter()
            .map(|node| DataNode::parse(node))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(logic_table, nodes)
    }

    pub fn with_database_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn with_table_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    pub fn with_key_generate_strategy(mut self, strategy: KeyGenerateStrategy) -> Self {
        self.key_generate_strategy = Some(strategy);
        self
    }

    /// Data sources in first-appearance order.
    pub fn data_sources(&self) -> Vec<String> {
        let mut data_sources: Vec<String> = Vec::new();
        for node in &self.data_nodes {
            if !data_sources.contains(&node.data_source) {
                data_sources.push(node.data_source.clone());
            }
        }
        data_sources
    }

    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.clone())
            .collect()
    }

    /// Position of `table` among the actual tables of `data_source`.
    pub fn actual_table_index(&self, data_source: &str, table: &str) -> Option<usize> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .position(|node| node.table == table)
    }

    pub fn actual_table_at(&self, data_source: &str, index: usize) -> Option<&str> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .nth(index)
            .map(|node| node.table.as_str())
    }

    pub fn contains_node(&self, data_source: &str, table: &str) -> bool {
        self.data_nodes
            .iter()
            .any(|node| node.data_source == data_source && node.table == table)
    }
}

#[cfg(test)]
mod tests {
    use super::{DataNode, ShardingStrategy, TableRule};
    use crate::algorithm::ModShardingAlgorithm;
    use crate::condition::ConditionValue;
    use crate::{ErrorCode, Value};
    use std::ops::Bound;
    use std::sync::Arc;

    #[test]
    fn parses_data_nodes() {
        assert_eq!(
            DataNode::parse(" ds_0.t_order_1 ").expect("node"),
            DataNode::new("ds_0", "t_order_1")
        );
        assert!(DataNode::parse("t_order").is_err());
        assert!(DataNode::parse("a.b.c").is_err());
    }

    #[test]
    fn indexes_actual_tables_per_data_source() {
        let rule = TableRule::from_inline("T_Order", "ds_${0..1}.t_order_${0..1}").expect("rule");
        assert_eq!(rule.logic_table, "t_order");
        assert_eq!(rule.data_sources(), vec!["ds_0", "ds_1"]);
        assert_eq!(rule.actual_tables_in("ds_1"), vec!["t_order_0", "t_order_1"]);
        assert_eq!(rule.actual_table_index("ds_1", "t_order_1"), Some(1));
        assert_eq!(rule.actual_table_at("ds_0", 1), Some("t_order_1"));
        assert_eq!(rule.actual_table_at("ds_0", 2), None);
    }

    #[test]
    fn rejects_empty_and_duplicate_nodes() {
        assert!(TableRule::new("t", Vec::new()).is_err());
        assert!(TableRule::from_inline("t", "ds_0.t_0, ds_0.t_0").is_err());
    }

    #[test]
    fn standard_strategy_unions_precise_targets_in_topology_order() {
        let strategy =
            ShardingStrategy::standard("user_id", Arc::new(ModShardingAlgorithm::new(4).expect("mod")));
        let available = (0..4).map(|index| format!("t_order_{index}")).collect::<Vec<_>>();
        let condition = ConditionValue::set(vec![
            Value::Integer(7),
            Value::Integer(1),
            Value::Integer(5),
        ])
        .expect("set");
        let targets = strategy
            .do_sharding("t_order", &available, Some(&condition))
            .expect("route");
        assert_eq!(targets, vec!["t_order_1", "t_order_3"]);
        assert_eq!(
            strategy.do_sharding("t_order", &available, None).expect("full"),
            available
        );
    }

    #[test]
    fn range_without_integer_values_selects_no_target() {
        let strategy =
            ShardingStrategy::standard("user_id", Arc::new(ModShardingAlgorithm::new(4).expect("mod")));
        let available = (0..4).map(|index| format!("t_order_{index}")).collect::<Vec<_>>();
        let condition = ConditionValue::range(
            Bound::Excluded(Value::Integer(4)),
            Bound::Excluded(Value::Integer(5)),
        )
        .expect("range");
        assert!(!condition.is_always_false());
        let targets = strategy
            .do_sharding("t_order", &available, Some(&condition))
            .expect("route");
        assert!(targets.is_empty());
    }

    #[test]
    fn precise_value_without_target_is_unresolvable() {
        let strategy =
            ShardingStrategy::standard("user_id", Arc::new(ModShardingAlgorithm::new(8).expect("mod")));
        let available = vec!["t_order_0".to_string(), "t_order_1".to_string()];
        let condition = ConditionValue::set(vec![Value::Integer(6)]).expect("set");
        let error = strategy
            .do_sharding("t_order", &available, Some(&condition))
            .expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::UnresolvableRoute);
    }
}
