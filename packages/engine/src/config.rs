//! Serializable sharding rule configuration.
//!
//! The configuration is plain data. [`crate::ShardingRule::from_config`]
//! turns it into strategy objects through an [`crate::AlgorithmFactory`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::ShardlineError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingRuleConfig {
    /// Logic table name to its rule.
    pub tables: BTreeMap<String, TableRuleConfig>,
    pub binding_tables: Vec<Vec<String>>,
    pub broadcast_tables: Vec<String>,
    /// Every data source the rule may address. Data sources named by
    /// table rules are added implicitly.
    pub data_sources: Vec<String>,
    pub default_data_source: Option<String>,
    pub default_database_strategy: Option<ShardingStrategyConfig>,
    pub default_table_strategy: Option<ShardingStrategyConfig>,
    pub default_key_generate_strategy: Option<KeyGenerateStrategyConfig>,
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfig>,
    pub key_generators: BTreeMap<String, AlgorithmConfig>,
    pub props: RuleProps,
}

impl ShardingRuleConfig {
    pub fn from_json(text: &str) -> Result<Self, ShardlineError> {
        serde_json::from_str(text).map_err(|error| {
            ShardlineError::configuration(format!("invalid sharding rule JSON: {error}"))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRuleConfig {
    /// Inline expression such as `ds_${0..1}.t_order_${0..3}`.
    pub actual_data_nodes: String,
    pub database_strategy: Option<ShardingStrategyConfig>,
    pub table_strategy: Option<ShardingStrategyConfig>,
    pub key_generate_strategy: Option<KeyGenerateStrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingStrategyConfig {
    Standard {
        sharding_column: String,
        algorithm_name: String,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerateStrategyConfig {
    pub column: String,
    pub generator_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: Props,
}

impl AlgorithmConfig {
    pub fn new(kind: impl Into<String>, props: Props) -> Self {
        Self {
            kind: kind.into(),
            props,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleProps {
    /// Reject statements on sharded tables that would need a full route.
    pub strict_routing: bool,
}

/// Algorithm properties. Numbers may be given as JSON numbers or strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props(JsonMap<String, JsonValue>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            JsonValue::String(text) => Some(text.clone()),
            JsonValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String, ShardlineError> {
        self.get_str(key)
            .ok_or_else(|| ShardlineError::configuration(format!("missing property '{key}'")))
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, ShardlineError> {
        let Some(value) = self.0.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            JsonValue::Number(number) => number.as_i64(),
            JsonValue::String(text) => text.trim().parse().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| {
            ShardlineError::configuration(format!("property '{key}' must be an integer, got {value}"))
        })
    }

    pub fn require_i64(&self, key: &str) -> Result<i64, ShardlineError> {
        self.get_i64(key)?
            .ok_or_else(|| ShardlineError::configuration(format!("missing property '{key}'")))
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ShardlineError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(JsonValue::Bool(flag)) => Ok(Some(*flag)),
            Some(JsonValue::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(ShardlineError::configuration(format!(
                    "property '{key}' must be a boolean"
                ))),
            },
            Some(_) => Err(ShardlineError::configuration(format!(
                "property '{key}' must be a boolean"
            ))),
        }
    }
}
