//! Sharding conditions: what the statement says about sharding columns,
//! folded into one value per column per conjunctive group.

mod extractor;
mod value;

use std::collections::BTreeMap;

use crate::ShardlineError;

pub use extractor::extract_sharding_conditions;
pub use value::{ConditionValue, ValueRange};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConditionColumn {
    /// Logic table name.
    pub table: String,
    pub column: String,
}

impl ConditionColumn {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_ascii_lowercase(),
            column: column.to_ascii_lowercase(),
        }
    }
}

/// One conjunctive group. Columns without an entry are unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingCondition {
    pub values: BTreeMap<ConditionColumn, ConditionValue>,
}

impl ShardingCondition {
    pub fn get(&self, table: &str, column: &str) -> Option<&ConditionValue> {
        self.values.get(&ConditionColumn::new(table, column))
    }

    /// Intersects `value` into whatever the group already knows about
    /// `column`.
    pub fn fold(
        &mut self,
        column: ConditionColumn,
        value: ConditionValue,
    ) -> Result<(), ShardlineError> {
        let merged = match self.values.get(&column) {
            Some(existing) => existing.intersect(&value)?,
            None => value,
        };
        self.values.insert(column, merged);
        Ok(())
    }

    pub fn is_always_false(&self) -> bool {
        self.values.values().any(ConditionValue::is_always_false)
    }
}

/// Disjunction of conjunctive groups. No groups and not always-false
/// means the statement constrains no sharding column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    pub groups: Vec<ShardingCondition>,
    pub always_false: bool,
}

impl ShardingConditions {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn always_false() -> Self {
        Self {
            groups: Vec::new(),
            always_false: true,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        !self.always_false
            && (self.groups.is_empty() || self.groups.iter().any(|group| group.values.is_empty()))
    }
}
