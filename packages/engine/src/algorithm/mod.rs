//! Sharding algorithms: map a sharding value (or range of values) to the
//! data source or actual table names it may live in.

mod factory;
mod hash_mod;
mod inline;
mod interval;
mod modulo;
mod range;

use std::fmt;

use crate::condition::ValueRange;
use crate::{ShardlineError, Value};

pub use factory::{AlgorithmFactory, KeyGeneratorConstructor, ShardingAlgorithmConstructor};
pub use hash_mod::HashModShardingAlgorithm;
pub use inline::InlineShardingAlgorithm;
pub use interval::{IntervalShardingAlgorithm, IntervalUnit};
pub use modulo::ModShardingAlgorithm;
pub use range::RangeShardingAlgorithm;

#[derive(Debug, Clone, Copy)]
pub struct PreciseShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub value: &'a Value,
}

#[derive(Debug, Clone, Copy)]
pub struct RangeShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub range: &'a ValueRange,
}

/// A pluggable sharding function. Targets are data source names for a
/// database strategy and actual table names for a table strategy.
pub trait ShardingAlgorithm: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    /// The single target holding `value`, or `None` when no target matches.
    fn do_precise_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>, ShardlineError>;

    /// Every target that may hold a value inside the range, in
    /// `available_targets` order.
    fn do_range_sharding(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>, ShardlineError>;
}

/// Finds the target whose name ends with `suffix`. A numeric suffix must
/// not be preceded by another digit, so `t_order_11` never matches `1`.
pub(crate) fn find_target_by_suffix(available_targets: &[String], suffix: &str) -> Option<String> {
    let numeric = suffix.starts_with(|ch: char| ch.is_ascii_digit());
    available_targets
        .iter()
        .find(|target| {
            let Some(head) = target.strip_suffix(suffix) else {
                return false;
            };
            !(numeric && head.ends_with(|ch: char| ch.is_ascii_digit()))
        })
        .cloned()
}

pub(crate) fn integer_value(value: &Value, algorithm: &str) -> Result<i64, ShardlineError> {
    value.as_i64().ok_or_else(|| {
        ShardlineError::malformed(format!(
            "{algorithm} sharding needs an integer value, got {} '{value}'",
            value.type_name()
        ))
    })
}
