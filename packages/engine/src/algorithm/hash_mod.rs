use xxhash_rust::xxh3::xxh3_64;

use crate::config::Props;
use crate::{ShardlineError, Value};

use super::{find_target_by_suffix, PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};

/// Stable xxh3 hash of the value's text form, modulo `sharding-count`.
/// Hashing destroys ordering, so ranges always hit every target.
#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: u64,
}

impl HashModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> Result<Self, ShardlineError> {
        if sharding_count <= 0 {
            return Err(ShardlineError::configuration(format!(
                "HASH_MOD sharding-count must be positive, got {sharding_count}"
            )));
        }
        Ok(Self {
            sharding_count: sharding_count as u64,
        })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardlineError> {
        Self::new(props.require_i64("sharding-count")?)
    }

    fn bucket(&self, value: &Value) -> u64 {
        let hash = match value {
            Value::Blob(bytes) => xxh3_64(bytes),
            other => xxh3_64(other.to_string().as_bytes()),
        };
        hash % self.sharding_count
    }
}

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "HASH_MOD"
    }

    fn do_precise_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>, ShardlineError> {
        let suffix = self.bucket(value.value).to_string();
        Ok(find_target_by_suffix(available_targets, &suffix))
    }

    fn do_range_sharding(
        &self,
        available_targets: &[String],
        _value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>, ShardlineError> {
        Ok(available_targets.to_vec())
    }
}
