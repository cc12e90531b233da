use std::ops::Bound;

use crate::config::Props;
use crate::ShardlineError;

use super::{
    find_target_by_suffix, integer_value, PreciseShardingValue, RangeShardingValue,
    ShardingAlgorithm,
};

/// `value mod sharding-count`, matched against target suffixes.
#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: i64,
}

impl ModShardingAlgorithm {
    pub fn new(sharding_count: i64) -> Result<Self, ShardlineError> {
        if sharding_count <= 0 {
            return Err(ShardlineError::configuration(format!(
                "MOD sharding-count must be positive, got {sharding_count}"
            )));
        }
        Ok(Self { sharding_count })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardlineError> {
        Self::new(props.require_i64("sharding-count")?)
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "MOD"
    }

    fn do_precise_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>, ShardlineError> {
        let number = integer_value(value.value, self.type_name())?;
        let suffix = number.rem_euclid(self.sharding_count).to_string();
        Ok(find_target_by_suffix(available_targets, &suffix))
    }

    fn do_range_sharding(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>, ShardlineError> {
        let lower = match &value.range.lower {
            Bound::Included(bound) => integer_value(bound, self.type_name())?,
            Bound::Excluded(bound) => integer_value(bound, self.type_name())?.saturating_add(1),
            Bound::Unbounded => return Ok(available_targets.to_vec()),
        };
        let upper = match &value.range.upper {
            Bound::Included(bound) => integer_value(bound, self.type_name())?,
            Bound::Excluded(bound) => integer_value(bound, self.type_name())?.saturating_sub(1),
            Bound::Unbounded => return Ok(available_targets.to_vec()),
        };
        if upper.saturating_sub(lower) >= self.sharding_count - 1 {
            return Ok(available_targets.to_vec());
        }
        let suffixes = (lower..=upper)
            .map(|number| number.rem_euclid(self.sharding_count).to_string())
            .collect::<Vec<_>>();
        Ok(available_targets
            .iter()
            .filter(|target| {
                suffixes.iter().any(|suffix| {
                    find_target_by_suffix(std::slice::from_ref(*target), suffix).is_some()
                })
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::ModShardingAlgorithm;
    use crate::algorithm::{PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};
    use crate::condition::ValueRange;
    use crate::Value;
    use std::ops::Bound;

    fn tables() -> Vec<String> {
        (0..4).map(|index| format!("t_order_{index}")).collect()
    }

    fn precise(algorithm: &ModShardingAlgorithm, value: i64) -> Option<String> {
        algorithm
            .do_precise_sharding(
                &tables(),
                &PreciseShardingValue {
                    logic_table: "t_order",
                    column: "user_id",
                    value: &Value::Integer(value),
                },
            )
            .expect("precise")
    }

    #[test]
    fn maps_values_by_remainder() {
        let algorithm = ModShardingAlgorithm::new(4).expect("algorithm");
        assert_eq!(precise(&algorithm, 1).as_deref(), Some("t_order_1"));
        assert_eq!(precise(&algorithm, 6).as_deref(), Some("t_order_2"));
        assert_eq!(precise(&algorithm, -1).as_deref(), Some("t_order_3"));
    }

    #[test]
    fn short_ranges_enumerate_their_remainders() {
        let algorithm = ModShardingAlgorithm::new(4).expect("algorithm");
        let range = ValueRange::new(
            Bound::Excluded(Value::Integer(4)),
            Bound::Included(Value::Integer(6)),
        );
        let targets = algorithm
            .do_range_sharding(
                &tables(),
                &RangeShardingValue {
                    logic_table: "t_order",
                    column: "user_id",
                    range: &range,
                },
            )
            .expect("range");
        assert_eq!(targets, vec!["t_order_1".to_string(), "t_order_2".to_string()]);

        let range = ValueRange::new(Bound::Included(Value::Integer(0)), Bound::Unbounded);
        let targets = algorithm
            .do_range_sharding(
                &tables(),
                &RangeShardingValue {
                    logic_table: "t_order",
                    column: "user_id",
                    range: &range,
                },
            )
            .expect("range");
        assert_eq!(targets.len(), 4);
    }

    #[test]
    fn text_values_are_rejected() {
        let algorithm = ModShardingAlgorithm::new(4).expect("algorithm");
        let result = algorithm.do_precise_sharding(
            &tables(),
            &PreciseShardingValue {
                logic_table: "t_order",
                column: "user_id",
                value: &Value::Text("abc".to_string()),
            },
        );
        assert!(result.is_err());
        assert!(ModShardingAlgorithm::new(0).is_err());
    }
}
