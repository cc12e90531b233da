use std::ops::Bound;

use crate::condition::ValueRange;
use crate::config::Props;
use crate::{ShardlineError, Value};

use super::{find_target_by_suffix, PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};

/// Partition `i` covers `partitions[i]`; its targets carry suffix `i`.
/// Partitions are ordered, contiguous and cover the whole value domain.
#[derive(Debug, Clone)]
pub struct RangeShardingAlgorithm {
    kind: &'static str,
    partitions: Vec<ValueRange>,
}

impl RangeShardingAlgorithm {
    /// `(-inf, lower)`, then `sharding-volume` wide slices up to `upper`,
    /// then `[upper, +inf)`.
    pub fn volume(lower: i64, upper: i64, volume: i64) -> Result<Self, ShardlineError> {
        if volume <= 0 || upper <= lower {
            return Err(ShardlineError::configuration(format!(
                "VOLUME_RANGE needs range-lower < range-upper and a positive sharding-volume, \
                 got {lower}, {upper}, {volume}"
            )));
        }
        let mut partitions = vec![ValueRange::new(
            Bound::Unbounded,
            Bound::Excluded(Value::Integer(lower)),
        )];
        let mut start = lower;
        while start < upper {
            let stop = start.saturating_add(volume).min(upper);
            partitions.push(ValueRange::new(
                Bound::Included(Value::Integer(start)),
                Bound::Excluded(Value::Integer(stop)),
            ));
            start = stop;
        }
        partitions.push(ValueRange::new(
            Bound::Included(Value::Integer(upper)),
            Bound::Unbounded,
        ));
        Ok(Self {
            kind: "VOLUME_RANGE",
            partitions,
        })
    }

    /// `(-inf, b0)`, `[b0, b1)`, ..., `[bn, +inf)`. Boundaries may be any
    /// comparable scalars, strings included.
    pub fn boundaries(boundaries: Vec<Value>) -> Result<Self, ShardlineError> {
        if boundaries.is_empty() {
            return Err(ShardlineError::configuration(
                "BOUNDARY_RANGE needs at least one boundary",
            ));
        }
        for pair in boundaries.windows(2) {
            if pair[0].compare(&pair[1]) != Some(std::cmp::Ordering::Less) {
                return Err(ShardlineError::configuration(format!(
                    "BOUNDARY_RANGE boundaries must be strictly increasing, got '{}' then '{}'",
                    pair[0], pair[1]
                )));
            }
        }
        let mut partitions = Vec::with_capacity(boundaries.len() + 1);
        let mut lower = Bound::Unbounded;
        for boundary in boundaries {
            partitions.push(ValueRange::new(lower, Bound::Excluded(boundary.clone())));
            lower = Bound::Included(boundary);
        }
        partitions.push(ValueRange::new(lower, Bound::Unbounded));
        Ok(Self {
            kind: "BOUNDARY_RANGE",
            partitions,
        })
    }

    pub fn volume_from_props(props: &Props) -> Result<Self, ShardlineError> {
        Self::volume(
            props.require_i64("range-lower")?,
            props.require_i64("range-upper")?,
            props.require_i64("sharding-volume")?,
        )
    }

    pub fn boundaries_from_props(props: &Props) -> Result<Self, ShardlineError> {
        let boundaries = props
            .require_str("sharding-ranges")?
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.parse::<i64>() {
                Ok(number) => Value::Integer(number),
                Err(_) => Value::Text(part.trim_matches('\'').to_string()),
            })
            .collect();
        Self::boundaries(boundaries)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

impl ShardingAlgorithm for RangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        self.kind
    }

    fn do_precise_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>, ShardlineError> {
        for (index, partition) in self.partitions.iter().enumerate() {
            if partition.contains(value.value)? {
                return Ok(find_target_by_suffix(available_targets, &index.to_string()));
            }
        }
        Ok(None)
    }

    fn do_range_sharding(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>, ShardlineError> {
        let mut suffixes = Vec::new();
        for (index, partition) in self.partitions.iter().enumerate() {
            if partition.intersects(value.range)? {
                suffixes.push(index.to_string());
            }
        }
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
