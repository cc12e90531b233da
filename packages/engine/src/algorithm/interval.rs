use std::ops::Bound;

use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};

use crate::config::Props;
use crate::{ShardlineError, Value};

use super::{find_target_by_suffix, PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl IntervalUnit {
    pub fn parse(name: &str) -> Result<Self, ShardlineError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "seconds" => Ok(Self::Seconds),
            "minutes" => Ok(Self::Minutes),
            "hours" => Ok(Self::Hours),
            "days" => Ok(Self::Days),
            "months" => Ok(Self::Months),
            "years" => Ok(Self::Years),
            other => Err(ShardlineError::configuration(format!(
                "unsupported datetime-interval-unit '{other}'"
            ))),
        }
    }
}

/// Fixed-width time buckets from `datetime-lower` to `datetime-upper`.
/// Each bucket's start, formatted with `sharding-suffix-pattern`, is the
/// target suffix. Patterns use `chrono` strftime syntax.
#[derive(Debug, Clone)]
pub struct IntervalShardingAlgorithm {
    datetime_pattern: String,
    lower: NaiveDateTime,
    upper: NaiveDateTime,
    suffix_pattern: String,
    amount: u32,
    unit: IntervalUnit,
}

impl IntervalShardingAlgorithm {
    pub fn new(
        datetime_pattern: &str,
        lower: &str,
        upper: Option<&str>,
        suffix_pattern: &str,
        amount: i64,
        unit: IntervalUnit,
    ) -> Result<Self, ShardlineError> {
        let lower = parse_datetime(lower, datetime_pattern)
            .map_err(|message| ShardlineError::configuration(format!("datetime-lower: {message}")))?;
        let upper = match upper {
            Some(upper) => parse_datetime(upper, datetime_pattern).map_err(|message| {
                ShardlineError::configuration(format!("datetime-upper: {message}"))
            })?,
            None => chrono::Utc::now().naive_utc(),
        };
        if upper < lower {
            return Err(ShardlineError::configuration(
                "datetime-upper must not precede datetime-lower",
            ));
        }
        let amount = u32::try_from(amount)
            .ok()
            .filter(|amount| *amount > 0)
            .ok_or_else(|| {
                ShardlineError::configuration(format!(
                    "datetime-interval-amount must be positive, got {amount}"
                ))
            })?;
        Ok(Self {
            datetime_pattern: datetime_pattern.to_string(),
            lower,
            upper,
            suffix_pattern: suffix_pattern.to_string(),
            amount,
            unit,
        })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardlineError> {
        let unit = match props.get_str("datetime-interval-unit") {
            Some(unit) => IntervalUnit::parse(&unit)?,
            None => IntervalUnit::Days,
        };
        Self::new(
            &props.require_str("datetime-pattern")?,
            &props.require_str("datetime-lower")?,
            props.get_str("datetime-upper").as_deref(),
            &props.require_str("sharding-suffix-pattern")?,
            props.get_i64("datetime-interval-amount")?.unwrap_or(1),
            unit,
        )
    }

    fn step(&self, at: NaiveDateTime) -> Result<NaiveDateTime, ShardlineError> {
        let amount = i64::from(self.amount);
        let next = match self.unit {
            IntervalUnit::Seconds => TimeDelta::try_seconds(amount).and_then(|delta| at.checked_add_signed(delta)),
            IntervalUnit::Minutes => TimeDelta::try_minutes(amount).and_then(|delta| at.checked_add_signed(delta)),
            IntervalUnit::Hours => TimeDelta::try_hours(amount).and_then(|delta| at.checked_add_signed(delta)),
            IntervalUnit::Days => TimeDelta::try_days(amount).and_then(|delta| at.checked_add_signed(delta)),
            IntervalUnit::Months => at.checked_add_months(Months::new(self.amount)),
            IntervalUnit::Years => self
                .amount
                .checked_mul(12)
                .and_then(|months| at.checked_add_months(Months::new(months))),
        };
        next.ok_or_else(|| ShardlineError::configuration("interval step overflows the calendar"))
    }

    /// Bucket starts `[start, next)` in ascending order.
    fn buckets(&self) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>, ShardlineError> {
        let mut buckets = Vec::new();
        let mut start = self.lower;
        while start <= self.upper {
            let next = self.step(start)?;
            buckets.push((start, next));
            start = next;
        }
        Ok(buckets)
    }

    fn value_datetime(&self, value: &Value) -> Result<NaiveDateTime, ShardlineError> {
        match value {
            Value::Text(text) => parse_datetime(text, &self.datetime_pattern).map_err(|message| {
                ShardlineError::malformed(format!("INTERVAL sharding value '{text}': {message}"))
            }),
            Value::Integer(millis) => chrono::DateTime::from_timestamp_millis(*millis)
                .map(|datetime| datetime.naive_utc())
                .ok_or_else(|| {
                    ShardlineError::malformed(format!("timestamp {millis} is out of range"))
                }),
            other => Err(ShardlineError::malformed(format!(
                "INTERVAL sharding needs a datetime value, got {} '{other}'",
                other.type_name()
            ))),
        }
    }

    fn target_for(&self, available_targets: &[String], bucket_start: NaiveDateTime) -> Option<String> {
        let suffix = bucket_start.format(&self.suffix_pattern).to_string();
        find_target_by_suffix(available_targets, &suffix)
    }
}

impl ShardingAlgorithm for IntervalShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "INTERVAL"
    }

    fn do_precise_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>, ShardlineError> {
        let at = self.value_datetime(value.value)?;
        if at < self.lower || at > self.upper {
            return Ok(None);
        }
        for (start, next) in self.buckets()? {
            if at >= start && at < next {
                return Ok(self.target_for(available_targets, start));
            }
        }
        Ok(None)
    }

    fn do_range_sharding(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>, ShardlineError> {
        let lower = match &value.range.lower {
            Bound::Included(bound) => Bound::Included(self.value_datetime(bound)?),
            Bound::Excluded(bound) => Bound::Excluded(self.value_datetime(bound)?),
            Bound::Unbounded => Bound::Unbounded,
        };
        let upper = match &value.range.upper {
            Bound::Included(bound) => Bound::Included(self.value_datetime(bound)?),
            Bound::Excluded(bound) => Bound::Excluded(self.value_datetime(bound)?),
            Bound::Unbounded => Bound::Unbounded,
        };
        let mut routed = Vec::new();
        for (start, next) in self.buckets()? {
            let after_lower = match lower {
                Bound::Included(at) | Bound::Excluded(at) => next > at,
                Bound::Unbounded => true,
            };
            let before_upper = match upper {
                Bound::Included(at) => start <= at,
                Bound::Excluded(at) => start < at,
                Bound::Unbounded => true,
            };
            if after_lower && before_upper {
                if let Some(target) = self.target_for(available_targets, start) {
                    if !routed.contains(&target) {
                        routed.push(target);
                    }
                }
            }
        }
        Ok(routed)
    }
}

fn parse_datetime(text: &str, pattern: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(text.trim(), pattern)
        .or_else(|_| {
            NaiveDate::parse_from_str(text.trim(), pattern)
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|error| format!("does not match pattern '{pattern}': {error}"))
}

#[cfg(test)]
mod tests {
    use super::{IntervalShardingAlgorithm, IntervalUnit};
    use crate::algorithm::{PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};
    use crate::condition::ValueRange;
    use crate::config::Props;
    use crate::Value;
    use std::ops::Bound;

    fn monthly() -> IntervalShardingAlgorithm {
        IntervalShardingAlgorithm::from_props(
            &Props::new()
                .with("datetime-pattern", "%Y-%m-%d %H:%M:%S")
                .with("datetime-lower", "2016-01-01 00:00:00")
                .with("datetime-upper", "2021-12-31 00:00:00")
                .with("sharding-suffix-pattern", "%Y%m")
                .with("datetime-interval-amount", 1)
                .with("datetime-interval-unit", "Months"),
        )
        .expect("algorithm")
    }

    fn month_tables() -> Vec<String> {
        let mut tables = Vec::new();
        for year in 2016..=2020 {
            for month in 1..=12 {
                tables.push(format!("t_order_{year:04}{month:02}"));
            }
        }
        tables
    }

    #[test]
    fn routes_precise_values_to_their_month() {
        let value = Value::from("2019-10-15 10:59:08");
        let target = monthly()
            .do_precise_sharding(
                &month_tables(),
                &PreciseShardingValue {
                    logic_table: "t_order",
                    column: "create_time",
                    value: &value,
                },
            )
            .expect("precise");
        assert_eq!(target.as_deref(), Some("t_order_201910"));
    }

    #[test]
    fn ranges_cover_every_touched_month() {
        let range = ValueRange::new(
            Bound::Included(Value::from("2019-10-15 10:59:08")),
            Bound::Included(Value::from("2020-04-08 10:59:08")),
        );
        let targets = monthly()
            .do_range_sharding(
                &month_tables(),
                &RangeShardingValue {
                    logic_table: "t_order",
                    column: "create_time",
                    range: &range,
                },
            )
            .expect("range");
        assert_eq!(targets.len(), 7);
        assert_eq!(targets[0], "t_order_201910");
        assert_eq!(targets[6], "t_order_202004");
    }

    #[test]
    fn values_outside_the_window_have_no_target() {
        let value = Value::from("2015-06-01 00:00:00");
        let target = monthly()
            .do_precise_sharding(
                &month_tables(),
                &PreciseShardingValue {
                    logic_table: "t_order",
                    column: "create_time",
                    value: &value,
                },
            )
            .expect("precise");
        assert_eq!(target, None);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(IntervalUnit::parse("fortnights").is_err());
        let error = IntervalShardingAlgorithm::new(
            "%Y-%m-%d",
            "not a date",
            None,
            "%Y%m",
            1,
            IntervalUnit::Days,
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("datetime-lower"));
    }
}
