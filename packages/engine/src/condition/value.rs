use std::cmp::Ordering;
use std::ops::Bound;

use crate::{ShardlineError, Value};

/// A half-bounded or bounded interval over comparable scalars.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ValueRange {
    pub fn new(lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Self { lower, upper }
    }

    pub fn unbounded() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn contains(&self, value: &Value) -> Result<bool, ShardlineError> {
        let above_lower = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(lower) => compare(value, lower)? != Ordering::Less,
            Bound::Excluded(lower) => compare(value, lower)? == Ordering::Greater,
        };
        if !above_lower {
            return Ok(false);
        }
        Ok(match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(upper) => compare(value, upper)? != Ordering::Greater,
            Bound::Excluded(upper) => compare(value, upper)? == Ordering::Less,
        })
    }

    pub fn is_empty(&self) -> Result<bool, ShardlineError> {
        let (lower, lower_closed) = match &self.lower {
            Bound::Unbounded => return Ok(false),
            Bound::Included(value) => (value, true),
            Bound::Excluded(value) => (value, false),
        };
        let (upper, upper_closed) = match &self.upper {
            Bound::Unbounded => return Ok(false),
            Bound::Included(value) => (value, true),
            Bound::Excluded(value) => (value, false),
        };
        Ok(match compare(lower, upper)? {
            Ordering::Greater => true,
            Ordering::Equal => !(lower_closed && upper_closed),
            Ordering::Less => false,
        })
    }

    /// Whether two ranges share at least one point.
    pub fn intersects(&self, other: &ValueRange) -> Result<bool, ShardlineError> {
        Ok(!self.intersect(other)?.is_empty()?)
    }

    pub fn intersect(&self, other: &ValueRange) -> Result<ValueRange, ShardlineError> {
        Ok(ValueRange {
            lower: tighter_lower(&self.lower, &other.lower)?,
            upper: tighter_upper(&self.upper, &other.upper)?,
        })
    }
}

/// Merged condition on one column within one conjunctive group.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// Sorted, deduplicated candidate values.
    Set(Vec<Value>),
    Range(ValueRange),
    AlwaysFalse,
}

impl ConditionValue {
    pub fn set(values: Vec<Value>) -> Result<Self, ShardlineError> {
        let mut values = values;
        if let Some(first) = values.first() {
            for value in &values[1..] {
                compare(first, value)?;
            }
        }
        values.sort_by(|left, right| left.compare(right).unwrap_or(Ordering::Equal));
        values.dedup_by(|left, right| left.compare(right) == Some(Ordering::Equal));
        if values.is_empty() {
            return Ok(Self::AlwaysFalse);
        }
        Ok(Self::Set(values))
    }

    pub fn range(lower: Bound<Value>, upper: Bound<Value>) -> Result<Self, ShardlineError> {
        let range = ValueRange::new(lower, upper);
        if range.is_empty()? {
            return Ok(Self::AlwaysFalse);
        }
        Ok(Self::Range(range))
    }

    pub fn is_always_false(&self) -> bool {
        matches!(self, Self::AlwaysFalse)
    }

    /// Intersects two conditions on the same column. Folding never unions:
    /// an empty result is `AlwaysFalse`.
    pub fn intersect(&self, other: &ConditionValue) -> Result<ConditionValue, ShardlineError> {
        match (self, other) {
            (Self::AlwaysFalse, _) | (_, Self::AlwaysFalse) => Ok(Self::AlwaysFalse),
            (Self::Set(left), Self::Set(right)) => {
                let mut kept = Vec::new();
                for value in left {
                    let mut found = false;
                    for candidate in right {
                        if compare(value, candidate)? == Ordering::Equal {
                            found = true;
                            break;
                        }
                    }
                    if found {
                        kept.push(value.clone());
                    }
                }
                Self::set(kept)
            }
            (Self::Set(values), Self::Range(range)) | (Self::Range(range), Self::Set(values)) => {
                let mut kept = Vec::new();
                for value in values {
                    if range.contains(value)? {
                        kept.push(value.clone());
                    }
                }
                Self::set(kept)
            }
            (Self::Range(left), Self::Range(right)) => {
                let merged = left.intersect(right)?;
                Self::range(merged.lower, merged.upper)
            }
        }
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, ShardlineError> {
    left.compare(right).ok_or_else(|| {
        ShardlineError::malformed(format!(
            "cannot compare {} value '{left}' with {} value '{right}'",
            left.type_name(),
            right.type_name()
        ))
    })
}

fn tighter_lower(left: &Bound<Value>, right: &Bound<Value>) -> Result<Bound<Value>, ShardlineError> {
    Ok(match (left, right) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => {
            match compare(a, b)? {
                Ordering::Greater => left.clone(),
                Ordering::Less => right.clone(),
                Ordering::Equal => {
                    if matches!(left, Bound::Excluded(_)) {
                        left.clone()
                    } else {
                        right.clone()
                    }
                }
            }
        }
    })
}

fn tighter_upper(left: &Bound<Value>, right: &Bound<Value>) -> Result<Bound<Value>, ShardlineError> {
    Ok(match (left, right) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(a) | Bound::Excluded(a), Bound::Included(b) | Bound::Excluded(b)) => {
            match compare(a, b)? {
                Ordering::Less => left.clone(),
                Ordering::Greater => right.clone(),
                Ordering::Equal => {
                    if matches!(left, Bound::Excluded(_)) {
                        left.clone()
                    } else {
                        right.clone()
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{ConditionValue, ValueRange};
    use crate::{ErrorCode, Value};
    use std::ops::Bound;

    fn ints(values: &[i64]) -> ConditionValue {
        ConditionValue::set(values.iter().copied().map(Value::Integer).collect()).expect("set")
    }

    #[test]
    fn sets_are_sorted_and_deduplicated() {
        assert_eq!(
            ints(&[3, 1, 3, 2]),
            ConditionValue::Set(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn set_intersection_keeps_common_values() {
        assert_eq!(ints(&[1, 2, 3]).intersect(&ints(&[2, 3, 4])).expect("fold"), ints(&[2, 3]));
        assert!(ints(&[1]).intersect(&ints(&[2])).expect("fold").is_always_false());
    }

    #[test]
    fn set_is_filtered_by_range() {
        let range = ConditionValue::range(
            Bound::Excluded(Value::Integer(1)),
            Bound::Included(Value::Integer(3)),
        )
        .expect("range");
        assert_eq!(ints(&[1, 2, 3, 4]).intersect(&range).expect("fold"), ints(&[2, 3]));
    }

    #[test]
    fn ranges_intersect_to_the_tighter_bounds() {
        let left = ConditionValue::range(Bound::Included(Value::Integer(5)), Bound::Unbounded)
            .expect("range");
        let right = ConditionValue::range(Bound::Unbounded, Bound::Excluded(Value::Integer(5)))
            .expect("range");
        assert!(left.intersect(&right).expect("fold").is_always_false());

        let right = ConditionValue::range(Bound::Excluded(Value::Integer(5)), Bound::Unbounded)
            .expect("range");
        assert_eq!(
            left.intersect(&right).expect("fold"),
            ConditionValue::Range(ValueRange::new(
                Bound::Excluded(Value::Integer(5)),
                Bound::Unbounded
            ))
        );
    }

    #[test]
    fn string_ranges_are_supported() {
        let range = ValueRange::new(
            Bound::Included(Value::from("b")),
            Bound::Excluded(Value::from("d")),
        );
        assert_eq!(range.contains(&Value::from("c")), Ok(true));
        assert_eq!(range.contains(&Value::from("d")), Ok(false));
    }

    #[test]
    fn non_comparable_operands_are_malformed() {
        let error = ConditionValue::set(vec![Value::Integer(1), Value::from("a")])
            .expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::MalformedStatement);
        let error = ints(&[1])
            .intersect(&ConditionValue::set(vec![Value::from("1")]).expect("set"))
            .expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::MalformedStatement);
    }
}
