use std::ops::Bound;

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use shardline_engine::condition::ConditionValue;
use shardline_engine::Value;

fn bound() -> impl Strategy<Value = Bound<Value>> {
    prop_oneof![
        Just(Bound::Unbounded),
        (0i64..12).prop_map(|value| Bound::Included(Value::Integer(value))),
        (0i64..12).prop_map(|value| Bound::Excluded(Value::Integer(value))),
    ]
}

fn condition() -> impl Strategy<Value = ConditionValue> {
    prop_oneof![
        prop_vec(0i64..12, 0..6).prop_map(|values| {
            ConditionValue::set(values.into_iter().map(Value::Integer).collect())
                .expect("integer sets are comparable")
        }),
        (bound(), bound()).prop_map(|(lower, upper)| {
            ConditionValue::range(lower, upper).expect("integer ranges are comparable")
        }),
        Just(ConditionValue::AlwaysFalse),
    ]
}

/// Which of the sample values 0..12 a condition admits.
fn admitted(condition: &ConditionValue) -> Vec<i64> {
    (-1i64..13)
        .filter(|sample| {
            let single = ConditionValue::set(vec![Value::Integer(*sample)]).expect("sample");
            !condition.intersect(&single).expect("intersect").is_always_false()
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_folding_is_commutative(left in condition(), right in condition()) {
        let forward = left.intersect(&right).expect("intersect");
        let backward = right.intersect(&left).expect("intersect");
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_folding_is_associative(a in condition(), b in condition(), c in condition()) {
        let grouped_left = a
            .intersect(&b)
            .and_then(|ab| ab.intersect(&c))
            .expect("intersect");
        let grouped_right = b
            .intersect(&c)
            .and_then(|bc| a.intersect(&bc))
            .expect("intersect");
        prop_assert_eq!(admitted(&grouped_left), admitted(&grouped_right));
        prop_assert_eq!(grouped_left.is_always_false(), grouped_right.is_always_false());
    }

    #[test]
    fn prop_folding_never_widens(left in condition(), right in condition()) {
        let folded = left.intersect(&right).expect("intersect");
        let left_admits = admitted(&left);
        let right_admits = admitted(&right);
        for value in admitted(&folded) {
            prop_assert!(left_admits.contains(&value));
            prop_assert!(right_admits.contains(&value));
        }
    }
}
