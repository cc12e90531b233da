use std::ops::Bound;

use crate::keygen::GeneratedKeyContext;
use crate::rule::ShardingRule;
use crate::sql::{
    ColumnSegment, CompareOperator, Operand, Predicate, StatementContext, StatementKind,
};
use crate::{ShardlineError, Value};

use super::{ConditionColumn, ConditionValue, ShardingCondition, ShardingConditions};

/// Above this many OR branches the WHERE clause is treated as
/// unconstrained instead of being expanded.
const MAX_DISJUNCTIVE_GROUPS: usize = 4096;

/// Computes the sharding conditions of a bound statement.
///
/// INSERT yields one group per VALUES row, in row order, with generated
/// keys folded in. Other statements expand WHERE into disjunctive normal
/// form; groups that fold to always-false are dropped, and when every group
/// drops the result is always-false.
pub fn extract_sharding_conditions(
    statement: &StatementContext,
    params: &[Value],
    rule: &ShardingRule,
    generated_key: Option<&GeneratedKeyContext>,
) -> Result<ShardingConditions, ShardlineError> {
    if statement.kind == StatementKind::Insert {
        return insert_conditions(statement, params, rule, generated_key);
    }
    let Some(predicate) = &statement.where_predicate else {
        return Ok(ShardingConditions::unconstrained());
    };
    let Some(branches) = disjunctive_groups(predicate) else {
        tracing::debug!(
            limit = MAX_DISJUNCTIVE_GROUPS,
            "WHERE clause expands past the group limit; routing unconstrained"
        );
        return Ok(ShardingConditions::unconstrained());
    };

    let mut groups = Vec::with_capacity(branches.len());
    for branch in branches {
        let mut group = ShardingCondition::default();
        for leaf in branch {
            if let Some((column, value)) = leaf_condition(statement, params, rule, leaf)? {
                group.fold(column, value)?;
            }
        }
        if !group.is_always_false() {
            groups.push(group);
        }
    }
    if groups.is_empty() {
        return Ok(ShardingConditions::always_false());
    }
    Ok(ShardingConditions {
        groups,
        always_false: false,
    })
}

fn insert_conditions(
    statement: &StatementContext,
    params: &[Value],
    rule: &ShardingRule,
    generated_key: Option<&GeneratedKeyContext>,
) -> Result<ShardingConditions, ShardlineError> {
    let (Some(table), Some(insert)) = (statement.tables.first(), statement.insert.as_ref()) else {
        return Ok(ShardingConditions::unconstrained());
    };
    let mut groups = Vec::with_capacity(insert.rows.len());
    for (row_index, row) in insert.rows.iter().enumerate() {
        let mut group = ShardingCondition::default();
        for (column, operand) in insert.columns.iter().zip(&row.operands) {
            if !rule.is_sharding_column(&table.name, &column.name) {
                continue;
            }
            if let Some(value) = operand_value(operand, params)? {
                group.fold(
                    ConditionColumn::new(&table.name, &column.name),
                    ConditionValue::set(vec![value])?,
                )?;
            }
        }
        if let Some(key) = generated_key.filter(|key| key.generated) {
            if rule.is_sharding_column(&table.name, &key.column) {
                let value = key.values.get(row_index).cloned().ok_or_else(|| {
                    ShardlineError::malformed(format!(
                        "no generated key for VALUES row {}",
                        row_index + 1
                    ))
                })?;
                group.fold(
                    ConditionColumn::new(&table.name, &key.column),
                    ConditionValue::set(vec![value])?,
                )?;
            }
        }
        groups.push(group);
    }
    Ok(ShardingConditions {
        groups,
        always_false: false,
    })
}

/// Expands a predicate tree into OR-of-AND leaf lists. `None` when the
/// expansion would exceed [`MAX_DISJUNCTIVE_GROUPS`].
fn disjunctive_groups(predicate: &Predicate) -> Option<Vec<Vec<&Predicate>>> {
    match predicate {
        Predicate::Or(children) => {
            let mut groups = Vec::new();
            for child in children {
                groups.extend(disjunctive_groups(child)?);
                if groups.len() > MAX_DISJUNCTIVE_GROUPS {
                    return None;
                }
            }
            Some(groups)
        }
        Predicate::And(children) => {
            let mut groups: Vec<Vec<&Predicate>> = vec![Vec::new()];
            for child in children {
                let child_groups = disjunctive_groups(child)?;
                if groups.len().saturating_mul(child_groups.len()) > MAX_DISJUNCTIVE_GROUPS {
                    return None;
                }
                let mut next = Vec::with_capacity(groups.len() * child_groups.len());
                for prefix in &groups {
                    for suffix in &child_groups {
                        let mut combined = prefix.clone();
                        combined.extend(suffix.iter().copied());
                        next.push(combined);
                    }
                }
                groups = next;
            }
            Some(groups)
        }
        leaf => Some(vec![vec![leaf]]),
    }
}

fn leaf_condition(
    statement: &StatementContext,
    params: &[Value],
    rule: &ShardingRule,
    leaf: &Predicate,
) -> Result<Option<(ConditionColumn, ConditionValue)>, ShardlineError> {
    let (column, value) = match leaf {
        Predicate::Compare {
            column,
            operator,
            operand,
        } => {
            let Some(sharding_column) = sharding_column(statement, rule, column) else {
                return Ok(None);
            };
            let Some(value) = operand_value(operand, params)? else {
                return Ok(None);
            };
            let condition = match operator {
                CompareOperator::Eq => ConditionValue::set(vec![value])?,
                CompareOperator::Lt => ConditionValue::range(Bound::Unbounded, Bound::Excluded(value))?,
                CompareOperator::LtEq => {
                    ConditionValue::range(Bound::Unbounded, Bound::Included(value))?
                }
                CompareOperator::Gt => ConditionValue::range(Bound::Excluded(value), Bound::Unbounded)?,
                CompareOperator::GtEq => {
                    ConditionValue::range(Bound::Included(value), Bound::Unbounded)?
                }
            };
            (sharding_column, condition)
        }
        Predicate::In { column, operands } => {
            let Some(sharding_column) = sharding_column(statement, rule, column) else {
                return Ok(None);
            };
            let mut values = Vec::with_capacity(operands.len());
            for operand in operands {
                if matches!(operand, Operand::Expression) {
                    return Ok(None);
                }
                if let Some(value) = operand_value(operand, params)? {
                    values.push(value);
                }
            }
            (sharding_column, ConditionValue::set(values)?)
        }
        Predicate::Between { column, low, high } => {
            let Some(sharding_column) = sharding_column(statement, rule, column) else {
                return Ok(None);
            };
            let (Some(low), Some(high)) = (operand_value(low, params)?, operand_value(high, params)?)
            else {
                return Ok(None);
            };
            (
                sharding_column,
                ConditionValue::range(Bound::Included(low), Bound::Included(high))?,
            )
        }
        Predicate::And(_) | Predicate::Or(_) | Predicate::Other => return Ok(None),
    };
    Ok(Some((column, value)))
}

/// Resolves a column reference to a sharding column of a referenced
/// table. An unqualified column in a multi-table statement resolves only
/// when exactly one table shards on it.
fn sharding_column(
    statement: &StatementContext,
    rule: &ShardingRule,
    column: &ColumnSegment,
) -> Option<ConditionColumn> {
    let table = match statement.resolve_owner(column.owner.as_deref()) {
        Some(table) => table,
        None if column.owner.is_some() => return None,
        None => {
            let mut candidates = statement
                .table_names()
                .into_iter()
                .filter(|table| rule.is_sharding_column(table, &column.name));
            let first = candidates.next()?;
            if candidates.next().is_some() {
                return None;
            }
            first
        }
    };
    rule.is_sharding_column(&table, &column.name)
        .then(|| ConditionColumn::new(&table, &column.name))
}

/// NULL and unevaluable operands yield no value.
fn operand_value(operand: &Operand, params: &[Value]) -> Result<Option<Value>, ShardlineError> {
    let value = match operand {
        Operand::Literal(value) => value.clone(),
        Operand::Parameter(index) => params.get(*index).cloned().ok_or_else(|| {
            ShardlineError::malformed(format!(
                "parameter {} is not bound ({} parameters supplied)",
                index + 1,
                params.len()
            ))
        })?,
        Operand::Expression => return Ok(None),
    };
    Ok((!value.is_null()).then_some(value))
}

#[cfg(test)]
mod tests {
    use super::extract_sharding_conditions;
    use crate::algorithm::ModShardingAlgorithm;
    use crate::backend::SqlDialect;
    use crate::condition::{ConditionValue, ShardingConditions, ValueRange};
    use crate::keygen::GeneratedKeyContext;
    use crate::rule::{ShardingRule, ShardingStrategy, TableRule};
    use crate::sql::bind_statement;
    use crate::{ErrorCode, ShardlineError, Value};
    use std::ops::Bound;
    use std::sync::Arc;

    fn rule() -> ShardingRule {
        let modulo = Arc::new(ModShardingAlgorithm::new(2).expect("mod"));
        ShardingRule::new()
            .with_table_rule(
                TableRule::from_inline("t_order", "ds_${0..1}.t_order_${0..1}")
                    .expect("t_order")
                    .with_database_strategy(ShardingStrategy::standard("user_id", modulo.clone()))
                    .with_table_strategy(ShardingStrategy::standard("order_id", modulo.clone())),
            )
            .with_table_rule(
                TableRule::from_inline("t_user", "ds_${0..1}.t_user")
                    .expect("t_user")
                    .with_database_strategy(ShardingStrategy::standard("id", modulo)),
            )
    }

    fn extract(sql: &str, params: &[Value]) -> Result<ShardingConditions, ShardlineError> {
        let statement = bind_statement(sql, params.len(), SqlDialect::MySql)?;
        extract_sharding_conditions(&statement, params, &rule(), None)
    }

    #[test]
    fn conjunctive_predicates_fold_per_column() {
        let conditions = extract(
            "SELECT * FROM t_order WHERE user_id IN (1, 2, 3) AND user_id >= ? AND status = 'x'",
            &[Value::Integer(2)],
        )
        .expect("extract");
        assert_eq!(conditions.groups.len(), 1);
        assert_eq!(
            conditions.groups[0].get("t_order", "user_id"),
            Some(&ConditionValue::Set(vec![Value::Integer(2), Value::Integer(3)]))
        );
        assert_eq!(conditions.groups[0].values.len(), 1);
    }

    #[test]
    fn disjunctions_become_separate_groups() {
        let conditions = extract(
            "SELECT * FROM t_order WHERE (user_id = 1 AND order_id = 2) OR user_id BETWEEN 5 AND 9",
            &[],
        )
        .expect("extract");
        assert_eq!(conditions.groups.len(), 2);
        assert_eq!(conditions.groups[0].values.len(), 2);
        assert_eq!(
            conditions.groups[1].get("t_order", "user_id"),
            Some(&ConditionValue::Range(ValueRange::new(
                Bound::Included(Value::Integer(5)),
                Bound::Included(Value::Integer(9)),
            )))
        );
    }

    #[test]
    fn contradictory_conditions_are_always_false() {
        let conditions =
            extract("DELETE FROM t_order WHERE user_id = 1 AND user_id = 2", &[]).expect("extract");
        assert!(conditions.always_false);
        assert!(conditions.groups.is_empty());

        let partial = extract(
            "DELETE FROM t_order WHERE (user_id = 1 AND user_id > 4) OR user_id = 7",
            &[],
        )
        .expect("extract");
        assert!(!partial.always_false);
        assert_eq!(partial.groups.len(), 1);
    }

    #[test]
    fn unqualified_columns_resolve_to_the_only_table_sharding_on_them() {
        let conditions = extract(
            "SELECT * FROM t_order o JOIN t_user u ON o.user_id = u.id WHERE id = 3 AND o.order_id = 4",
            &[],
        )
        .expect("extract");
        let group = &conditions.groups[0];
        assert!(group.get("t_user", "id").is_some());
        assert!(group.get("t_order", "order_id").is_some());
    }

    #[test]
    fn null_and_expression_operands_do_not_constrain() {
        let conditions = extract(
            "SELECT * FROM t_order WHERE user_id = NULL AND order_id = ABS(-1)",
            &[],
        )
        .expect("extract");
        assert!(conditions.is_unconstrained());
    }

    #[test]
    fn mixed_kind_values_are_malformed() {
        let error = extract("SELECT * FROM t_order WHERE user_id IN (1, 'a')", &[])
            .expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::MalformedStatement);
    }

    #[test]
    fn insert_rows_get_one_group_each_with_generated_keys() {
        let statement = bind_statement(
            "INSERT INTO t_order (user_id, status) VALUES (?, 'a'), (3, 'b')",
            1,
            SqlDialect::MySql,
        )
        .expect("bind");
        let key = GeneratedKeyContext {
            column: "order_id".to_string(),
            generated: true,
            values: vec![Value::Integer(10), Value::Integer(11)],
        };
        let conditions =
            extract_sharding_conditions(&statement, &[Value::Integer(2)], &rule(), Some(&key))
                .expect("extract");
        assert_eq!(conditions.groups.len(), 2);
        assert_eq!(
            conditions.groups[0].get("t_order", "user_id"),
            Some(&ConditionValue::Set(vec![Value::Integer(2)]))
        );
        assert_eq!(
            conditions.groups[1].get("t_order", "order_id"),
            Some(&ConditionValue::Set(vec![Value::Integer(11)]))
        );
    }
}
