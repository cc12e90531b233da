use crate::rule::ShardingRule;
use crate::sql::{Operand, StatementContext, StatementKind};
use crate::{ShardlineError, Value};

/// Key column values of an INSERT, one per VALUES row in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKeyContext {
    pub column: String,
    /// The statement omits the key column and the values were generated.
    pub generated: bool,
    pub values: Vec<Value>,
}

/// Resolves the key column of an INSERT into a table with a key generate
/// strategy. Supplied keys are read from literals or bound parameters; an
/// expression key is recorded as NULL since it cannot be evaluated here.
pub fn resolve_generated_key(
    statement: &StatementContext,
    params: &[Value],
    rule: &ShardingRule,
) -> Result<Option<GeneratedKeyContext>, ShardlineError> {
    if statement.kind != StatementKind::Insert {
        return Ok(None);
    }
    let (Some(table), Some(insert)) = (statement.tables.first(), statement.insert.as_ref()) else {
        return Ok(None);
    };
    let Some(table_rule) = rule.table_rule(&table.name) else {
        return Ok(None);
    };
    let Some(strategy) = rule.key_generate_strategy(table_rule) else {
        return Ok(None);
    };

    if insert.columns.is_empty() {
        return Err(ShardlineError::unsupported(format!(
            "INSERT into '{}' must list its columns so the generated key column '{}' can be placed",
            table.name, strategy.column
        )));
    }

    if let Some(index) = insert.column_index(&strategy.column) {
        let mut values = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let value = match row.operands.get(index) {
                Some(Operand::Literal(value)) => value.clone(),
                Some(Operand::Parameter(parameter)) => params
                    .get(*parameter)
                    .cloned()
                    .ok_or_else(|| {
                        ShardlineError::malformed(format!(
                            "parameter {} is not bound ({} parameters supplied)",
                            parameter + 1,
                            params.len()
                        ))
                    })?,
                Some(Operand::Expression) => Value::Null,
                None => {
                    return Err(ShardlineError::malformed(format!(
                        "VALUES row has {} values for {} columns",
                        row.operands.len(),
                        insert.columns.len()
                    )))
                }
            };
            values.push(value);
        }
        return Ok(Some(GeneratedKeyContext {
            column: strategy.column.clone(),
            generated: false,
            values,
        }));
    }

    let values = insert
        .rows
        .iter()
        .map(|_| strategy.generator.generate_key())
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(
        table = %table.name,
        column = %strategy.column,
        generator = strategy.generator.type_name(),
        rows = values.len(),
        "generated insert keys"
    );
    Ok(Some(GeneratedKeyContext {
        column: strategy.column.clone(),
        generated: true,
        values,
    }))
}

#[cfg(test)]
mod tests {
    use super::resolve_generated_key;
    use crate::backend::SqlDialect;
    use crate::keygen::{KeyGenerateAlgorithm, SnowflakeKeyGenerator};
    use crate::rule::{KeyGenerateStrategy, ShardingRule, TableRule};
    use crate::sql::bind_statement;
    use crate::{ErrorCode, ShardlineError, Value};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Counter(AtomicI64);

    impl KeyGenerateAlgorithm for Counter {
        fn type_name(&self) -> &'static str {
            "COUNTER"
        }

        fn generate_key(&self) -> Result<Value, ShardlineError> {
            Ok(Value::Integer(self.0.fetch_add(1, Ordering::SeqCst) + 100))
        }
    }

    fn rule() -> ShardingRule {
        ShardingRule::new().with_table_rule(
            TableRule::from_inline("t_order", "ds_0.t_order_${0..1}")
                .expect("table")
                .with_key_generate_strategy(KeyGenerateStrategy::new(
                    "order_id",
                    Arc::new(Counter::default()),
                )),
        )
    }

    #[test]
    fn generates_one_key_per_row_when_the_column_is_missing() {
        let statement = bind_statement(
            "INSERT INTO t_order (user_id, status) VALUES (1, 'a'), (2, 'b'), (3, 'c')",
            0,
            SqlDialect::MySql,
        )
        .expect("bind");
        let context = resolve_generated_key(&statement, &[], &rule())
            .expect("resolve")
            .expect("key context");
        assert!(context.generated);
        assert_eq!(
            context.values,
            vec![Value::Integer(100), Value::Integer(101), Value::Integer(102)]
        );
    }

    #[test]
    fn reads_supplied_keys_from_literals_and_parameters() {
        let statement = bind_statement(
            "INSERT INTO t_order (order_id, user_id) VALUES (?, 1), (42, 2)",
            1,
            SqlDialect::MySql,
        )
        .expect("bind");
        let context = resolve_generated_key(&statement, &[Value::Integer(7)], &rule())
            .expect("resolve")
            .expect("key context");
        assert!(!context.generated);
        assert_eq!(context.values, vec![Value::Integer(7), Value::Integer(42)]);
    }

    #[test]
    fn tables_without_key_strategy_have_no_context() {
        let statement =
            bind_statement("INSERT INTO t_user (id) VALUES (1)", 0, SqlDialect::MySql).expect("bind");
        assert_eq!(resolve_generated_key(&statement, &[], &rule()).expect("resolve"), None);
    }

    #[test]
    fn insert_without_column_list_cannot_take_a_generated_key() {
        let statement =
            bind_statement("INSERT INTO t_order VALUES (1, 2)", 0, SqlDialect::MySql).expect("bind");
        let error = resolve_generated_key(&statement, &[], &rule()).expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::Unsupported);
    }

    #[test]
    fn snowflake_keys_increase_across_rows() {
        let rule = ShardingRule::new().with_table_rule(
            TableRule::from_inline("t_order", "ds_0.t_order")
                .expect("table")
                .with_key_generate_strategy(KeyGenerateStrategy::new(
                    "order_id",
                    Arc::new(SnowflakeKeyGenerator::new(1).expect("snowflake")),
                )),
        );
        let statement = bind_statement(
            "INSERT INTO t_order (user_id) VALUES (1), (2)",
            0,
            SqlDialect::MySql,
        )
        .expect("bind");
        let values = resolve_generated_key(&statement, &[], &rule)
            .expect("resolve")
            .expect("key context")
            .values;
        assert!(values[1].as_i64() > values[0].as_i64());
    }
}
