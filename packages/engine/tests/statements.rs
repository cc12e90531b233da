mod support;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use shardline_engine::rewrite::{ColumnTransformRule, ValueTransformer};
use shardline_engine::{
    open_shardline, AlgorithmFactory, KeyGenerateAlgorithm, OpenShardlineConfig, Shardline,
    ShardingRule, ShardingRuleConfig, ShardlineError, SqlDialect, Value,
};

use support::sqlite_shards::ShardCluster;

const RULE: &str = r#"{
    "tables": {
        "t_order": {
            "actual_data_nodes": "ds_${0..1}.t_order",
            "database_strategy": {
                "standard": { "sharding_column": "order_id", "algorithm_name": "mod_2" }
            },
            "key_generate_strategy": { "column": "order_id", "generator_name": "sequence" }
        },
        "t_user": {
            "actual_data_nodes": "ds_0.t_user_${0..1}",
            "table_strategy": {
                "standard": { "sharding_column": "user_id", "algorithm_name": "mod_2" }
            }
        }
    },
    "sharding_algorithms": {
        "mod_2": { "type": "MOD", "props": { "sharding-count": 2 } }
    },
    "key_generators": {
        "sequence": { "type": "SEQUENCE", "props": { "start": 1 } }
    }
}"#;

/// Hands out consecutive keys so tests can predict where rows land.
#[derive(Debug)]
struct SequenceKeyGenerator(AtomicI64);

impl KeyGenerateAlgorithm for SequenceKeyGenerator {
    fn type_name(&self) -> &'static str {
        "SEQUENCE"
    }

    fn generate_key(&self) -> Result<Value, ShardlineError> {
        Ok(Value::Integer(self.0.fetch_add(1, Ordering::SeqCst)))
    }
}

fn cluster() -> ShardCluster {
    let cluster = ShardCluster::new(&["ds_0", "ds_1"]);
    for shard in cluster.shards() {
        shard.setup("CREATE TABLE t_order (order_id INTEGER, user_id INTEGER, status TEXT);");
    }
    cluster.shard("ds_0").setup(
        "CREATE TABLE t_user_0 (user_id INTEGER, pwd TEXT, pwd_idx TEXT);
         CREATE TABLE t_user_1 (user_id INTEGER, pwd TEXT, pwd_idx TEXT);",
    );
    cluster
}

fn tagging(tag: &'static str) -> Arc<dyn ValueTransformer> {
    Arc::new(move |value: &Value| -> Result<Value, ShardlineError> {
        Ok(Value::Text(format!("{tag}:{value}")))
    })
}

async fn open(cluster: &ShardCluster, dialect: SqlDialect) -> Shardline {
    let mut factory = AlgorithmFactory::default();
    factory.register_key_generator("SEQUENCE", |props| {
        let start = props.get_i64("start")?.unwrap_or(0);
        Ok(Arc::new(SequenceKeyGenerator(AtomicI64::new(start))))
    });
    let config = ShardingRuleConfig::from_json(RULE).expect("rule json");
    let rule = ShardingRule::from_config(&config, &factory).expect("rule");
    let transform = ColumnTransformRule::new("t_user", "pwd", tagging("enc"))
        .with_assisted_query("pwd_idx", tagging("idx"));
    open_shardline(
        OpenShardlineConfig::new(rule, cluster.backends(), dialect).with_transform(transform),
    )
    .await
    .expect("open shardline")
}

shard_test!(generated_keys_route_each_row, |dialect| async move {
    let cluster = cluster();
    let shardline = open(&cluster, dialect).await;

    let plan = shardline
        .plan(
            "INSERT INTO t_order (user_id, status) VALUES (?, ?), (?, ?), (?, ?)",
            &[
                Value::Integer(10),
                Value::from("a"),
                Value::Integer(11),
                Value::from("b"),
                Value::Integer(12),
                Value::from("c"),
            ],
        )
        .expect("plan");
    let generated = plan.generated_key.as_ref().expect("generated key");
    assert!(generated.generated);
    assert_eq!(
        generated.values,
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
    assert_eq!(plan.units.len(), 2);

    let outcome = shardline.execute_plan(&plan).await.expect("insert");
    assert_eq!(outcome.rows_affected(), Some(3));
    assert_eq!(
        cluster
            .shard("ds_1")
            .query("SELECT order_id, user_id, status FROM t_order ORDER BY order_id"),
        vec![
            vec![Value::Integer(1), Value::Integer(10), Value::from("a")],
            vec![Value::Integer(3), Value::Integer(12), Value::from("c")],
        ]
    );
    assert_eq!(
        cluster
            .shard("ds_0")
            .query("SELECT order_id, user_id, status FROM t_order"),
        vec![vec![Value::Integer(2), Value::Integer(11), Value::from("b")]]
    );
});

shard_test!(supplied_keys_are_not_regenerated, |dialect| async move {
    let cluster = cluster();
    let shardline = open(&cluster, dialect).await;

    shardline
        .execute(
            "INSERT INTO t_order (order_id, user_id, status) VALUES (8, 1, 'x')",
            &[],
        )
        .await
        .expect("insert");
    assert_eq!(
        cluster.shard("ds_0").executed_sql(),
        vec!["INSERT INTO t_order (order_id, user_id, status) VALUES (8, 1, 'x')"]
    );
    assert!(cluster.shard("ds_1").calls().is_empty());
});

shard_test!(always_false_statements_send_nothing, |dialect| async move {
    let cluster = cluster();
    let shardline = open(&cluster, dialect).await;

    let mut cursor = shardline
        .execute(
            "SELECT order_id, status FROM t_order WHERE order_id = ? AND order_id = ?",
            &[Value::Integer(1), Value::Integer(2)],
        )
        .await
        .expect("select")
        .into_cursor()
        .expect("rows");
    assert_eq!(cursor.columns(), ["order_id".to_string(), "status".to_string()]);
    assert!(!cursor.next().expect("next"));

    let outcome = shardline
        .execute(
            "DELETE FROM t_order WHERE order_id IN (1, 3) AND order_id > 5",
            &[],
        )
        .await
        .expect("delete");
    assert_eq!(outcome.rows_affected(), Some(0));
    assert_eq!(cluster.total_calls(), 0);
});

shard_test!(transformed_columns_are_queried_through_assisted_columns, |dialect| async move {
    let cluster = cluster();
    let shardline = open(&cluster, dialect).await;

    shardline
        .execute(
            "INSERT INTO t_user (user_id, pwd) VALUES (?, ?)",
            &[Value::Integer(7), Value::from("s3cret")],
        )
        .await
        .expect("insert");
    assert_eq!(
        cluster
            .shard("ds_0")
            .query("SELECT user_id, pwd, pwd_idx FROM t_user_1"),
        vec![vec![
            Value::Integer(7),
            Value::from("enc:s3cret"),
            Value::from("idx:s3cret"),
        ]]
    );

    let mut cursor = shardline
        .execute("SELECT user_id FROM t_user WHERE pwd = ?", &[Value::from("s3cret")])
        .await
        .expect("select")
        .into_cursor()
        .expect("rows");
    assert_eq!(
        cursor.collect_rows().expect("rows"),
        vec![vec![Value::Integer(7)]]
    );
});
