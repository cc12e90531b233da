use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::Connection;

use shardline_engine::execute::BackendMap;
use shardline_engine::{QueryResult, ShardBackend, ShardlineError, Value};

/// One in-memory SQLite database standing in for a data source. Every
/// statement it receives is recorded.
pub struct SqliteShard {
    name: String,
    connection: Mutex<Connection>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl SqliteShard {
    pub fn open(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connection: Mutex::new(
                Connection::open_in_memory().expect("failed to open in-memory sqlite"),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Runs setup SQL directly, bypassing the call log.
    pub fn setup(&self, sql: &str) {
        self.connection
            .lock()
            .expect("sqlite connection mutex poisoned")
            .execute_batch(sql)
            .unwrap_or_else(|error| panic!("setup on {} failed: {error}", self.name));
    }

    /// Reads rows directly, bypassing the call log.
    pub fn query(&self, sql: &str) -> Vec<Vec<Value>> {
        let connection = self
            .connection
            .lock()
            .expect("sqlite connection mutex poisoned");
        run(&connection, sql, &[])
            .unwrap_or_else(|error| panic!("query on {} failed: {error}", self.name))
            .rows
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().expect("call log mutex poisoned").clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.calls().into_iter().map(|(sql, _)| sql).collect()
    }
}

#[async_trait::async_trait(?Send)]
impl ShardBackend for SqliteShard {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, ShardlineError> {
        self.calls
            .lock()
            .map_err(|_| ShardlineError::backend(&self.name, "call log mutex poisoned"))?
            .push((sql.to_string(), params.to_vec()));
        let connection = self
            .connection
            .lock()
            .map_err(|_| ShardlineError::backend(&self.name, "connection mutex poisoned"))?;
        run(&connection, sql, params)
            .map_err(|error| ShardlineError::backend(&self.name, error.to_string()))
    }
}

fn run(connection: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<QueryResult> {
    let mut statement = connection.prepare(sql)?;
    let columns = statement
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let bound = rusqlite::params_from_iter(params.iter().map(to_sqlite));
    if columns.is_empty() {
        let changed = statement.execute(bound)?;
        return Ok(QueryResult::affected(changed as u64));
    }
    let mut rows = statement.query(bound)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(from_sqlite(row.get_ref(index)?));
        }
        out.push(values);
    }
    Ok(QueryResult::with_rows(columns, out))
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Boolean(flag) => SqliteValue::Integer(i64::from(*flag)),
        Value::Integer(value) => SqliteValue::Integer(*value),
        Value::Real(value) => SqliteValue::Real(*value),
        Value::Text(value) => SqliteValue::Text(value.clone()),
        Value::Blob(value) => SqliteValue::Blob(value.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Integer(value),
        ValueRef::Real(value) => Value::Real(value),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

/// A named set of SQLite shards.
pub struct ShardCluster {
    shards: BTreeMap<String, Arc<SqliteShard>>,
}

impl ShardCluster {
    pub fn new(names: &[&str]) -> Self {
        Self {
            shards: names
                .iter()
                .map(|name| (name.to_string(), Arc::new(SqliteShard::open(name))))
                .collect(),
        }
    }

    pub fn shard(&self, name: &str) -> &SqliteShard {
        self.shards
            .get(name)
            .unwrap_or_else(|| panic!("unknown shard {name}"))
    }

    pub fn shards(&self) -> impl Iterator<Item = &SqliteShard> {
        self.shards.values().map(Arc::as_ref)
    }

    pub fn backends(&self) -> BackendMap {
        self.shards
            .iter()
            .map(|(name, shard)| (name.clone(), shard.clone() as Arc<dyn ShardBackend>))
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.shards().map(|shard| shard.calls().len()).sum()
    }
}
