// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Sink lifecycle tests against an in-memory connector

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use clickhouse_ingester::bind::{Param, SqlType};
use clickhouse_ingester::statement::{Connection, Connector, Statement};
use clickhouse_ingester::{
    ClickHouseSink, Config, ConnectionOptions, Dataset, Environment, Error, Plugin, Result, Row,
    RowSchema, TableSchema, Value,
};
use derive_new::new;
use parking_lot::Mutex;
use serde_json::json;

#[derive(Debug, Default)]
struct Recorder {
    connects: Vec<ConnectionOptions>,
    described: Vec<String>,
    prepared: Vec<String>,
    executed: Vec<Vec<Vec<Param>>>,
}

#[derive(new)]
struct MockConnector {
    schema: TableSchema,
    recorder: Arc<Mutex<Recorder>>,
    #[new(default)]
    failures: Arc<Mutex<VecDeque<Error>>>,
    // Binding this id panics the partition worker
    #[new(default)]
    panic_on_id: Option<i64>,
}

impl MockConnector {
    fn fail_with(self, errors: Vec<Error>) -> Self {
        *self.failures.lock() = errors.into();
        self
    }

    fn panic_on(mut self, id: i64) -> Self {
        self.panic_on_id = Some(id);
        self
    }
}

struct MockConnection {
    schema: TableSchema,
    recorder: Arc<Mutex<Recorder>>,
    failures: Arc<Mutex<VecDeque<Error>>>,
    panic_on_id: Option<i64>,
}

struct MockStatement {
    recorder: Arc<Mutex<Recorder>>,
    failures: Arc<Mutex<VecDeque<Error>>>,
    panic_on_id: Option<i64>,
    current: Vec<Option<Param>>,
    batch: Vec<Vec<Param>>,
    closed: bool,
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, options: &ConnectionOptions) -> Result<MockConnection> {
        self.recorder.lock().connects.push(options.clone());
        Ok(MockConnection {
            schema: self.schema.clone(),
            recorder: self.recorder.clone(),
            failures: self.failures.clone(),
            panic_on_id: self.panic_on_id,
        })
    }
}

#[async_trait]
impl Connection for MockConnection {
    type Statement = MockStatement;

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        self.recorder.lock().described.push(table.to_string());
        Ok(self.schema.clone())
    }

    fn prepare_statement(&self, sql: &str) -> Result<MockStatement> {
        self.recorder.lock().prepared.push(sql.to_string());
        Ok(MockStatement {
            recorder: self.recorder.clone(),
            failures: self.failures.clone(),
            panic_on_id: self.panic_on_id,
            current: vec![None; sql.matches('?').count()],
            batch: vec![],
            closed: false,
        })
    }
}

#[async_trait]
impl Statement for MockStatement {
    fn bind(&mut self, index: usize, param: Param) -> Result<()> {
        if let (Some(id), Param::Long(bound)) = (self.panic_on_id, &param) {
            assert_ne!(id, *bound, "cannot bind id {id}");
        }
        self.current[index] = Some(param);
        Ok(())
    }

    fn add_batch(&mut self) -> Result<()> {
        let row = self.current.iter_mut().map(|p| p.take().unwrap()).collect();
        self.batch.push(row);
        Ok(())
    }

    fn batch_len(&self) -> usize {
        self.batch.len()
    }

    async fn execute_batch(&mut self) -> Result<usize> {
        if let Some(e) = self.failures.lock().pop_front() {
            return Err(e);
        }
        let rows = std::mem::take(&mut self.batch);
        let written = rows.len();
        if written > 0 {
            self.recorder.lock().executed.push(rows);
        }
        Ok(written)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn users_schema() -> TableSchema {
    TableSchema::from_pairs(
        "users",
        [
            ("id", "UInt32"),
            ("name", "LowCardinality(String)"),
            ("score", "Nullable(Float64)"),
            ("tags", "Array(String)"),
            ("created", "DateTime"),
        ],
    )
}

fn sink_config(extra: serde_json::Value) -> Config {
    let mut config = Config::from_json(json!({
        "host": "ch1:8123,ch2:8123",
        "database": "default",
        "table": "users",
        "username": "default",
        "password": "secret",
        "clickhouse": { "max_insert_threads": "4" },
    }))
    .unwrap();
    for (key, value) in Config::from_json(extra).unwrap().entries() {
        config.set(key.clone(), value.clone());
    }
    config
}

fn dataset(partitions: &[usize]) -> Dataset<tokio_stream::Iter<std::vec::IntoIter<Row>>> {
    let schema = Arc::new(RowSchema::new(["id", "name", "score"]));
    let mut next_id = 0;
    let partitions = partitions
        .iter()
        .map(|count| {
            let rows: Vec<Row> = (0..*count)
                .map(|_| {
                    next_id += 1;
                    Row::new(
                        schema.clone(),
                        vec![
                            Value::Int64(next_id),
                            Value::from(format!("user{next_id}")),
                            Value::Null,
                        ],
                    )
                })
                .collect();
            tokio_stream::iter(rows)
        })
        .collect();
    Dataset::new(schema, partitions)
}

async fn checked_sink(
    extra: serde_json::Value,
    connector: MockConnector,
) -> ClickHouseSink<MockConnector> {
    let mut sink = ClickHouseSink::with_connector(connector);
    sink.set_config(sink_config(extra));
    let result = sink.check_config().await;
    assert!(result.is_success(), "{}", result.msg());
    sink.prepare(&Environment::default().with_parallelism(2))
        .unwrap();
    sink
}

#[tokio::test]
async fn test_check_config_reads_table_schema() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let connector = MockConnector::new(users_schema(), recorder.clone());
    let sink = checked_sink(json!({ "fields": ["id", "name"] }), connector).await;

    assert_eq!(sink.table_schema().unwrap().len(), 5);
    let recorder = recorder.lock();
    assert_eq!(recorder.described, vec!["users"]);
    let options = &recorder.connects[0];
    assert_eq!(options.hosts, vec!["ch1:8123", "ch2:8123"]);
    assert_eq!(options.property("max_insert_threads"), Some("4"));
}

#[tokio::test]
async fn test_check_config_rejects_unknown_field() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut sink = ClickHouseSink::with_connector(MockConnector::new(users_schema(), recorder));
    sink.set_config(sink_config(json!({ "fields": ["id", "missing_field"] })));

    let result = sink.check_config().await;
    assert!(!result.is_success());
    assert_eq!(result.msg(), "field missing_field not exist in table users");
}

#[tokio::test]
async fn test_check_config_rejects_unsupported_type() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let schema = TableSchema::from_pairs("users", [("id", "UInt32"), ("uid", "UUID")]);
    let mut sink = ClickHouseSink::with_connector(MockConnector::new(schema, recorder));
    sink.set_config(sink_config(json!({ "fields": ["id", "uid"] })));

    let result = sink.check_config().await;
    assert!(!result.is_success());
    assert_eq!(
        result.msg(),
        "clickHouse data type UUID not support in current version."
    );
}

#[tokio::test]
async fn test_check_config_accepts_blank_password() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut sink =
        ClickHouseSink::with_connector(MockConnector::new(users_schema(), recorder.clone()));
    sink.set_config(
        Config::from_json(json!({
            "host": "localhost:8123",
            "database": "default",
            "table": "users",
            "username": "default",
            "password": "",
        }))
        .unwrap(),
    );

    let result = sink.check_config().await;
    assert!(result.is_success(), "{}", result.msg());
    let recorder = recorder.lock();
    assert_eq!(recorder.connects.len(), 1);
    assert_eq!(recorder.connects[0].password, "");
}

#[tokio::test]
async fn test_check_config_is_repeatable() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let mut sink =
        ClickHouseSink::with_connector(MockConnector::new(users_schema(), recorder.clone()));
    sink.set_config(sink_config(json!({})));

    assert!(sink.check_config().await.is_success());
    assert!(sink.check_config().await.is_success());
    assert_eq!(recorder.lock().described.len(), 2);
}

#[tokio::test]
async fn test_output_writes_every_partition() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let connector = MockConnector::new(users_schema(), recorder.clone());
    let sink = checked_sink(json!({ "bulk_size": 2 }), connector).await;

    let env = Environment::default().with_parallelism(2);
    let summary = sink.output(dataset(&[3, 2, 0]), &env).await.unwrap();
    assert_eq!(summary.rows_written, 5);
    assert_eq!(summary.rows_dropped, 0);

    let recorder = recorder.lock();
    // one connection for the check, one per partition
    assert_eq!(recorder.connects.len(), 4);
    assert!(recorder
        .prepared
        .iter()
        .all(|sql| sql == "INSERT INTO users (`id`,`name`,`score`) VALUES (?,?,?)"));

    let mut rows: Vec<&Vec<Param>> = recorder.executed.iter().flatten().collect();
    rows.sort_by_key(|row| match &row[0] {
        Param::Long(id) => *id,
        other => panic!("unexpected id param {other:?}"),
    });
    assert_eq!(rows.len(), 5);
    assert_eq!(
        rows[0],
        &vec![
            Param::Long(1),
            Param::String("user1".to_string()),
            Param::Null(SqlType::Double),
        ]
    );
    assert!(recorder.executed.iter().all(|batch| batch.len() <= 2));
}

#[tokio::test]
async fn test_output_drops_batch_after_retries() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let busy = || Error::Server {
        code: 1002,
        msg: "DB::Exception: too many parts".to_string(),
    };
    let connector =
        MockConnector::new(users_schema(), recorder.clone()).fail_with(vec![busy(), busy()]);
    let sink = checked_sink(json!({ "retry": 1, "retry_codes": [1002] }), connector).await;

    let summary = sink
        .output(dataset(&[4]), &Environment::default())
        .await
        .unwrap();
    assert_eq!(summary.rows_written, 0);
    assert_eq!(summary.rows_dropped, 4);
    assert!(recorder.lock().executed.is_empty());
}

#[tokio::test]
async fn test_output_fails_on_non_retryable_code() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let connector = MockConnector::new(users_schema(), recorder).fail_with(vec![Error::Server {
        code: 60,
        msg: "DB::Exception: table does not exist".to_string(),
    }]);
    let sink = checked_sink(json!({ "retry_codes": [1002] }), connector).await;

    let err = sink
        .output(dataset(&[2]), &Environment::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some(60));
}

#[tokio::test]
async fn test_output_rejects_unknown_input_field() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    let schema = TableSchema::from_pairs("users", [("id", "UInt32")]);
    let sink = checked_sink(json!({}), MockConnector::new(schema, recorder)).await;

    let err = sink
        .output(dataset(&[1]), &Environment::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "field name,score not exist in table users");
}

#[tokio::test]
async fn test_output_joins_all_partitions_after_panic() {
    let recorder = Arc::new(Mutex::new(Recorder::default()));
    // ids 3 and 4 belong to the second partition
    let connector = MockConnector::new(users_schema(), recorder.clone()).panic_on(3);
    let sink = checked_sink(json!({}), connector).await;

    let env = Environment::default().with_parallelism(3);
    let err = sink.output(dataset(&[2, 2, 2]), &env).await.unwrap_err();
    assert!(matches!(err, Error::WorkerPanic { partition: 1, .. }));

    let mut written: Vec<Param> = recorder
        .lock()
        .executed
        .iter()
        .flatten()
        .map(|row| row[0].clone())
        .collect();
    written.sort_by_key(|id| match id {
        Param::Long(id) => *id,
        other => panic!("unexpected id param {other:?}"),
    });
    assert_eq!(
        written,
        vec![Param::Long(1), Param::Long(2), Param::Long(5), Param::Long(6)]
    );
}
