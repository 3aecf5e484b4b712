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

// Loads two partitions of rows into a local ClickHouse table:
//
//   CREATE TABLE default.events (
//       id UInt64, kind LowCardinality(String), amount Nullable(Decimal(10, 2)),
//       tags Array(String), created DateTime
//   ) ENGINE = MergeTree ORDER BY id

use std::sync::Arc;

use chrono::NaiveDate;
use clickhouse_ingester::{
    ClickHouseSink, Config, Dataset, Environment, Plugin, Result, Row, RowSchema, Value,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let host = std::env::var("CLICKHOUSE_HOST").unwrap_or_else(|_| "localhost:8123".to_string());
    let config = Config::from_json(json!({
        "host": host,
        "database": "default",
        "table": "events",
        "username": "default",
        "password": std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default(),
        "bulk_size": 2,
        "retry": 2,
        "retry_codes": [209, 210, 1002],
        "clickhouse": { "socket_timeout": "30000" },
    }))?;

    let mut sink = ClickHouseSink::new();
    sink.set_config(config);
    let checked = sink.check_config().await;
    if !checked.is_success() {
        eprintln!("config check failed: {}", checked.msg());
        return Ok(());
    }

    let env = Environment::default().with_parallelism(2);
    sink.prepare(&env)?;

    let schema = Arc::new(RowSchema::new(["id", "kind", "amount", "tags", "created"]));
    let created = NaiveDate::from_ymd_opt(2024, 5, 17)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .unwrap_or_default();
    let event = |id: u64, kind: &str, amount: Option<Decimal>| {
        Row::new(
            schema.clone(),
            vec![
                Value::UInt64(id),
                Value::from(kind),
                amount.map(Value::Decimal).unwrap_or(Value::Null),
                Value::Array(vec![Value::from("demo")]),
                Value::DateTime(created),
            ],
        )
    };

    let partitions = vec![
        tokio_stream::iter(vec![
            event(1, "click", None),
            event(2, "order", Some(Decimal::new(1999, 2))),
            event(3, "click", None),
        ]),
        tokio_stream::iter(vec![event(4, "refund", Some(Decimal::new(-500, 2)))]),
    ];

    let summary = sink.output(Dataset::new(schema, partitions), &env).await?;
    println!(
        "wrote {} rows in {} batches, dropped {}",
        summary.rows_written, summary.batches, summary.rows_dropped
    );
    Ok(())
}
