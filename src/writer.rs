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

//! Partition writer: typed binding, batching and bounded retry
//!
//! An [`InsertPlan`] is built once per job and shared read-only by every
//! partition worker. Each worker owns its connection and statement, binds
//! rows in output field order and executes a batch every `bulk_size` rows.

use std::ops::AddAssign;

use futures::Stream;
use snafu::ensure;
use tokio_stream::StreamExt;

use crate::bind::bind_row;
use crate::options::WriteOptions;
use crate::statement::{Connection, Statement};
use crate::types::{ColumnType, TableSchema};
use crate::value::Row;
use crate::{error, Error, Result};

/// Everything a partition worker needs, fixed before the first write
#[derive(Debug, Clone)]
pub struct InsertPlan {
    table: String,
    // Output field paired with its column type in the target table
    fields: Vec<(String, ColumnType)>,
    sql: String,
    options: WriteOptions,
}

impl InsertPlan {
    /// Resolve `fields` against the table schema and build the insert template.
    ///
    /// Fails with `SchemaMismatch` when a field is not a column of the table.
    pub fn new(
        table: impl Into<String>,
        schema: &TableSchema,
        fields: &[String],
        options: WriteOptions,
    ) -> Result<Self> {
        let table = table.into();

        let missing: Vec<String> = fields
            .iter()
            .filter(|f| !schema.contains(f))
            .cloned()
            .collect();
        ensure!(
            missing.is_empty(),
            error::SchemaMismatchSnafu {
                fields: missing,
                table: &table,
            }
        );

        let fields: Vec<(String, ColumnType)> = fields
            .iter()
            .filter_map(|f| schema.column(f))
            .map(|col| (col.name.clone(), col.column_type.clone()))
            .collect();
        let sql = insert_sql(&table, fields.iter().map(|(name, _)| name.as_str()));

        Ok(Self {
            table,
            fields,
            sql,
            options,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn fields(&self) -> &[(String, ColumnType)] {
        &self.fields
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }
}

/// ``INSERT INTO <table> (`a`,`b`) VALUES (?,?)``
pub fn insert_sql<'a>(table: &str, fields: impl Iterator<Item = &'a str>) -> String {
    let (names, placeholders): (Vec<String>, Vec<&str>) =
        fields.map(|f| (format!("`{f}`"), "?")).unzip();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        names.join(","),
        placeholders.join(",")
    )
}

/// What happened to one executed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Written(usize),
    /// Retries were exhausted on a retryable error code
    Dropped(usize),
}

/// Per-partition write totals, summed across partitions by the sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub batches: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
}

impl WriteSummary {
    fn record(&mut self, outcome: BatchOutcome) {
        self.batches += 1;
        match outcome {
            BatchOutcome::Written(rows) => self.rows_written += rows,
            BatchOutcome::Dropped(rows) => self.rows_dropped += rows,
        }
    }
}

impl AddAssign for WriteSummary {
    fn add_assign(&mut self, other: Self) {
        self.batches += other.batches;
        self.rows_written += other.rows_written;
        self.rows_dropped += other.rows_dropped;
    }
}

/// Write one partition through `conn`.
///
/// A fresh statement is prepared for every batch since a successful execute
/// closes it. The trailing batch is executed even when empty.
pub async fn write_partition<C, S>(conn: &C, plan: &InsertPlan, rows: S) -> Result<WriteSummary>
where
    C: Connection,
    S: Stream<Item = Row> + Unpin,
{
    let mut rows = rows;
    let mut summary = WriteSummary::default();
    let mut statement = conn.prepare_statement(plan.sql())?;
    let mut length = 0;

    while let Some(row) = rows.next().await {
        let params = bind_row(plan.fields(), &row)?;
        for (index, param) in params.into_iter().enumerate() {
            statement.bind(index, param)?;
        }
        statement.add_batch()?;
        length += 1;

        if length >= plan.options().bulk_size {
            summary.record(execute_with_retry(&mut statement, plan.options()).await?);
            statement = conn.prepare_statement(plan.sql())?;
            length = 0;
        }
    }
    summary.record(execute_with_retry(&mut statement, plan.options()).await?);

    tracing::info!(
        table = %plan.table(),
        batches = summary.batches,
        rows_written = summary.rows_written,
        rows_dropped = summary.rows_dropped,
        "partition written"
    );
    Ok(summary)
}

/// Execute the statement's batch, retrying on configured error codes.
///
/// - success closes the statement
/// - a retryable code is retried up to `options.retry` more times, then the
///   statement is closed and the batch dropped without an error
/// - any other server code is returned as is
/// - `UnknownServer` closes the statement before being returned
/// - other errors are returned without closing
pub async fn execute_with_retry<S: Statement>(
    statement: &mut S,
    options: &WriteOptions,
) -> Result<BatchOutcome> {
    let rows = statement.batch_len();
    let mut remaining = options.retry;

    loop {
        match statement.execute_batch().await {
            Ok(_) => {
                statement.close();
                tracing::debug!(rows, "batch executed");
                return Ok(BatchOutcome::Written(rows));
            }
            Err(e @ Error::Server { .. }) => {
                let code = e.error_code().unwrap_or_default();
                if !options.is_retryable(code) {
                    return Err(e);
                }
                tracing::error!(code, remaining, error = %e, "Insert into ClickHouse failed");
                if remaining > 0 {
                    remaining -= 1;
                    continue;
                }
                tracing::warn!(
                    code,
                    rows,
                    "Insert into ClickHouse failed and retry failed, drop this bulk"
                );
                statement.close();
                return Ok(BatchOutcome::Dropped(rows));
            }
            Err(e @ Error::UnknownServer { .. }) => {
                statement.close();
                return Err(e);
            }
            Err(e) => return Err(e),
        }
    }
}
