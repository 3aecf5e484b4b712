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

//! ClickHouse batch sink
//!
//! `check_config` validates the settings and reads the live table schema,
//! `prepare` derives batching and retry options, and `output` writes every
//! partition of a [`Dataset`] on its own task with its own connection.

use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use snafu::{OptionExt, ResultExt};
use tokio::sync::Semaphore;

use crate::config::{check_all_exists, CheckResult, Config};
use crate::database::HttpConnector;
use crate::options::{ConnectionOptions, TableOptions, WriteOptions, REQUIRED_KEYS};
use crate::plugin::{Environment, Plugin};
use crate::statement::{Connection, Connector};
use crate::types::TableSchema;
use crate::value::{Row, RowSchema};
use crate::writer::{write_partition, InsertPlan, WriteSummary};
use crate::{error, Result};

/// Partitioned input rows sharing one schema
pub struct Dataset<S> {
    schema: Arc<RowSchema>,
    partitions: Vec<S>,
}

impl<S> Dataset<S> {
    pub fn new(schema: Arc<RowSchema>, partitions: Vec<S>) -> Self {
        Self { schema, partitions }
    }

    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }
}

pub struct ClickHouseSink<C: Connector = HttpConnector> {
    connector: Arc<C>,
    config: Config,
    // Filled in by a successful `check_config`
    connection: Option<Arc<ConnectionOptions>>,
    table: String,
    table_schema: Option<Arc<TableSchema>>,
    fields: Option<Vec<String>>,
    write_options: WriteOptions,
}

impl ClickHouseSink<HttpConnector> {
    pub fn new() -> Self {
        Self::with_connector(HttpConnector)
    }
}

impl Default for ClickHouseSink<HttpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ClickHouseSink<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            config: Config::empty(),
            connection: None,
            table: String::new(),
            table_schema: None,
            fields: None,
            write_options: WriteOptions::default(),
        }
    }

    pub fn table_schema(&self) -> Option<&TableSchema> {
        self.table_schema.as_deref()
    }

    pub fn write_options(&self) -> &WriteOptions {
        &self.write_options
    }

    /// Configuration check with the failure kept as an [`Error`](crate::Error)
    pub async fn try_check_config(&mut self) -> Result<()> {
        check_all_exists(&self.config, &REQUIRED_KEYS)?;

        let options = ConnectionOptions::from_config(&self.config)?;
        let TableOptions { table, fields } = TableOptions::from_config(&self.config)?;

        let conn = self.connector.connect(&options).await?;
        let schema = conn.describe_table(&table).await?;
        tracing::info!(
            table = %table,
            columns = schema.len(),
            "fetched ClickHouse table schema"
        );

        if let Some(fields) = &fields {
            schema.check_fields(fields)?;
        }

        self.connection = Some(Arc::new(options));
        self.table = table;
        self.table_schema = Some(Arc::new(schema));
        self.fields = fields;
        Ok(())
    }

    /// Write every partition of `dataset`.
    ///
    /// Each partition runs on its own task with its own connection, at most
    /// `env.parallelism` at a time. All partitions run to completion; the
    /// first failure is returned.
    pub async fn output<S>(&self, dataset: Dataset<S>, env: &Environment) -> Result<WriteSummary>
    where
        S: Stream<Item = Row> + Unpin + Send + 'static,
    {
        let (Some(schema), Some(connection)) = (&self.table_schema, &self.connection) else {
            return error::IllegalClientStateSnafu {
                err_msg: "check_config must succeed before output",
            }
            .fail();
        };

        let fields = self
            .fields
            .clone()
            .unwrap_or_else(|| dataset.schema.field_names().to_vec());
        let plan = Arc::new(InsertPlan::new(
            &self.table,
            schema,
            &fields,
            self.write_options.clone(),
        )?);

        let semaphore = Arc::new(Semaphore::new(env.parallelism.max(1)));
        let handles: Vec<_> = dataset
            .partitions
            .into_iter()
            .map(|rows| {
                let connector = self.connector.clone();
                let connection = connection.clone();
                let plan = plan.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok().context(
                        error::IllegalClientStateSnafu {
                            err_msg: "partition scheduler closed",
                        },
                    )?;
                    let conn = connector.connect(&connection).await?;
                    write_partition(&conn, &plan, rows).await
                })
            })
            .collect();

        let mut summary = WriteSummary::default();
        let mut first_error = None;
        for (partition, handle) in handles.into_iter().enumerate() {
            match handle
                .await
                .context(error::WorkerPanicSnafu { partition })
                .and_then(|written| written)
            {
                Ok(written) => summary += written,
                Err(e) => {
                    tracing::error!(partition, error = %e, "partition write failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        tracing::info!(
            table = %plan.table(),
            batches = summary.batches,
            rows_written = summary.rows_written,
            rows_dropped = summary.rows_dropped,
            "ClickHouse output finished"
        );
        Ok(summary)
    }
}

#[async_trait]
impl<C: Connector> Plugin for ClickHouseSink<C> {
    fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn check_config(&mut self) -> CheckResult {
        let result = self.try_check_config().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "ClickHouse sink config check failed");
        }
        result.into()
    }

    fn prepare(&mut self, _env: &Environment) -> Result<()> {
        self.config = self.config.with_fallback(&WriteOptions::default_config());
        self.write_options = WriteOptions::from_config(&self.config)?;
        Ok(())
    }
}
