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

//! Driver seam between the writer and a ClickHouse connection

use async_trait::async_trait;

use crate::bind::Param;
use crate::options::ConnectionOptions;
use crate::types::TableSchema;
use crate::Result;

/// A prepared insert accumulating bound rows into a batch
#[async_trait]
pub trait Statement: Send {
    /// Bind `param` to the zero-based placeholder `index` of the current row
    fn bind(&mut self, index: usize, param: Param) -> Result<()>;

    /// Move the current row into the batch
    fn add_batch(&mut self) -> Result<()>;

    /// Rows waiting in the batch
    fn batch_len(&self) -> usize;

    /// Send the batch. On failure the batch is kept so the call can be repeated.
    async fn execute_batch(&mut self) -> Result<usize>;

    /// Release the statement. A closed statement rejects further use.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// A live connection to one ClickHouse peer
#[async_trait]
pub trait Connection: Send + Sync {
    type Statement: Statement;

    /// Read the column names and types of `table` with `DESC`
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    fn prepare_statement(&self, sql: &str) -> Result<Self::Statement>;
}

/// Opens connections, one per caller
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection + 'static;

    async fn connect(&self, options: &ConnectionOptions) -> Result<Self::Connection>;
}
