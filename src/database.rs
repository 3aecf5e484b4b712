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

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Number, Value as JsonValue};
use snafu::{ensure, OptionExt, ResultExt};

use crate::bind::Param;
use crate::client::{Auth, Client, SOCKET_TIMEOUT, SSL};
use crate::options::ConnectionOptions;
use crate::statement::{Connection, Connector, Statement};
use crate::types::{Column, TableSchema};
use crate::value::{Value, DATETIME_FORMAT, DATE_FORMAT};
use crate::{error, Result};

/// A connection to one ClickHouse peer, scoped to a database.
#[derive(Clone, Debug)]
pub struct Database {
    dbname: String,
    peer: String,
    client: Client,
    auth: Option<Auth>,
    // Server settings sent as query parameters with every request
    settings: Vec<(String, String)>,
}

impl Database {
    /// Create a handle on `dbname`, bound to one peer picked by the client's
    /// load balancer.
    pub fn new_with_dbname(dbname: impl Into<String>, client: Client) -> Result<Self> {
        let peer = client.find_peer()?;
        Ok(Self {
            dbname: dbname.into(),
            peer,
            client,
            auth: None,
            settings: Vec::new(),
        })
    }

    /// Get associated dbname of this client
    pub fn dbname(&self) -> &String {
        &self.dbname
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Set authentication information
    pub fn set_auth(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.auth = Some(Auth {
            username: username.into(),
            password: password.into(),
        });
    }

    pub fn set_settings(&mut self, settings: Vec<(String, String)>) {
        self.settings = settings;
    }

    /// Run one SQL statement and return the raw response body
    pub async fn query(&self, sql: impl Into<String>) -> Result<String> {
        self.client
            .execute(
                &self.peer,
                &self.dbname,
                self.auth.as_ref(),
                &self.settings,
                sql.into(),
            )
            .await
    }
}

#[async_trait]
impl Connection for Database {
    type Statement = InsertStatement;

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let body = self.query(format!("DESC {table} FORMAT JSONEachRow")).await?;
        let columns = parse_describe(&body)?;
        ensure!(
            !columns.is_empty(),
            error::IllegalResponseSnafu {
                err_msg: format!("DESC {table} returned no columns"),
            }
        );
        Ok(TableSchema::new(table, columns))
    }

    fn prepare_statement(&self, sql: &str) -> Result<InsertStatement> {
        InsertStatement::new(self.clone(), sql)
    }
}

/// One row of `DESC ... FORMAT JSONEachRow`, other attributes are ignored
#[derive(Debug, Deserialize)]
struct DescribeRow {
    name: String,
    #[serde(rename = "type")]
    raw_type: String,
}

fn parse_describe(body: &str) -> Result<Vec<Column>> {
    serde_json::Deserializer::from_str(body)
        .into_iter::<DescribeRow>()
        .map(|row| {
            row.map(|row| Column::new(row.name, row.raw_type))
                .context(error::DecodeResponseSnafu)
        })
        .collect()
}

/// Insert statement that sends its batch as one `INSERT ... FORMAT JSONEachRow`
/// request, one JSON object per row keyed by column name.
///
/// The template lists the columns and its `?` placeholders after `VALUES`
/// define the row width.
#[derive(Debug)]
pub struct InsertStatement {
    database: Database,
    // `INSERT INTO t (..)` without the VALUES clause
    head: String,
    columns: Vec<String>,
    current: Vec<Option<Param>>,
    batch: Vec<Vec<Param>>,
    closed: bool,
}

impl InsertStatement {
    fn new(database: Database, sql: &str) -> Result<Self> {
        let not_insert = || error::IllegalClientStateSnafu {
            err_msg: format!("not an insert statement: {sql}"),
        };
        let values_at = sql
            .to_ascii_uppercase()
            .rfind("VALUES")
            .with_context(not_insert)?;
        let head = sql[..values_at].trim_end().to_string();
        let columns = insert_columns(&head).with_context(not_insert)?;
        let placeholders = sql[values_at..].matches('?').count();
        ensure!(
            columns.len() == placeholders,
            error::IllegalClientStateSnafu {
                err_msg: format!(
                    "{} columns but {} placeholders in: {sql}",
                    columns.len(),
                    placeholders
                ),
            }
        );

        Ok(Self {
            database,
            head,
            columns,
            current: vec![None; placeholders],
            batch: Vec::new(),
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(
            !self.closed,
            error::IllegalClientStateSnafu {
                err_msg: "statement is closed",
            }
        );
        Ok(())
    }

    fn encode_batch(&self) -> String {
        let mut body = format!("{} FORMAT JSONEachRow\n", self.head);
        for row in &self.batch {
            let object: Map<String, JsonValue> = self
                .columns
                .iter()
                .cloned()
                .zip(row.iter().map(param_json))
                .collect();
            body.push_str(&JsonValue::Object(object).to_string());
            body.push('\n');
        }
        body
    }
}

/// Column names of `INSERT INTO t (`a`,`b`)`
fn insert_columns(head: &str) -> Option<Vec<String>> {
    let list = head.strip_suffix(')')?;
    let open = list.find('(')?;
    Some(
        list[open + 1..]
            .split(',')
            .map(|column| column.trim().trim_matches('`').to_string())
            .collect(),
    )
}

#[async_trait]
impl Statement for InsertStatement {
    fn bind(&mut self, index: usize, param: Param) -> Result<()> {
        self.ensure_open()?;
        let total = self.current.len();
        let slot = self
            .current
            .get_mut(index)
            .context(error::InvalidParameterIndexSnafu { index, total })?;
        *slot = Some(param);
        Ok(())
    }

    fn add_batch(&mut self) -> Result<()> {
        self.ensure_open()?;
        let total = self.current.len();
        let mut row = Vec::with_capacity(total);
        for (index, slot) in self.current.iter_mut().enumerate() {
            let param = slot
                .take()
                .context(error::MissingParameterSnafu { index, total })?;
            row.push(param);
        }
        self.batch.push(row);
        Ok(())
    }

    fn batch_len(&self) -> usize {
        self.batch.len()
    }

    async fn execute_batch(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if self.batch.is_empty() {
            return Ok(0);
        }

        let body = self.encode_batch();
        self.database.query(body).await?;

        let rows = self.batch.len();
        self.batch.clear();
        Ok(rows)
    }

    fn close(&mut self) {
        self.closed = true;
        self.batch.clear();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

fn param_json(param: &Param) -> JsonValue {
    match param {
        Param::Null(_) => JsonValue::Null,
        Param::String(s) => JsonValue::String(s.clone()),
        Param::Int(v) => JsonValue::from(*v),
        Param::Long(v) => JsonValue::from(*v),
        Param::Float(v) => float_json(f64::from(*v)),
        Param::Double(v) => float_json(*v),
        // quoted to keep every digit
        Param::Decimal(v) => JsonValue::String(v.to_string()),
        Param::Array(items) => JsonValue::Array(items.iter().map(value_json).collect()),
    }
}

fn value_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(v) => JsonValue::Bool(*v),
        Value::Int8(v) => JsonValue::from(*v),
        Value::Int16(v) => JsonValue::from(*v),
        Value::Int32(v) => JsonValue::from(*v),
        Value::Int64(v) => JsonValue::from(*v),
        Value::UInt8(v) => JsonValue::from(*v),
        Value::UInt16(v) => JsonValue::from(*v),
        Value::UInt32(v) => JsonValue::from(*v),
        Value::UInt64(v) => JsonValue::from(*v),
        Value::Float32(v) => float_json(f64::from(*v)),
        Value::Float64(v) => float_json(*v),
        Value::Decimal(v) => JsonValue::String(v.to_string()),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Date(d) => JsonValue::String(d.format(DATE_FORMAT).to_string()),
        Value::DateTime(dt) => JsonValue::String(dt.format(DATETIME_FORMAT).to_string()),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_json).collect()),
    }
}

/// JSON has no NaN or infinity, ClickHouse reads them from strings
fn float_json(v: f64) -> JsonValue {
    match Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None if v.is_nan() => JsonValue::String("nan".to_string()),
        None if v > 0.0 => JsonValue::String("inf".to_string()),
        None => JsonValue::String("-inf".to_string()),
    }
}

/// Opens [`Database`] connections over the ClickHouse HTTP interface
#[derive(Debug, Default, Clone)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    type Connection = Database;

    async fn connect(&self, options: &ConnectionOptions) -> Result<Database> {
        let client = Client::with_options(options)?;
        let mut database = Database::new_with_dbname(&options.database, client)?;
        database.set_auth(&options.username, &options.password);
        database.set_settings(
            options
                .properties
                .iter()
                .filter(|(k, _)| k != SOCKET_TIMEOUT && k != SSL)
                .cloned()
                .collect(),
        );
        Ok(database)
    }
}
