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

//! Typed options deserialized from the sink configuration

use std::collections::HashSet;

use derive_builder::Builder;
use serde::Deserialize;
use serde_json::json;
use serde_with::formats::CommaSeparator;
use serde_with::{serde_as, DisplayFromStr, PickFirst, StringWithSeparator};
use snafu::ensure;

use crate::config::{extract_sub_config, Config};
use crate::{error, Result};

pub const HOST: &str = "host";
pub const DATABASE: &str = "database";
pub const USERNAME: &str = "username";
pub const PASSWORD: &str = "password";
pub const TABLE: &str = "table";
pub const BULK_SIZE: &str = "bulk_size";
pub const RETRY: &str = "retry";
pub const RETRY_CODES: &str = "retry_codes";

/// Prefix of properties forwarded to the ClickHouse connection
pub const CLICKHOUSE_PREFIX: &str = "clickhouse.";

pub const REQUIRED_KEYS: [&str; 5] = [HOST, TABLE, DATABASE, USERNAME, PASSWORD];

pub const DEFAULT_BULK_SIZE: usize = 20000;
pub const DEFAULT_RETRY: u32 = 1;

fn default_bulk_size() -> usize {
    DEFAULT_BULK_SIZE
}

fn default_retry() -> u32 {
    DEFAULT_RETRY
}

/// How a partition worker reaches ClickHouse
#[serde_as]
#[derive(Debug, Clone, Builder, Deserialize)]
#[builder(setter(into))]
pub struct ConnectionOptions {
    /// `host:port` peers, one is picked per connection
    #[serde(rename = "host")]
    #[serde_as(as = "StringWithSeparator::<CommaSeparator, String>")]
    pub hosts: Vec<String>,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Passthrough properties with the `clickhouse.` prefix stripped
    #[serde(skip)]
    #[builder(default)]
    pub properties: Vec<(String, String)>,
}

impl ConnectionOptions {
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::default()
    }

    /// Read connection settings from a config that already passed the
    /// required-key check.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut options: Self = config.deserialize_into()?;
        options.hosts = options
            .hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        ensure!(
            !options.hosts.is_empty(),
            error::InvalidConfigValueSnafu {
                key: HOST,
                msg: "no host given",
            }
        );

        options.properties = extract_sub_config(config, CLICKHOUSE_PREFIX, false)
            .entries()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
            .collect();
        Ok(options)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Target table and the optional explicit output fields
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableOptions {
    pub table: String,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

impl TableOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.deserialize_into()
    }
}

/// Batching and retry behavior of the partition writers.
///
/// Numbers are accepted as JSON numbers or numeric strings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Builder, Deserialize)]
#[builder(setter(into))]
pub struct WriteOptions {
    /// Rows buffered before a batch is executed
    #[builder(default = "DEFAULT_BULK_SIZE")]
    #[serde(default = "default_bulk_size")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub bulk_size: usize,
    /// Extra attempts for a batch failing with a retryable code
    #[builder(default = "DEFAULT_RETRY")]
    #[serde(default = "default_retry")]
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub retry: u32,
    /// Error codes eligible for retry
    #[builder(default)]
    #[serde(default)]
    #[serde_as(as = "HashSet<PickFirst<(_, DisplayFromStr)>>")]
    pub retry_codes: HashSet<i32>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            bulk_size: DEFAULT_BULK_SIZE,
            retry: DEFAULT_RETRY,
            retry_codes: HashSet::new(),
        }
    }
}

impl WriteOptions {
    pub fn builder() -> WriteOptionsBuilder {
        WriteOptionsBuilder::default()
    }

    /// Defaults merged under the user config before options are derived
    pub fn default_config() -> Config {
        let mut config = Config::empty();
        config.set(BULK_SIZE, json!(DEFAULT_BULK_SIZE));
        config.set(RETRY_CODES, json!([]));
        config.set(RETRY, json!(DEFAULT_RETRY));
        config
    }

    /// Derive options from a config merged with [`WriteOptions::default_config`]
    pub fn from_config(config: &Config) -> Result<Self> {
        let options: Self = config.deserialize_into()?;
        ensure!(
            options.bulk_size > 0,
            error::InvalidConfigValueSnafu {
                key: BULK_SIZE,
                msg: "expected a positive integer, got 0",
            }
        );
        Ok(options)
    }

    pub fn is_retryable(&self, code: i32) -> bool {
        self.retry_codes.contains(&code)
    }
}
