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

use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("please specify [{}] as non-empty", keys.join(",")))]
    MissingConfig {
        keys: Vec<String>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("config is empty"))]
    EmptyConfig {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid config value for [{}], {}", key, msg))]
    InvalidConfigValue {
        key: String,
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid config, {}", error))]
    InvalidConfig {
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("field {} not exist in table {}", fields.join(","), table))]
    SchemaMismatch {
        fields: Vec<String>,
        table: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "clickHouse data type {} not support in current version.",
        types.join(",")
    ))]
    UnsupportedType {
        types: Vec<String>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Cannot bind value {} of field {} as {}",
        value,
        field,
        column_type
    ))]
    ValueTypeMismatch {
        field: String,
        column_type: String,
        value: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Parameter {} is not bound, statement expects {}", index, total))]
    MissingParameter {
        index: usize,
        total: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid parameter index: {}, total parameters: {}", index, total))]
    InvalidParameterIndex {
        index: usize,
        total: usize,
        #[snafu(implicit)]
        location: Location,
    },

    // Server error reported with a ClickHouse error code.
    #[snafu(display("Code: {}. {}", code, msg))]
    Server { code: i32, msg: String },

    // Server failure without a recognizable error code.
    #[snafu(display("Unknown ClickHouse error, status {}: {}", status, msg))]
    UnknownServer { status: u16, msg: String },

    #[snafu(display("Failed to send request to ClickHouse"))]
    Http {
        #[snafu(source)]
        error: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Illegal ClickHouse client state: {}", err_msg))]
    IllegalClientState {
        err_msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Illegal ClickHouse response: {}", err_msg))]
    IllegalResponse {
        err_msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to decode ClickHouse response"))]
    DecodeResponse {
        #[snafu(source)]
        error: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Partition writer {} panicked or was cancelled", partition))]
    WorkerPanic {
        partition: usize,
        #[snafu(source)]
        error: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The ClickHouse error code carried by a server error, if any
    pub fn error_code(&self) -> Option<i32> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}
