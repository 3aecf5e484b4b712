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

pub mod bind;
pub mod client;
pub mod config;
pub mod database;
mod error;
pub mod execution;
pub mod load_balance;
pub mod options;
pub mod plugin;
pub mod sink;
pub mod statement;
pub mod types;
pub mod value;
pub mod writer;

pub use self::config::{CheckResult, Config};
pub use self::error::{Error, Result};
pub use self::options::{ConnectionOptions, WriteOptions};
pub use self::plugin::{Environment, Plugin};
pub use self::sink::{ClickHouseSink, Dataset};
pub use self::types::{ColumnType, TableSchema};
pub use self::value::{Row, RowSchema, Value};
pub use self::writer::{InsertPlan, WriteSummary};
