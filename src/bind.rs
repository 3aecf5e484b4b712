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

//! Statement parameters and the rules turning row values into them
//!
//! A missing field or a NULL value is bound as the column type's default
//! (see [`default_param`]). Only `Nullable` columns receive a real SQL NULL,
//! typed after the wrapped column type by [`null_sql_type`]. Present values
//! are converted by [`value_param`].

use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use snafu::OptionExt;

use crate::types::ColumnType;
use crate::value::{Row, Value, DATETIME_FORMAT, DATE_FORMAT};
use crate::{error, Result};

/// SQL type attached to a bound NULL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Varchar,
    Date,
    Time,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Array,
}

/// A value bound to one statement placeholder
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null(SqlType),
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Array(Vec<Value>),
}

/// SQL type of the NULL bound for `Nullable(inner)`.
///
/// `DateTime` maps to DATE and `Date` to TIME, matching what existing jobs
/// were loaded with.
pub fn null_sql_type(inner: &ColumnType) -> SqlType {
    match inner {
        ColumnType::String => SqlType::Varchar,
        ColumnType::DateTime => SqlType::Date,
        ColumnType::Date => SqlType::Time,
        ColumnType::Int8
        | ColumnType::UInt8
        | ColumnType::Int16
        | ColumnType::Int32
        | ColumnType::UInt16 => SqlType::Integer,
        ColumnType::UInt32 | ColumnType::Int64 | ColumnType::UInt64 => SqlType::BigInt,
        ColumnType::Float32 => SqlType::Float,
        ColumnType::Float64 => SqlType::Double,
        ColumnType::Decimal => SqlType::Decimal,
        ColumnType::Array(_) => SqlType::Array,
        ColumnType::Nullable(inner) | ColumnType::LowCardinality(inner) => null_sql_type(inner),
        ColumnType::Other(_) => SqlType::Varchar,
    }
}

/// Default text for String, Date and DateTime columns at `now`
pub fn string_default_at(column_type: &ColumnType, now: NaiveDateTime) -> String {
    match column_type {
        ColumnType::DateTime => now.format(DATETIME_FORMAT).to_string(),
        ColumnType::Date => now.format(DATE_FORMAT).to_string(),
        _ => String::new(),
    }
}

/// Default text for String, Date and DateTime columns, using local time
pub fn string_default(column_type: &ColumnType) -> String {
    string_default_at(column_type, Local::now().naive_local())
}

/// Parameter bound when a field is missing from the row or its value is NULL
pub fn default_param_at(column_type: &ColumnType, now: NaiveDateTime) -> Param {
    match column_type {
        ColumnType::String | ColumnType::Date | ColumnType::DateTime => {
            Param::String(string_default_at(column_type, now))
        }
        ColumnType::Int8
        | ColumnType::UInt8
        | ColumnType::Int16
        | ColumnType::Int32
        | ColumnType::UInt32
        | ColumnType::UInt16 => Param::Int(0),
        ColumnType::Int64 | ColumnType::UInt64 => Param::Long(0),
        ColumnType::Float32 => Param::Float(0.0),
        ColumnType::Float64 => Param::Double(0.0),
        ColumnType::LowCardinality(inner) => default_param_at(inner, now),
        ColumnType::Array(_) => Param::Null(SqlType::Array),
        ColumnType::Nullable(inner) => Param::Null(null_sql_type(inner)),
        ColumnType::Decimal | ColumnType::Other(_) => Param::String(String::new()),
    }
}

pub fn default_param(column_type: &ColumnType) -> Param {
    default_param_at(column_type, Local::now().naive_local())
}

/// Convert a present, non-null value for a column of `column_type`
pub fn value_param(field: &str, column_type: &ColumnType, value: &Value) -> Result<Param> {
    let mismatch = || error::ValueTypeMismatchSnafu {
        field,
        column_type: column_type.to_string(),
        value: value.to_string(),
    };

    let param = match column_type {
        ColumnType::Nullable(inner) | ColumnType::LowCardinality(inner) => {
            return value_param(field, inner, value);
        }
        ColumnType::String | ColumnType::Date | ColumnType::DateTime => {
            Param::String(value.to_text().with_context(mismatch)?)
        }
        ColumnType::Array(_) => Param::Array(value.as_array().with_context(mismatch)?.to_vec()),
        ColumnType::Int8
        | ColumnType::UInt8
        | ColumnType::Int16
        | ColumnType::UInt16
        | ColumnType::Int32 => Param::Int(value.to_i32().with_context(mismatch)?),
        ColumnType::UInt32 | ColumnType::UInt64 | ColumnType::Int64 => {
            Param::Long(value.to_i64().with_context(mismatch)?)
        }
        ColumnType::Float32 => Param::Float(value.to_f32().with_context(mismatch)?),
        ColumnType::Float64 => Param::Double(value.to_f64().with_context(mismatch)?),
        ColumnType::Decimal => Param::Decimal(value.to_decimal().with_context(mismatch)?),
        ColumnType::Other(_) => Param::String(value.to_text().unwrap_or_else(|| value.to_string())),
    };
    Ok(param)
}

/// Bind parameters for one row, in output field order.
///
/// `fields` pairs each output field with its column type in the target table.
pub fn bind_row_at(
    fields: &[(String, ColumnType)],
    row: &Row,
    now: NaiveDateTime,
) -> Result<Vec<Param>> {
    fields
        .iter()
        .map(|(field, column_type)| match row.field_index(field) {
            Some(index) if !row.is_null_at(index) => match row.get(index) {
                Some(value) => value_param(field, column_type, value),
                None => Ok(default_param_at(column_type, now)),
            },
            _ => Ok(default_param_at(column_type, now)),
        })
        .collect()
}

pub fn bind_row(fields: &[(String, ColumnType)], row: &Row) -> Result<Vec<Param>> {
    bind_row_at(fields, row, Local::now().naive_local())
}
