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

//! ClickHouse column types and the live table schema

use std::collections::HashMap;
use std::fmt;

use snafu::ensure;

use crate::{error, Result};

/// A ClickHouse column type, parsed once from the `DESC` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Date,
    /// `DateTime`, `DateTime('tz')` and `DateTime64(p[, 'tz'])`
    DateTime,

    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,

    Float32,
    Float64,

    /// Any `Decimal` flavor, precision and scale are left to the server
    Decimal,

    Array(Box<ColumnType>),
    Nullable(Box<ColumnType>),
    LowCardinality(Box<ColumnType>),

    /// A type this writer does not know, kept verbatim
    Other(String),
}

impl ColumnType {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some(inner) = unwrap_modifier(raw, "Nullable") {
            return ColumnType::Nullable(Box::new(ColumnType::parse(inner)));
        }
        if let Some(inner) = unwrap_modifier(raw, "LowCardinality") {
            return ColumnType::LowCardinality(Box::new(ColumnType::parse(inner)));
        }
        if let Some(inner) = unwrap_modifier(raw, "Array") {
            return ColumnType::Array(Box::new(ColumnType::parse(inner)));
        }

        match raw {
            "String" => ColumnType::String,
            "Date" => ColumnType::Date,
            "Int8" => ColumnType::Int8,
            "Int16" => ColumnType::Int16,
            "Int32" => ColumnType::Int32,
            "Int64" => ColumnType::Int64,
            "UInt8" => ColumnType::UInt8,
            "UInt16" => ColumnType::UInt16,
            "UInt32" => ColumnType::UInt32,
            "UInt64" => ColumnType::UInt64,
            "Float32" => ColumnType::Float32,
            "Float64" => ColumnType::Float64,
            _ if raw == "DateTime"
                || raw.starts_with("DateTime(")
                || raw.starts_with("DateTime64") =>
            {
                ColumnType::DateTime
            }
            _ if is_decimal(raw) => ColumnType::Decimal,
            _ => ColumnType::Other(raw.to_string()),
        }
    }

    /// Whether rows can be bound for a column of this type
    pub fn is_supported(&self) -> bool {
        match self {
            ColumnType::Nullable(inner)
            | ColumnType::LowCardinality(inner)
            | ColumnType::Array(inner) => inner.is_supported(),
            ColumnType::Other(_) => false,
            _ => true,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => write!(f, "String"),
            ColumnType::Date => write!(f, "Date"),
            ColumnType::DateTime => write!(f, "DateTime"),
            ColumnType::Int8 => write!(f, "Int8"),
            ColumnType::Int16 => write!(f, "Int16"),
            ColumnType::Int32 => write!(f, "Int32"),
            ColumnType::Int64 => write!(f, "Int64"),
            ColumnType::UInt8 => write!(f, "UInt8"),
            ColumnType::UInt16 => write!(f, "UInt16"),
            ColumnType::UInt32 => write!(f, "UInt32"),
            ColumnType::UInt64 => write!(f, "UInt64"),
            ColumnType::Float32 => write!(f, "Float32"),
            ColumnType::Float64 => write!(f, "Float64"),
            ColumnType::Decimal => write!(f, "Decimal"),
            ColumnType::Array(inner) => write!(f, "Array({inner})"),
            ColumnType::Nullable(inner) => write!(f, "Nullable({inner})"),
            ColumnType::LowCardinality(inner) => write!(f, "LowCardinality({inner})"),
            ColumnType::Other(raw) => write!(f, "{raw}"),
        }
    }
}

fn unwrap_modifier<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    raw.strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}

fn is_decimal(raw: &str) -> bool {
    raw == "Decimal"
        || raw.starts_with("Decimal(")
        || ["Decimal32(", "Decimal64(", "Decimal128(", "Decimal256("]
            .iter()
            .any(|prefix| raw.starts_with(prefix))
}

/// Check a raw ClickHouse type name against the types this writer can bind
pub fn support_or_not(raw: &str) -> bool {
    ColumnType::parse(raw).is_supported()
}

/// Table column as reported by `DESC <table>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// The type name exactly as the server reported it
    pub raw_type: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, raw_type: impl Into<String>) -> Self {
        let raw_type = raw_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::parse(&raw_type),
            raw_type,
        }
    }
}

/// Live column name to type mapping of the target table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.name.clone(), i))
            .collect();
        Self {
            name: name.into(),
            columns,
            index,
        }
    }

    /// Build a schema from `(column name, raw type)` pairs
    pub fn from_pairs<N, T, I>(name: impl Into<String>, pairs: I) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        I: IntoIterator<Item = (N, T)>,
    {
        let columns = pairs
            .into_iter()
            .map(|(n, t)| Column::new(n, t))
            .collect();
        Self::new(name, columns)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|i| &self.columns[*i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Validate the configured output fields against this schema.
    ///
    /// Every field must exist, then every field's type must be supported.
    pub fn check_fields<S: AsRef<str>>(&self, fields: &[S]) -> Result<()> {
        let missing: Vec<String> = fields
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| !self.contains(f))
            .map(str::to_string)
            .collect();
        ensure!(
            missing.is_empty(),
            error::SchemaMismatchSnafu {
                fields: missing,
                table: &self.name,
            }
        );

        let unsupported: Vec<String> = fields
            .iter()
            .filter_map(|f| self.column(f.as_ref()))
            .filter(|col| !col.column_type.is_supported())
            .map(|col| col.raw_type.clone())
            .collect();
        ensure!(
            unsupported.is_empty(),
            error::UnsupportedTypeSnafu { types: unsupported }
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_types() {
        assert_eq!(ColumnType::parse("String"), ColumnType::String);
        assert_eq!(ColumnType::parse("Date"), ColumnType::Date);
        assert_eq!(ColumnType::parse("DateTime"), ColumnType::DateTime);
        assert_eq!(ColumnType::parse("DateTime('Asia/Shanghai')"), ColumnType::DateTime);
        assert_eq!(ColumnType::parse("DateTime64(3)"), ColumnType::DateTime);
        assert_eq!(ColumnType::parse("UInt32"), ColumnType::UInt32);
        assert_eq!(ColumnType::parse("Int64"), ColumnType::Int64);
        assert_eq!(ColumnType::parse("Float32"), ColumnType::Float32);
        assert_eq!(ColumnType::parse("Decimal(18, 4)"), ColumnType::Decimal);
        assert_eq!(ColumnType::parse("Decimal64(4)"), ColumnType::Decimal);
    }

    #[test]
    fn test_parse_wrapped_types() {
        assert_eq!(
            ColumnType::parse("Nullable(Float64)"),
            ColumnType::Nullable(Box::new(ColumnType::Float64))
        );
        assert_eq!(
            ColumnType::parse("LowCardinality(Nullable(String))"),
            ColumnType::LowCardinality(Box::new(ColumnType::Nullable(Box::new(
                ColumnType::String
            ))))
        );
        assert_eq!(
            ColumnType::parse("Array(Nullable(Int32))"),
            ColumnType::Array(Box::new(ColumnType::Nullable(Box::new(ColumnType::Int32))))
        );

        let ty = ColumnType::parse("LowCardinality(Nullable(String))");
        assert_eq!(ty.to_string(), "LowCardinality(Nullable(String))");
    }

    #[test]
    fn test_support_or_not() {
        for raw in [
            "String",
            "Date",
            "DateTime",
            "DateTime64(6, 'UTC')",
            "Int8",
            "Int16",
            "Int32",
            "Int64",
            "UInt8",
            "UInt16",
            "UInt32",
            "UInt64",
            "Float32",
            "Float64",
            "Decimal(9, 2)",
            "Array(String)",
            "Nullable(UInt8)",
            "LowCardinality(String)",
        ] {
            assert!(support_or_not(raw), "{raw} should be supported");
        }

        for raw in [
            "UUID",
            "IPv4",
            "FixedString(16)",
            "Map(String, String)",
            "Nullable(UUID)",
            "Array(IPv6)",
            "Int128",
            "Bool",
            "",
        ] {
            assert!(!support_or_not(raw), "{raw} should not be supported");
        }
    }

    #[test]
    fn test_check_fields() {
        let schema = TableSchema::from_pairs(
            "users",
            [
                ("id", "UInt32"),
                ("name", "String"),
                ("score", "Nullable(Float64)"),
                ("uid", "UUID"),
            ],
        );

        assert!(schema.check_fields(&["id", "name", "score"]).is_ok());

        let err = schema.check_fields(&["id", "missing_field"]).unwrap_err();
        match err {
            error::Error::SchemaMismatch { fields, table, .. } => {
                assert_eq!(fields, vec!["missing_field"]);
                assert_eq!(table, "users");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = schema.check_fields(&["id", "uid"]).unwrap_err();
        match err {
            error::Error::UnsupportedType { types, .. } => assert_eq!(types, vec!["UUID"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_fields_is_repeatable() {
        let schema = TableSchema::from_pairs("t", [("id", "UInt32")]);
        let first = schema.check_fields(&["id", "x"]).map_err(|e| e.to_string());
        let second = schema.check_fields(&["id", "x"]).map_err(|e| e.to_string());
        assert_eq!(first, second);
    }
}
