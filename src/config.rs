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

//! Flat, insertion-ordered plugin configuration
//!
//! A [`Config`] holds dotted keys (`clickhouse.socket_timeout`) mapped to leaf
//! JSON values. Nested JSON objects are flattened on construction, so prefix
//! based extraction works the same regardless of how the job file nested them.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use snafu::{ensure, ResultExt};

use crate::{error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    entries: Map<String, JsonValue>,
}

impl Config {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a config from a JSON document, flattening nested objects into
    /// dotted keys.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        let JsonValue::Object(object) = value else {
            return error::InvalidConfigValueSnafu {
                key: "<root>",
                msg: "config root must be an object",
            }
            .fail();
        };

        let mut entries = Map::new();
        flatten_into(&mut entries, None, object);
        Ok(Self { entries })
    }

    /// Build a config from string pairs, keeping their order
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), JsonValue::String(v.into())))
            .collect();
        Self { entries }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn has_path(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.entries.iter()
    }

    /// Nested JSON object with the dotted keys expanded again.
    ///
    /// A leaf sharing its path with deeper keys gives way to them.
    pub fn to_nested(&self) -> JsonValue {
        let mut root = Map::new();
        for (key, value) in &self.entries {
            insert_nested(&mut root, key, value.clone());
        }
        JsonValue::Object(root)
    }

    /// Deserialize a typed view of this config
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_nested()).context(error::InvalidConfigSnafu)
    }

    /// Merge `fallback` under this config: keys missing here are taken from
    /// `fallback`, existing keys win.
    #[must_use]
    pub fn with_fallback(&self, fallback: &Config) -> Config {
        let mut entries = self.entries.clone();
        for (key, value) in &fallback.entries {
            if !entries.contains_key(key) {
                entries.insert(key.clone(), value.clone());
            }
        }
        Config { entries }
    }
}

fn flatten_into(entries: &mut Map<String, JsonValue>, prefix: Option<&str>, object: Map<String, JsonValue>) {
    for (key, value) in object {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };
        match value {
            JsonValue::Object(nested) => flatten_into(entries, Some(&key), nested),
            leaf => {
                entries.insert(key, leaf);
            }
        }
    }
}

fn insert_nested(node: &mut Map<String, JsonValue>, path: &str, value: JsonValue) {
    match path.split_once('.') {
        None => {
            if !node.get(path).is_some_and(JsonValue::is_object) {
                node.insert(path.to_string(), value);
            }
        }
        Some((head, rest)) => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !child.is_object() {
                *child = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(map) = child {
                insert_nested(map, rest, value);
            }
        }
    }
}

/// Outcome of a configuration check, reported to the job orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    success: bool,
    msg: String,
}

impl CheckResult {
    pub fn success() -> Self {
        Self {
            success: true,
            msg: String::new(),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: msg.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }
}

impl<T> From<Result<T>> for CheckResult {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => CheckResult::success(),
            Err(e) => CheckResult::error(e.to_string()),
        }
    }
}

/// Extract the entries whose key starts with `prefix`.
///
/// Values are stringified, entry order is preserved. With `keep_prefix` false
/// the prefix is stripped from the returned keys.
pub fn extract_sub_config(source: &Config, prefix: &str, keep_prefix: bool) -> Config {
    let mut entries = Map::new();
    for (key, value) in source.entries() {
        let Some(stripped) = key.strip_prefix(prefix) else {
            continue;
        };
        let key = if keep_prefix {
            key.clone()
        } else {
            stripped.to_string()
        };
        entries.insert(key, JsonValue::String(render_unwrapped(value)));
    }
    Config { entries }
}

/// Check if any key starts with `prefix`
pub fn has_sub_config(source: &Config, prefix: &str) -> bool {
    source.entries().any(|(key, _)| key.starts_with(prefix))
}

/// Like [`extract_sub_config`], failing with `EmptyConfig` when nothing matches
pub fn extract_sub_config_throwable(
    source: &Config,
    prefix: &str,
    keep_prefix: bool,
) -> Result<Config> {
    let config = extract_sub_config(source, prefix, keep_prefix);
    ensure!(!config.is_empty(), error::EmptyConfigSnafu);
    Ok(config)
}

/// Fail with `MissingConfig` listing every key that is absent or null.
/// Empty strings are values, e.g. a blank password.
pub fn check_all_exists(config: &Config, keys: &[&str]) -> Result<()> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|key| !config.has_path(key))
        .map(|key| key.to_string())
        .collect();

    ensure!(missing.is_empty(), error::MissingConfigSnafu { keys: missing });
    Ok(())
}

fn render_unwrapped(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
