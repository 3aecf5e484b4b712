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

//! Lifecycle shared by sinks and executions

use async_trait::async_trait;

use crate::config::{CheckResult, Config};
use crate::Result;

/// Runtime settings handed to plugins by the job orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Partition writers allowed to run at the same time
    pub parallelism: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl Environment {
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }
}

/// Called in order: `set_config`, `check_config`, `prepare`, then the
/// plugin's own entry point.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn set_config(&mut self, config: Config);

    fn config(&self) -> &Config;

    /// Validate the configuration, may reach the target system
    async fn check_config(&mut self) -> CheckResult;

    fn prepare(&mut self, env: &Environment) -> Result<()>;
}
