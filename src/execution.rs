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

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{CheckResult, Config};
use crate::plugin::{Environment, Plugin};
use crate::Result;

/// Drives sources through transforms into sinks
#[async_trait]
pub trait Execution: Plugin {
    type Source: Send + 'static;
    type Transform: Send + 'static;
    type Sink: Send + 'static;

    async fn start(
        &mut self,
        sources: Vec<Self::Source>,
        transforms: Vec<Self::Transform>,
        sinks: Vec<Self::Sink>,
    ) -> Result<()>;
}

/// Structured streaming execution. Not implemented yet: `start` returns
/// without touching its plugins.
pub struct StreamingExecution {
    environment: Arc<Environment>,
    config: Config,
}

impl StreamingExecution {
    pub fn new(environment: Arc<Environment>) -> Self {
        Self {
            environment,
            config: Config::empty(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

#[async_trait]
impl Plugin for StreamingExecution {
    fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    fn config(&self) -> &Config {
        &self.config
    }

    async fn check_config(&mut self) -> CheckResult {
        CheckResult::success()
    }

    fn prepare(&mut self, _env: &Environment) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Execution for StreamingExecution {
    type Source = Box<dyn Plugin>;
    type Transform = Box<dyn Plugin>;
    type Sink = Box<dyn Plugin>;

    async fn start(
        &mut self,
        sources: Vec<Self::Source>,
        transforms: Vec<Self::Transform>,
        sinks: Vec<Self::Sink>,
    ) -> Result<()> {
        tracing::debug!(
            sources = sources.len(),
            transforms = transforms.len(),
            sinks = sinks.len(),
            "structured streaming execution is not implemented, nothing started"
        );
        Ok(())
    }
}
