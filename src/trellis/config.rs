// SPDX-License-Identifier: MIT

//! Runtime configuration loading
//!
//! All knobs have serde defaults, so a config file only needs to name the
//! fields it changes. Provider credentials stay in the environment
//! (dotenv-loaded by the binary), never in the config file.

use crate::error::TrellisError;
use crate::llm::CallPolicy;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Engine and caller settings for one process
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Model name passed to the provider
    pub model: String,
    pub temperature: f32,
    /// Hard bound on each individual provider call, in seconds
    pub request_timeout_secs: u64,
    /// Maximum provider calls per logical call
    pub max_attempts: u32,
    /// Backoff before the second attempt, in milliseconds
    pub base_backoff_ms: u64,
    /// Global backstop on node executions per run
    pub step_budget: u32,
    /// Workflow-level validation retries before giving up
    pub max_retries: u64,
    /// Entries kept in bounded history fields
    pub history_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            request_timeout_secs: 30,
            max_attempts: 3,
            base_backoff_ms: 1000,
            step_budget: 25,
            max_retries: 2,
            history_limit: 8,
        }
    }
}

impl RuntimeConfig {
    /// Load from a YAML file, or fall back to defaults when no path is
    /// given
    pub fn load(path: Option<&str>) -> Result<Self, TrellisError> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                Ok(serde_yaml::from_str(&text)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Project the caller-facing policy out of this config
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
