// SPDX-License-Identifier: MIT

//! Provider abstraction - the external text-generation collaborator
//!
//! Everything that talks to a model goes through the [Provider] trait, so
//! the resilient call layer and the workflow nodes never depend on a
//! concrete vendor API.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request payload for a generation call
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// JSON schema the output must conform to, if structured output is required
    pub output_schema: Option<Value>,
}

impl GenerationRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// Token usage counters reported by the provider.
///
/// Propagated as-is; no accounting is done on top of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A successful generation result
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    /// Provider-assigned request identifier, when one is returned
    pub request_id: Option<String>,
    pub usage: Usage,
}

/// Core trait for generation provider implementations
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResponse, ProviderError>;
}
