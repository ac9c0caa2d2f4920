// SPDX-License-Identifier: MIT

//! OpenAI provider - chat completions API implementation

use super::provider::{GenerationRequest, GenerationResponse, Provider, Usage};
use crate::error::{ProviderError, TrellisError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::env;

/// OpenAI chat-completions provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new OpenAiProvider
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self, TrellisError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| TrellisError::config("OPENAI_API_KEY must be set"))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url,
        })
    }

    /// Build the chat-completions request body
    fn build_body(&self, request: &GenerationRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = request.max_output_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(schema) = &request.output_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "output",
                    "schema": schema,
                    "strict": true
                }
            });
        }

        body
    }

    /// Parse a chat-completions response body into a GenerationResponse
    fn parse_response(body: &Value) -> Result<GenerationResponse, ProviderError> {
        let choice = body["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ProviderError::malformed("no choices in response"))?;

        let text = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::malformed("no message content in response"))?
            .to_string();

        let usage = Usage {
            input_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: body["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(GenerationResponse {
            text,
            request_id: body["id"].as_str().map(|s| s.to_string()),
            usage,
        })
    }

    fn classify_send_error(err: reqwest::Error) -> ProviderError {
        ProviderError::Connection(err.to_string())
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::classify_send_error)?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status.is_server_error() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Server {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Request {
                status: status.as_u16(),
                message,
            });
        }

        let resp_json: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("response body was not JSON: {}", e)))?;

        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_response(&resp_json)
    }
}
