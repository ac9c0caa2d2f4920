// SPDX-License-Identifier: MIT

//! Resilient call layer - the single choke point for provider calls
//!
//! Every generation call goes through [ResilientCaller], which bounds
//! latency with a per-call timeout, retries transport failures with
//! exponential backoff, validates structured output, and composes a
//! caller-supplied fallback when all attempts are exhausted. Malformed
//! output never consumes the retry loop: a schema violation is a model or
//! prompt defect, not a transient fault.

use super::provider::{GenerationRequest, GenerationResponse, Provider, Usage};
use super::schema;
use crate::error::ProviderError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use uuid::Uuid;

/// Retry and timeout policy for a caller
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Maximum provider calls per logical call, at least 1
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles for each attempt after
    pub base_backoff: Duration,
    /// Hard bound on each individual provider call
    pub request_timeout: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl CallPolicy {
    /// Backoff to sleep after a failed attempt `i` (1-based): `base * 2^(i-1)`.
    ///
    /// Unjittered doubling; the schedule lives here and nowhere else.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Caller-supplied degraded result, invoked with the terminal error
pub type Fallback<T> = Box<dyn Fn(&ProviderError) -> T + Send + Sync>;

/// Telemetry record for one successful call.
///
/// Read-only once produced; never emitted for failed or fallback calls.
#[derive(Debug, Clone)]
pub struct CallTelemetry {
    pub correlation_id: Uuid,
    pub request_id: Option<String>,
    pub usage: Usage,
    pub attempts: u32,
    pub at: DateTime<Utc>,
}

/// Result of a resilient call: a real value with telemetry, or a degraded
/// fallback value without
#[derive(Debug)]
pub struct CallOutcome<T> {
    pub value: T,
    pub telemetry: Option<CallTelemetry>,
    pub degraded: bool,
}

/// Wraps a provider with retry, backoff, timeout, validation and fallback
pub struct ResilientCaller {
    provider: Arc<dyn Provider>,
    policy: CallPolicy,
}

impl ResilientCaller {
    pub fn new(provider: Arc<dyn Provider>, policy: CallPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Issue a call and return the provider's text output.
    ///
    /// Returns the fallback's value as a degraded outcome if one was
    /// supplied and the call exhausted its attempts; otherwise propagates
    /// exactly one terminal error.
    pub async fn call_text(
        &self,
        request: GenerationRequest,
        fallback: Option<Fallback<String>>,
    ) -> Result<CallOutcome<String>, ProviderError> {
        let correlation_id = Uuid::new_v4();
        match self.attempt_loop(correlation_id, &request).await {
            Ok((response, attempts)) => {
                let telemetry = self.record_success(correlation_id, &response, attempts);
                Ok(CallOutcome {
                    value: response.text,
                    telemetry: Some(telemetry),
                    degraded: false,
                })
            }
            Err(err) => Self::resolve(correlation_id, err, fallback),
        }
    }

    /// Issue a call whose output must conform to the JSON schema of `T`.
    ///
    /// The schema is attached to the request as the provider-side output
    /// constraint, and the returned payload is parsed, validated against
    /// the schema, and deserialized. Any of those failing is a
    /// malformed-output error and is never retried.
    pub async fn call_structured<T>(
        &self,
        mut request: GenerationRequest,
        fallback: Option<Fallback<T>>,
    ) -> Result<CallOutcome<T>, ProviderError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let correlation_id = Uuid::new_v4();
        let output_schema = schema::schema_for::<T>();
        request.output_schema = Some(output_schema.clone());

        let (response, attempts) = match self.attempt_loop(correlation_id, &request).await {
            Ok(ok) => ok,
            Err(err) => return Self::resolve(correlation_id, err, fallback),
        };

        let value = match parse_structured::<T>(&output_schema, &response.text) {
            Ok(value) => value,
            Err(err) => return Self::resolve(correlation_id, err, fallback),
        };

        let telemetry = self.record_success(correlation_id, &response, attempts);
        Ok(CallOutcome {
            value,
            telemetry: Some(telemetry),
            degraded: false,
        })
    }

    /// Bounded attempt loop over transport-retryable failures.
    ///
    /// At most `max_attempts` provider calls are issued.
    async fn attempt_loop(
        &self,
        correlation_id: Uuid,
        request: &GenerationRequest,
    ) -> Result<(GenerationResponse, u32), ProviderError> {
        let mut attempt = 1u32;
        loop {
            let outcome = match timeout(self.policy.request_timeout, self.provider.generate(request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.policy.request_timeout)),
            };

            match outcome {
                Ok(response) => return Ok((response, attempt)),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let backoff = self.policy.backoff_for(attempt);
                    log::warn!(
                        "call {}: attempt {}/{} failed ({}), retrying in {:?}",
                        correlation_id,
                        attempt,
                        self.policy.max_attempts,
                        err,
                        backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn record_success(
        &self,
        correlation_id: Uuid,
        response: &GenerationResponse,
        attempts: u32,
    ) -> CallTelemetry {
        let telemetry = CallTelemetry {
            correlation_id,
            request_id: response.request_id.clone(),
            usage: response.usage.clone(),
            attempts,
            at: Utc::now(),
        };
        log::info!(
            "call {} succeeded (request {}, attempt {}/{}, tokens {}+{}={})",
            telemetry.correlation_id,
            telemetry.request_id.as_deref().unwrap_or("-"),
            telemetry.attempts,
            self.policy.max_attempts,
            telemetry.usage.input_tokens,
            telemetry.usage.output_tokens,
            telemetry.usage.total_tokens
        );
        telemetry
    }

    /// Convert a terminal error into a degraded outcome if a fallback was
    /// supplied; never raises after the fallback ran.
    fn resolve<T>(
        correlation_id: Uuid,
        err: ProviderError,
        fallback: Option<Fallback<T>>,
    ) -> Result<CallOutcome<T>, ProviderError> {
        match fallback {
            Some(make) => {
                log::warn!("call {} degraded to fallback: {}", correlation_id, err);
                Ok(CallOutcome {
                    value: make(&err),
                    telemetry: None,
                    degraded: true,
                })
            }
            None => Err(err),
        }
    }
}

fn parse_structured<T: DeserializeOwned>(
    output_schema: &Value,
    text: &str,
) -> Result<T, ProviderError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ProviderError::malformed(format!("response was not valid JSON: {}", e)))?;

    schema::validate(output_schema, &value)
        .map_err(|v| ProviderError::malformed(format!("schema violation {}", v)))?;

    serde_json::from_value(value)
        .map_err(|e| ProviderError::malformed(format!("response did not match expected shape: {}", e)))
}
