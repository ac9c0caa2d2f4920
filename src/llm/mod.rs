// SPDX-License-Identifier: MIT

//! LLM layer - provider abstraction plus the resilient call wrapper
//!
//! - [provider] - the generation-provider trait and request/response types
//! - [openai] - OpenAI chat-completions implementation
//! - [caller] - retry/backoff/timeout/fallback around any provider
//! - [schema] - output schema generation and structural validation

pub mod caller;
pub mod openai;
pub mod provider;
pub mod schema;

pub use caller::{CallOutcome, CallPolicy, CallTelemetry, Fallback, ResilientCaller};
pub use provider::{GenerationRequest, GenerationResponse, Message, Provider, Usage};
