// SPDX-License-Identifier: MIT

//! Typed error handling for trellis-rs
//!
//! The retry/backoff decision is a pure function of the error kind
//! (`ProviderError::is_retryable`), never of downcasting or matching on
//! exception classes.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for trellis-rs
#[derive(Debug, Error)]
pub enum TrellisError {
    /// Provider call errors (transport failures, malformed output)
    #[error("provider call failed: {0}")]
    Call(#[from] ProviderError),

    /// Workflow graph configuration errors
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Configuration errors (missing env vars, invalid config files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Business-level failure inside a node
    #[error("node failure: {0}")]
    Node(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl TrellisError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a node-level failure
    pub fn node(message: impl Into<String>) -> Self {
        Self::Node(message.into())
    }
}

/// Errors raised while validating or routing a workflow graph.
///
/// All of these are configuration/programming errors and are fatal:
/// the engine never recovers from them or defaults silently.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A routed-to or referenced node is not in the registry
    #[error("unknown node '{0}' referenced in graph")]
    UnknownNode(String),

    /// The configured entry node is not registered
    #[error("entry node '{0}' is not registered")]
    UnknownEntry(String),

    /// No entry node was configured
    #[error("graph has no entry point")]
    MissingEntry,

    /// Two nodes were registered under the same name
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),

    /// A node has no outgoing edge configured
    #[error("node '{0}' has no outgoing edge")]
    MissingEdge(String),

    /// A routing predicate returned a label outside the declared set
    #[error("router for node '{node}' returned '{label}', which is not a declared successor")]
    UnknownSuccessor { node: String, label: String },
}

/// Errors from the generation provider and the resilient call layer
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Rate limit exceeded
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Connection-level failure (DNS, TLS, refused, reset)
    #[error("connection failure: {0}")]
    Connection(String),

    /// The call did not complete within the per-call timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream server error (HTTP 5xx)
    #[error("provider server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The provider rejected the request (auth, bad payload); not retryable
    #[error("provider rejected request with status {status}: {message}")]
    Request { status: u16, message: String },

    /// Returned content failed to parse or failed schema validation; not
    /// retryable, since an unconditioned retry is unlikely to fix it
    #[error("malformed output: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether a retry with backoff may resolve this error.
    ///
    /// Transport-level failures are transient; request rejections and
    /// malformed output are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Connection(_)
                | ProviderError::Timeout(_)
                | ProviderError::Server { .. }
        )
    }

    /// Create a malformed-output error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}
