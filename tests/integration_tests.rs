//! Integration tests for workflow construction and execution
//!
//! These tests verify end-to-end behavior using mock providers and stub
//! nodes: the validation retry loop, transport retries surfacing through a
//! running graph, give-up routing, and failure diagnostics.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use trellis_rs::error::{ProviderError, TrellisError};
use trellis_rs::llm::{GenerationRequest, GenerationResponse, Provider, ResilientCaller, Usage};
use trellis_rs::trellis::config::RuntimeConfig;
use trellis_rs::trellis::workflow::agents::research_workflow;
use trellis_rs::trellis::workflow::{
    partial, FnNode, GraphBuilder, RunStatus, StateStore, StateUpdate, END,
};

// ============================================================================
// Mock Components
// ============================================================================

/// Mock provider for the research workflow: optionally fails the first N
/// calls with a transport error, answers by matching the system
/// instruction, and rejects the first N judge verdicts.
struct ScenarioProvider {
    fail_first: u32,
    reject_first: u32,
    calls: AtomicU32,
    judge_calls: AtomicU32,
}

impl ScenarioProvider {
    fn new(fail_first: u32, reject_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            reject_first,
            calls: AtomicU32::new(0),
            judge_calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn ok(text: &str) -> Result<GenerationResponse, ProviderError> {
        Ok(GenerationResponse {
            text: text.to_string(),
            request_id: Some("req-scenario".to_string()),
            usage: Usage {
                input_tokens: 20,
                output_tokens: 10,
                total_tokens: 30,
            },
        })
    }
}

#[async_trait]
impl Provider for ScenarioProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ProviderError::Server {
                status: 503,
                message: "scripted outage".to_string(),
            });
        }

        let system = request
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if system.contains("research agent") {
            Self::ok("CRISPR uses Cas9 to cut DNA at guide-RNA targets.")
        } else if system.contains("Reasoner A") {
            Self::ok("Answer from A")
        } else if system.contains("Reasoner B") {
            Self::ok("Answer from B")
        } else if system.contains("strict judge") {
            let verdict = self.judge_calls.fetch_add(1, Ordering::SeqCst);
            if verdict < self.reject_first {
                Self::ok(r#"{"choice": "reject", "feedback": "unsupported claims"}"#)
            } else {
                Self::ok(r#"{"choice": "a", "feedback": "A is grounded in the notes"}"#)
            }
        } else {
            Err(ProviderError::malformed(format!(
                "no scripted response for instruction '{}'",
                system
            )))
        }
    }
}

fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        max_attempts: 3,
        base_backoff_ms: 1,
        request_timeout_secs: 1,
        max_retries: 2,
        step_budget: 25,
        history_limit: 2,
        ..Default::default()
    }
}

fn caller_for(provider: Arc<dyn Provider>, config: &RuntimeConfig) -> Arc<ResilientCaller> {
    Arc::new(ResilientCaller::new(provider, config.call_policy()))
}

// ============================================================================
// Scripted stub-node scenario
// ============================================================================

/// The canonical loop scenario with stub nodes: research produces notes,
/// reasoning produces a draft, validation rejects the first pass and
/// approves the second. Expects a final answer and a visible retry count
/// of one.
#[tokio::test]
async fn test_stub_validation_loop_retries_once_then_completes() {
    let engine = GraphBuilder::new()
        .add_node(FnNode::new("research", |_| {
            Ok(partial([("research_notes", json!("notes"))]))
        }))
        .add_node(FnNode::new("reasoning", |_| {
            Ok(partial([("draft", json!("draft text"))]))
        }))
        .add_node(FnNode::new("validation", |state: &StateStore| {
            if state.get_u64("retry_count").unwrap_or(0) == 0 {
                Ok(partial([
                    ("approved", json!(false)),
                    ("retry_count", json!(1)),
                ]))
            } else {
                Ok(partial([
                    ("approved", json!(true)),
                    ("final_answer", json!("X")),
                ]))
            }
        }))
        .add_edge("research", "reasoning")
        .add_edge("reasoning", "validation")
        .add_conditional_edges(
            "validation",
            |state: &StateStore| {
                if state.get_bool("approved").unwrap_or(false) {
                    "done".to_string()
                } else if state.get_u64("retry_count").unwrap_or(0) <= 2 {
                    "retry".to_string()
                } else {
                    "give_up".to_string()
                }
            },
            vec![("done", END), ("retry", "reasoning"), ("give_up", END)],
        )
        .set_entry_point("research")
        .build()
        .unwrap();

    let report = engine.run(StateUpdate::new()).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.state.get_str("final_answer"), Some("X"));
    assert_eq!(report.state.get_u64("retry_count"), Some(1));
    // research, reasoning, validation, reasoning, validation
    assert_eq!(report.steps, 5);
}

// ============================================================================
// Full workflow over the mock provider
// ============================================================================

#[tokio::test]
async fn test_workflow_survives_transient_provider_outage() {
    let config = fast_config();
    let provider = ScenarioProvider::new(2, 0);
    let engine = research_workflow(caller_for(provider.clone(), &config), &config).unwrap();

    let report = engine
        .run(partial([("user_query", json!("Explain how CRISPR works"))]))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.state.get_str("final_answer"), Some("Answer from A"));
    // Two failed attempts for the research call, then research, both
    // reasoners, and the judge.
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn test_workflow_rejection_loops_reasoning_once() {
    let config = fast_config();
    let provider = ScenarioProvider::new(0, 1);
    let engine = research_workflow(caller_for(provider.clone(), &config), &config).unwrap();

    let report = engine
        .run(partial([("user_query", json!("Explain how CRISPR works"))]))
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.state.get_str("final_answer"), Some("Answer from A"));
    assert_eq!(report.state.get_u64("retry_count"), Some(1));
    // research, reasoning, validation, reasoning, validation
    assert_eq!(report.steps, 5);
    assert_eq!(
        report.state.get("feedback_log"),
        Some(&json!(["unsupported claims"]))
    );
}

#[tokio::test]
async fn test_workflow_gives_up_after_retry_budget() {
    let config = fast_config();
    // The judge never approves anything.
    let provider = ScenarioProvider::new(0, u32::MAX);
    let engine = research_workflow(caller_for(provider, &config), &config).unwrap();

    let report = engine
        .run(partial([("user_query", json!("Explain how CRISPR works"))]))
        .await
        .unwrap();

    // Giving up is normal termination, not an error or a step-limit halt.
    assert_eq!(report.status, RunStatus::Completed);
    assert!(!report.state.is_set("final_answer"));
    assert_eq!(report.state.get_u64("retry_count"), Some(3));
    assert_eq!(
        report.state.get("feedback_log"),
        Some(&json!(["unsupported claims", "unsupported claims"])),
        "feedback log is trimmed to the configured history limit"
    );
}

#[tokio::test]
async fn test_provider_exhaustion_fails_run_with_state_attached() {
    struct DownProvider;

    #[async_trait]
    impl Provider for DownProvider {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResponse, ProviderError> {
            Err(ProviderError::Connection("refused".to_string()))
        }
    }

    let config = RuntimeConfig {
        max_attempts: 2,
        base_backoff_ms: 1,
        ..fast_config()
    };
    let caller = Arc::new(ResilientCaller::new(
        Arc::new(DownProvider),
        config.call_policy(),
    ));
    let engine = research_workflow(caller, &config).unwrap();

    let failure = engine
        .run(partial([("user_query", json!("anything"))]))
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        TrellisError::Call(ProviderError::Connection(_))
    ));
    assert_eq!(failure.steps, 1, "the entry node was the failing step");
    assert_eq!(
        failure.state.get_str("user_query"),
        Some("anything"),
        "diagnostics carry the last known state"
    );
}
