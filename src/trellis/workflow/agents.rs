// SPDX-License-Identifier: MIT

//! LLM-backed nodes and the research workflow
//!
//! `PromptNode` is the generic generation node: an instruction plus
//! labeled state fields in, one state field out. `ValidationNode` judges
//! competing drafts with a structured verdict and owns the retry counter,
//! since the reject decision is made here. Routing itself lives in the
//! graph's conditional edges.

use super::engine::{GraphBuilder, GraphEngine};
use super::node::{BranchNode, Node};
use super::router::END;
use super::state::{appended, partial, StateStore, StateUpdate};
use crate::error::{TrellisError, WorkflowError};
use crate::llm::{GenerationRequest, Message, ResilientCaller};
use crate::trellis::config::RuntimeConfig;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Generation node: renders labeled state fields under an instruction and
/// writes the provider's text to a single output field
pub struct PromptNode {
    name: String,
    instruction: String,
    /// (heading, state field) pairs rendered into the user message;
    /// absent fields are skipped
    inputs: Vec<(String, String)>,
    output_field: String,
    caller: Arc<ResilientCaller>,
    temperature: f32,
}

impl PromptNode {
    pub fn new(
        name: impl Into<String>,
        instruction: impl Into<String>,
        inputs: Vec<(&str, &str)>,
        output_field: impl Into<String>,
        caller: Arc<ResilientCaller>,
        temperature: f32,
    ) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            inputs: inputs
                .into_iter()
                .map(|(heading, field)| (heading.to_string(), field.to_string()))
                .collect(),
            output_field: output_field.into(),
            caller,
            temperature,
        }
    }

    fn render_inputs(&self, state: &StateStore) -> String {
        let mut content = String::new();
        for (heading, field) in &self.inputs {
            if !state.is_set(field) {
                continue;
            }
            let value = match state.get(field) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => continue,
            };
            content.push_str(&format!("{}:\n{}\n\n", heading, value));
        }
        content
    }
}

#[async_trait]
impl Node for PromptNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateStore) -> Result<StateUpdate, TrellisError> {
        let request = GenerationRequest::new(vec![
            Message::system(self.instruction.clone()),
            Message::user(self.render_inputs(state)),
        ])
        .with_temperature(self.temperature);

        let outcome = self.caller.call_text(request, None).await?;
        Ok(partial([(
            self.output_field.as_str(),
            json!(outcome.value),
        )]))
    }
}

/// Structured verdict returned by the validation judge
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    /// "a" or "b" to accept that draft, "reject" to send reasoning back
    pub choice: String,
    pub feedback: String,
}

/// Judges the two drafts and either promotes one to the final answer or
/// rejects, incrementing the retry counter and recording feedback in a
/// bounded log
pub struct ValidationNode {
    name: String,
    caller: Arc<ResilientCaller>,
    temperature: f32,
    feedback_keep_last: usize,
}

impl ValidationNode {
    pub fn new(
        name: impl Into<String>,
        caller: Arc<ResilientCaller>,
        temperature: f32,
        feedback_keep_last: usize,
    ) -> Self {
        Self {
            name: name.into(),
            caller,
            temperature,
            feedback_keep_last,
        }
    }

    fn reject(&self, state: &StateStore, feedback: String) -> StateUpdate {
        let used = state.get_u64("retry_count").unwrap_or(0);
        partial([
            ("retry_count", json!(used + 1)),
            (
                "feedback_log",
                appended(
                    state,
                    "feedback_log",
                    json!(feedback),
                    self.feedback_keep_last,
                ),
            ),
            ("validation_feedback", json!(feedback)),
        ])
    }
}

#[async_trait]
impl Node for ValidationNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateStore) -> Result<StateUpdate, TrellisError> {
        let request = GenerationRequest::new(vec![
            Message::system(
                "You are a strict judge. Compare Answer A and Answer B against the research \
                 notes. Pick 'a' if Answer A is better, 'b' if Answer B is better, or 'reject' \
                 if neither is acceptable, and give brief feedback.",
            ),
            Message::user(format!(
                "Research Notes:\n{}\n\nAnswer A:\n{}\n\nAnswer B:\n{}",
                state.get_str("research_notes").unwrap_or_default(),
                state.get_str("draft_answer_a").unwrap_or_default(),
                state.get_str("draft_answer_b").unwrap_or_default(),
            )),
        ])
        .with_temperature(self.temperature);

        let outcome = self.caller.call_structured::<Verdict>(request, None).await?;
        let verdict = outcome.value;

        let chosen_field = match verdict.choice.to_lowercase().as_str() {
            "a" => Some("draft_answer_a"),
            "b" => Some("draft_answer_b"),
            _ => None,
        };

        match chosen_field.map(|field| state.get_str(field).unwrap_or_default()) {
            Some(draft) if !draft.is_empty() => Ok(partial([
                ("final_answer", json!(draft)),
                ("validation_feedback", json!(verdict.feedback)),
            ])),
            _ => Ok(self.reject(state, verdict.feedback)),
        }
    }
}

/// Routing decision after validation: finish, loop reasoning, or give up
/// once the retry budget is spent
pub fn validation_route(max_retries: u64) -> impl Fn(&StateStore) -> String {
    move |state: &StateStore| {
        if state.is_set("final_answer") {
            "done".to_string()
        } else if state.get_u64("retry_count").unwrap_or(0) <= max_retries {
            "retry".to_string()
        } else {
            "give_up".to_string()
        }
    }
}

/// Build the research workflow: research -> independent reasoning branches
/// -> validation, looping reasoning on rejection up to the retry budget.
pub fn research_workflow(
    caller: Arc<ResilientCaller>,
    config: &RuntimeConfig,
) -> Result<GraphEngine, WorkflowError> {
    let research = PromptNode::new(
        "research",
        "You are a research agent. Gather factual, relevant information only. \
         Do NOT answer the question.",
        vec![("Question", "user_query")],
        "research_notes",
        caller.clone(),
        config.temperature,
    );

    let reasoner_a = PromptNode::new(
        "reasoner_a",
        "You are Reasoner A. Produce a clear, structured answer.",
        vec![("Research", "research_notes"), ("Question", "user_query")],
        "draft_answer_a",
        caller.clone(),
        config.temperature,
    );
    let reasoner_b = PromptNode::new(
        "reasoner_b",
        "You are Reasoner B. Provide an alternative reasoning approach.",
        vec![("Research", "research_notes"), ("Question", "user_query")],
        "draft_answer_b",
        caller.clone(),
        config.temperature,
    );
    let reasoning = BranchNode::new(
        "reasoning",
        vec![Arc::new(reasoner_a), Arc::new(reasoner_b)],
    );

    let validation = ValidationNode::new(
        "validation",
        caller,
        config.temperature,
        config.history_limit,
    );

    GraphBuilder::new()
        .add_node(research)
        .add_node(reasoning)
        .add_node(validation)
        .add_edge("research", "reasoning")
        .add_edge("reasoning", "validation")
        .add_conditional_edges(
            "validation",
            validation_route(config.max_retries),
            vec![("done", END), ("retry", "reasoning"), ("give_up", END)],
        )
        .set_entry_point("research")
        .with_step_budget(config.step_budget)
        .build()
}
