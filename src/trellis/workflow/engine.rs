// SPDX-License-Identifier: MIT

//! Graph engine - validated construction and the sequential run loop
//!
//! The engine is a state machine over node names: the store is the
//! extended state, the router is the transition function, and [END] is the
//! accepting state. Node and edge tables are resolved and validated once
//! at build time; runs never encounter a dangling name.

use super::node::Node;
use super::router::{Edge, EdgeRouter, RoutePredicate, END};
use super::state::{StateStore, StateUpdate};
use crate::error::{TrellisError, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// How a run ended, when it ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Routing reached the terminal sentinel
    Completed,
    /// The global step budget was exhausted before termination
    StepLimit,
}

/// Successful (or budget-limited) run result
#[derive(Debug)]
pub struct RunReport {
    pub state: StateStore,
    pub status: RunStatus,
    pub steps: u32,
}

/// A halted run: the terminal error plus the last known state for
/// diagnostics
#[derive(Debug, Error)]
#[error("workflow halted at step {steps}: {error}")]
pub struct RunFailure {
    #[source]
    pub error: TrellisError,
    pub state: StateStore,
    pub steps: u32,
}

/// Builder for a validated workflow graph
pub struct GraphBuilder {
    nodes: Vec<Arc<dyn Node>>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
    step_budget: u32,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: HashMap::new(),
            entry: None,
            step_budget: 100,
        }
    }

    /// Register a node under its own name
    pub fn add_node(mut self, node: impl Node + 'static) -> Self {
        self.nodes.push(Arc::new(node));
        self
    }

    /// Register an already-shared node
    pub fn add_shared_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a fixed edge from `from` to `to` (a node name or [END])
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::Static(to.into()));
        self
    }

    /// Add a conditional edge: the predicate's label is looked up in
    /// `targets` (label -> node name or [END])
    pub fn add_conditional_edges(
        mut self,
        from: impl Into<String>,
        predicate: impl Fn(&StateStore) -> String + Send + Sync + 'static,
        targets: Vec<(&str, &str)>,
    ) -> Self {
        let predicate: RoutePredicate = Arc::new(predicate);
        self.edges.insert(
            from.into(),
            Edge::Conditional {
                predicate,
                targets: targets
                    .into_iter()
                    .map(|(label, target)| (label.to_string(), target.to_string()))
                    .collect(),
            },
        );
        self
    }

    pub fn set_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Global backstop on node executions per run
    pub fn with_step_budget(mut self, step_budget: u32) -> Self {
        self.step_budget = step_budget;
        self
    }

    /// Validate the graph and produce an engine.
    ///
    /// Checks: an entry point is set and registered, node names are
    /// unique, every node has an outgoing edge, and every edge target is
    /// a registered node or [END].
    pub fn build(self) -> Result<GraphEngine, WorkflowError> {
        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
        for node in self.nodes {
            let name = node.name().to_string();
            if nodes.insert(name.clone(), node).is_some() {
                return Err(WorkflowError::DuplicateNode(name));
            }
        }

        let entry = self.entry.ok_or(WorkflowError::MissingEntry)?;
        if !nodes.contains_key(&entry) {
            return Err(WorkflowError::UnknownEntry(entry));
        }

        for (from, edge) in &self.edges {
            if !nodes.contains_key(from) {
                return Err(WorkflowError::UnknownNode(from.clone()));
            }
            for target in edge.targets() {
                if target != END && !nodes.contains_key(target) {
                    return Err(WorkflowError::UnknownNode(target.to_string()));
                }
            }
        }

        for name in nodes.keys() {
            if !self.edges.contains_key(name) {
                return Err(WorkflowError::MissingEdge(name.clone()));
            }
        }

        Ok(GraphEngine {
            nodes,
            router: EdgeRouter::new(self.edges),
            entry,
            step_budget: self.step_budget,
        })
    }
}

/// Drives a validated graph: executes the current node, merges its update,
/// routes to the successor, and repeats until [END] or the step budget
#[derive(Clone)]
pub struct GraphEngine {
    nodes: HashMap<String, Arc<dyn Node>>,
    router: EdgeRouter,
    entry: String,
    step_budget: u32,
}

impl std::fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphEngine")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("step_budget", &self.step_budget)
            .finish()
    }
}

impl GraphEngine {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn step_budget(&self) -> u32 {
        self.step_budget
    }

    /// Run the workflow from its entry node with the given seed fields.
    ///
    /// Returns a [RunReport] on normal termination or budget exhaustion
    /// (the two are distinguished by [RunStatus]), or a [RunFailure]
    /// carrying the error and the last state snapshot. The engine never
    /// retries a node; cycles are bounded only by the step budget and by
    /// whatever counters node/edge logic keeps in the state.
    pub async fn run(&self, seed: StateUpdate) -> Result<RunReport, RunFailure> {
        let mut state = StateStore::seeded(seed);
        let mut current = self.entry.clone();
        let mut steps = 0u32;

        loop {
            // Budget first: a run that spent its whole budget reports the
            // limit even if the next route would have been END.
            if steps >= self.step_budget {
                log::warn!(
                    "step budget {} exhausted at '{}', halting",
                    self.step_budget,
                    current
                );
                return Ok(RunReport {
                    state,
                    status: RunStatus::StepLimit,
                    steps,
                });
            }
            if current == END {
                return Ok(RunReport {
                    state,
                    status: RunStatus::Completed,
                    steps,
                });
            }

            let Some(node) = self.nodes.get(&current) else {
                return Err(RunFailure {
                    error: WorkflowError::UnknownNode(current).into(),
                    state,
                    steps,
                });
            };

            steps += 1;
            log::info!("step {}: executing node '{}'", steps, current);

            let update = match node.run(&state).await {
                Ok(update) => update,
                Err(error) => {
                    log::error!("node '{}' failed: {}", current, error);
                    return Err(RunFailure {
                        error,
                        state,
                        steps,
                    });
                }
            };
            state.merge(update);

            current = match self.router.route(&current, &state) {
                Ok(next) => next,
                Err(error) => {
                    return Err(RunFailure {
                        error: error.into(),
                        state,
                        steps,
                    });
                }
            };
        }
    }
}
