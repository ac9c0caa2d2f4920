//! Edge routing - resolves which node runs next
//!
//! Routing is a first-class edge contract: a conditional edge carries a
//! predicate over the state and a finite table of declared labels. A
//! predicate returning a label outside that table is a configuration error
//! and fails loudly; nothing silently defaults.

use super::state::StateStore;
use crate::error::WorkflowError;
use std::collections::HashMap;
use std::sync::Arc;

/// Terminal sentinel: routing to this name ends the run
pub const END: &str = "__end__";

/// Predicate over the state, returning a routing label
pub type RoutePredicate = Arc<dyn Fn(&StateStore) -> String + Send + Sync>;

/// Outgoing edge of a node
#[derive(Clone)]
pub enum Edge {
    /// Fixed successor, state is ignored
    Static(String),
    /// Predicate-selected successor from a declared label set
    Conditional {
        predicate: RoutePredicate,
        /// Label returned by the predicate -> node name or [END]
        targets: HashMap<String, String>,
    },
}

impl Edge {
    /// Every node name (or END) this edge can route to
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Static(next) => vec![next.as_str()],
            Edge::Conditional { targets, .. } => targets.values().map(|t| t.as_str()).collect(),
        }
    }
}

/// Maps a completed node to its successor
#[derive(Clone, Default)]
pub struct EdgeRouter {
    edges: HashMap<String, Edge>,
}

impl EdgeRouter {
    pub fn new(edges: HashMap<String, Edge>) -> Self {
        Self { edges }
    }

    pub fn edge(&self, from: &str) -> Option<&Edge> {
        self.edges.get(from)
    }

    /// Resolve the successor of `from` given the current state.
    ///
    /// Static edges ignore the state. Conditional edges evaluate the
    /// predicate and look the label up in the declared target set.
    pub fn route(&self, from: &str, state: &StateStore) -> Result<String, WorkflowError> {
        match self.edges.get(from) {
            None => Err(WorkflowError::MissingEdge(from.to_string())),
            Some(Edge::Static(next)) => Ok(next.clone()),
            Some(Edge::Conditional { predicate, targets }) => {
                let label = predicate(state);
                targets
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| WorkflowError::UnknownSuccessor {
                        node: from.to_string(),
                        label,
                    })
            }
        }
    }
}
