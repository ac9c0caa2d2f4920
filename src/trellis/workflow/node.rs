// SPDX-License-Identifier: MIT

//! Node contracts - units of work over the workflow state
//!
//! A node reads the current state and returns a partial update; it owns no
//! mutable state of its own and must be safe to re-invoke. Only the engine
//! applies updates to the store.

use super::state::{StateStore, StateUpdate};
use crate::error::TrellisError;
use async_trait::async_trait;
use std::sync::Arc;

/// Core trait for workflow nodes
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique node name, used as the graph state identifier
    fn name(&self) -> &str;

    /// Run against a read view of the state and return a partial update
    async fn run(&self, state: &StateStore) -> Result<StateUpdate, TrellisError>;
}

/// Closure-backed node, for routing stubs and tests
pub struct FnNode {
    name: String,
    body: Box<dyn Fn(&StateStore) -> Result<StateUpdate, TrellisError> + Send + Sync>,
}

impl FnNode {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&StateStore) -> Result<StateUpdate, TrellisError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

#[async_trait]
impl Node for FnNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateStore) -> Result<StateUpdate, TrellisError> {
        (self.body)(state)
    }
}

/// Composite node running independent sub-computations against the same
/// pre-update snapshot.
///
/// Sibling branches cannot observe each other's output: every branch
/// receives the state as it was when the composite started, and all branch
/// updates are merged into one combined update only after every branch has
/// finished. Branches run concurrently; merge order across siblings is
/// unspecified, so branches must not write conflicting keys they care
/// about.
pub struct BranchNode {
    name: String,
    branches: Vec<Arc<dyn Node>>,
}

impl BranchNode {
    pub fn new(name: impl Into<String>, branches: Vec<Arc<dyn Node>>) -> Self {
        Self {
            name: name.into(),
            branches,
        }
    }
}

#[async_trait]
impl Node for BranchNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &StateStore) -> Result<StateUpdate, TrellisError> {
        let updates =
            futures::future::try_join_all(self.branches.iter().map(|b| b.run(state))).await?;

        let mut combined = StateUpdate::new();
        for update in updates {
            for (key, value) in update {
                combined.insert(key, value);
            }
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trellis::workflow::state::partial;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_node_returns_update() {
        let node = FnNode::new("greet", |_state| Ok(partial([("greeting", json!("hi"))])));

        assert_eq!(node.name(), "greet");
        let update = node.run(&StateStore::empty()).await.unwrap();
        assert_eq!(update.get("greeting"), Some(&json!("hi")));
    }

    #[tokio::test]
    async fn test_fn_node_reads_state() {
        let node = FnNode::new("doubler", |state: &StateStore| {
            let n = state.get_u64("n").unwrap_or(0);
            Ok(partial([("doubled", json!(n * 2))]))
        });

        let state = StateStore::seeded(partial([("n", json!(21))]));
        let update = node.run(&state).await.unwrap();
        assert_eq!(update.get("doubled"), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_branch_node_merges_all_updates() {
        let a = Arc::new(FnNode::new("a", |_| Ok(partial([("left", json!("A"))]))));
        let b = Arc::new(FnNode::new("b", |_| Ok(partial([("right", json!("B"))]))));
        let composite = BranchNode::new("both", vec![a, b]);

        let update = composite.run(&StateStore::empty()).await.unwrap();
        assert_eq!(update.get("left"), Some(&json!("A")));
        assert_eq!(update.get("right"), Some(&json!("B")));
    }

    #[tokio::test]
    async fn test_branches_see_the_same_snapshot() {
        // Branch 1 "mutates" a counter; branch 2 must still see the seed
        // value, because updates are applied only after both finish.
        let bump = Arc::new(FnNode::new("bump", |state: &StateStore| {
            let n = state.get_u64("counter").unwrap_or(0);
            Ok(partial([("counter", json!(n + 5))]))
        }));
        let observe = Arc::new(FnNode::new("observe", |state: &StateStore| {
            Ok(partial([(
                "observed",
                json!(state.get_u64("counter").unwrap_or(0)),
            )]))
        }));
        let composite = BranchNode::new("isolated", vec![bump, observe]);

        let state = StateStore::seeded(partial([("counter", json!(0))]));
        let update = composite.run(&state).await.unwrap();

        assert_eq!(update.get("counter"), Some(&json!(5)));
        assert_eq!(
            update.get("observed"),
            Some(&json!(0)),
            "branch 2 must not see branch 1's output"
        );
    }

    #[tokio::test]
    async fn test_branch_node_propagates_branch_error() {
        let ok = Arc::new(FnNode::new("ok", |_| Ok(StateUpdate::new())));
        let bad = Arc::new(FnNode::new("bad", |_| {
            Err(TrellisError::node("branch exploded"))
        }));
        let composite = BranchNode::new("mixed", vec![ok, bad]);

        let err = composite.run(&StateStore::empty()).await.unwrap_err();
        assert!(err.to_string().contains("branch exploded"));
    }
}
