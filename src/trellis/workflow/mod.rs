// SPDX-License-Identifier: MIT

pub mod agents;
pub mod engine;
pub mod node;
pub mod router;
pub mod state;

pub use engine::{GraphBuilder, GraphEngine, RunFailure, RunReport, RunStatus};
pub use node::{BranchNode, FnNode, Node};
pub use router::END;
pub use state::{partial, StateStore, StateUpdate};
