// SPDX-License-Identifier: MIT

//! trellis-rs - a stateful workflow orchestration engine with a resilient
//! LLM call layer
//!
//! Workflows are graphs of named nodes over a shared [trellis::workflow::StateStore],
//! driven by [trellis::workflow::GraphEngine] with static and conditional
//! edges, cycle support, and a global step budget. Nodes that need
//! generated text go through [llm::ResilientCaller], which bounds latency,
//! retries transport failures with exponential backoff, validates
//! structured output, and composes caller-supplied fallbacks.

pub mod error;
pub mod llm;
pub mod trellis;
