//! Agent runtime for the market analysis crew
//!
//! [`AgentExecutor`] runs the LLM ↔ tool loop, [`ToolAgent`] exposes it
//! behind the `Agent` trait, and [`AgentRuntime`] hands out agents that share
//! one provider and one retry policy.

pub mod agents;
pub mod executor;
pub mod runtime;
pub mod testing;

pub use agents::ToolAgent;
pub use executor::{AgentExecutor, AgentExecutorBuilder, ExecutionOutcome, ExecutorConfig};
pub use runtime::{AgentRuntime, AgentRuntimeBuilder, RuntimeConfig};
