//! Core abstractions for the market analysis crew
//!
//! This crate defines the fundamental traits and types shared by the runtime,
//! the pipeline and the role agents.

pub mod agent;
pub mod context;
pub mod error;

pub use agent::Agent;
pub use context::Context;
pub use error::{Error, Result};
