//! Tool framework for the market analysis crew
//!
//! A [`Tool`] is an async function the model can call by name with a JSON
//! argument object. Each agent owns a [`ToolRegistry`] holding exactly the
//! tools bound to its role.

pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::Tool;
