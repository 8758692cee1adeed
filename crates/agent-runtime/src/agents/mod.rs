//! Agent implementations

pub mod tool;

pub use tool::ToolAgent;
