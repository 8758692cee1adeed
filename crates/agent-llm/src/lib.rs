//! LLM provider abstraction for the market analysis crew
//!
//! Provider-agnostic message, completion and tool types, the
//! [`LLMProvider`] trait, and HTTP backends for Gemini (through its
//! OpenAI-compatible endpoint), OpenAI-compatible servers and Anthropic.

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod providers;
pub mod tools;

pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{ContentBlock, ImageSource, Message, MessageContent, Role};
pub use provider::LLMProvider;
pub use tools::ToolDefinition;
