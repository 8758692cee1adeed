//! LLM provider trait definition

use crate::{CompletionRequest, CompletionResponse, Result};
use async_trait::async_trait;

/// A chat-completion backend
///
/// Implementations perform exactly one HTTP exchange per call. Retrying is
/// left to the caller's `RetryPolicy`.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate the next assistant turn for `request`
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Short provider name used in logs and error messages
    fn name(&self) -> &str;
}
