//! Scripted LLM provider for tests
//!
//! Replays a fixed list of responses in order and records every request, so
//! tests can drive the executor, the pipeline and the crew without network
//! access.

use agent_llm::{
    CompletionRequest, CompletionResponse, ContentBlock, LLMError, LLMProvider, Message,
    StopReason, TokenUsage,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

type Responder = Box<dyn Fn(&CompletionRequest) -> agent_llm::Result<CompletionResponse> + Send + Sync>;

/// Provider that answers from a script
pub struct ScriptedProvider {
    script: Mutex<VecDeque<agent_llm::Result<CompletionResponse>>>,
    fallback: Option<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    /// Replay `script` in order; running past its end is an error
    pub fn new(script: Vec<agent_llm::Result<CompletionResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answer every request with `responder`
    ///
    /// Useful when several agents share one provider and run concurrently,
    /// so the order of calls is not fixed.
    pub fn with_responder<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&CompletionRequest) -> agent_llm::Result<CompletionResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> agent_llm::Result<CompletionResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(responder)) => responder(&request),
            (None, None) => Err(LLMError::UnexpectedResponse(
                "script exhausted".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Final text answer
pub fn reply(text: &str, input_tokens: usize, output_tokens: usize) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant_blocks(vec![ContentBlock::text(text)]),
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::new(input_tokens, output_tokens),
    }
}

/// Turn requesting a single tool call
pub fn tool_call(
    id: &str,
    name: &str,
    input: Value,
    input_tokens: usize,
    output_tokens: usize,
) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }]),
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::new(input_tokens, output_tokens),
    }
}
