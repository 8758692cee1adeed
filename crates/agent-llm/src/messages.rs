//! Message types for LLM communication
//!
//! Conversations are a list of [`Message`]s whose content is either plain
//! text or a list of [`ContentBlock`]s. Tool calls and their results travel
//! as blocks so one assistant turn can request several tools and the
//! following user turn can answer all of them at once.

use serde::{Deserialize, Serialize};

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Folded into the provider's system field where it has one
    System,
}

/// Image source for multi-modal content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Url { url: String },
    Base64 { media_type: String, data: String },
}

impl ImageSource {
    /// URL form, inlining base64 data as a data URI
    pub fn to_url(&self) -> String {
        match self {
            ImageSource::Url { url } => url.clone(),
            ImageSource::Base64 { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

/// Content block in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    Image {
        source: ImageSource,
    },

    /// Tool call requested by the assistant
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Answer to a `ToolUse`, sent in a user turn
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Successful tool result
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: None,
        }
    }

    /// Failed tool result; the model sees the message and may recover
    pub fn tool_error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: message.into(),
            is_error: Some(true),
        }
    }

    pub fn is_error_result(&self) -> bool {
        matches!(self, ContentBlock::ToolResult { is_error: Some(true), .. })
    }
}

/// Message content: either simple text or structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

impl Message {
    fn with_text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(text.into())),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_text(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::with_text(Role::System, text)
    }

    /// Assistant turn made of blocks (text and tool calls)
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(MessageContent::Blocks(blocks)),
        }
    }

    /// User turn answering one or more tool calls
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: Some(MessageContent::Blocks(results)),
        }
    }

    /// First text fragment, if any
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(MessageContent::Text(s)) => Some(s),
            Some(MessageContent::Blocks(blocks)) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
            None => None,
        }
    }

    /// Every text fragment, joined with newlines
    pub fn joined_text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(s)) => s.clone(),
            Some(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }

    /// Tool calls in an assistant turn
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        match &self.content {
            Some(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                .collect(),
            _ => vec![],
        }
    }

    pub fn has_tool_uses(&self) -> bool {
        !self.tool_uses().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_messages() {
        let msg = Message::user("Analyze MSFT");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), Some("Analyze MSFT"));
        assert_eq!(Message::assistant("ok").role, Role::Assistant);
    }

    #[test]
    fn test_joined_text_skips_tool_blocks() {
        let msg = Message::assistant_blocks(vec![
            ContentBlock::text("Part one."),
            ContentBlock::ToolUse {
                id: "t1".into(),
                name: "web_search".into(),
                input: json!({"query": "MSFT news"}),
            },
            ContentBlock::text("Part two."),
        ]);
        assert_eq!(msg.joined_text(), "Part one.\nPart two.");
        assert!(msg.has_tool_uses());
    }

    #[test]
    fn test_tool_results_batch() {
        let msg = Message::tool_results(vec![
            ContentBlock::tool_result("t1", "{}"),
            ContentBlock::tool_error("t2", "unknown ticker"),
        ]);
        assert_eq!(msg.role, Role::User);
        assert!(!msg.has_tool_uses());

        let Some(MessageContent::Blocks(blocks)) = &msg.content else {
            panic!("expected blocks");
        };
        assert!(!blocks[0].is_error_result());
        assert!(blocks[1].is_error_result());
    }

    #[test]
    fn test_tool_error_serialization() {
        let block = ContentBlock::tool_error("t9", "timeout");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_result");
        assert_eq!(value["is_error"], true);

        let ok = serde_json::to_value(ContentBlock::tool_result("t9", "done")).unwrap();
        assert!(ok.get("is_error").is_none());
    }

    #[test]
    fn test_image_source_url() {
        let source = ImageSource::Base64 {
            media_type: "image/png".into(),
            data: "abc".into(),
        };
        assert_eq!(source.to_url(), "data:image/png;base64,abc");
    }
}
