use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::message::Turn;
use crate::models::tool::{Tool, ToolRequest};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One model step: optional text and the tool calls it asked for
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_requests: Vec<ToolRequest>,
}

impl Completion {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            tool_requests: Vec::new(),
        }
    }

    pub fn with_tool_request(mut self, request: ToolRequest) -> Self {
        self.tool_requests.push(request);
        self
    }
}

/// Base trait for chat-completion providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Produce the next step of the conversation
    async fn complete(
        &self,
        system: &str,
        history: &[Turn],
        tools: &[Tool],
    ) -> Result<(Completion, Usage)>;
}
