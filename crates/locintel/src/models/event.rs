use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One incremental update from the chat-completion stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    /// A fragment of assistant text for the named turn
    #[serde(rename_all = "camelCase")]
    TextDelta { turn_id: String, text: String },

    /// The assistant asked for a tool to be invoked
    #[serde(rename_all = "camelCase")]
    ToolCallStart {
        turn_id: String,
        call_id: String,
        tool_name: String,
        input: Value,
    },

    /// A tool invocation finished, with its output or a failure reason
    #[serde(rename_all = "camelCase")]
    ToolCallEnd {
        call_id: String,
        result: Result<Value, String>,
    },
}

impl StreamEvent {
    pub fn text_delta<T: Into<String>, S: Into<String>>(turn_id: T, text: S) -> Self {
        StreamEvent::TextDelta {
            turn_id: turn_id.into(),
            text: text.into(),
        }
    }

    pub fn tool_call_start<T, C, N>(turn_id: T, call_id: C, tool_name: N, input: Value) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        N: Into<String>,
    {
        StreamEvent::ToolCallStart {
            turn_id: turn_id.into(),
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }

    pub fn tool_succeeded<C: Into<String>>(call_id: C, output: Value) -> Self {
        StreamEvent::ToolCallEnd {
            call_id: call_id.into(),
            result: Ok(output),
        }
    }

    pub fn tool_failed<C: Into<String>, R: Into<String>>(call_id: C, reason: R) -> Self {
        StreamEvent::ToolCallEnd {
            call_id: call_id.into(),
            result: Err(reason.into()),
        }
    }
}
