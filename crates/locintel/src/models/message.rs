use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::role::Role;

/// Lifecycle of a single tool invocation. Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Succeeded,
    Failed,
}

impl ToolStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ToolStatus::Pending)
    }
}

/// The status of an invocation together with what it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolState {
    Pending,
    Succeeded { output: Value },
    Failed { reason: String },
}

impl ToolState {
    pub fn status(&self) -> ToolStatus {
        match self {
            ToolState::Pending => ToolStatus::Pending,
            ToolState::Succeeded { .. } => ToolStatus::Succeeded,
            ToolState::Failed { .. } => ToolStatus::Failed,
        }
    }
}

impl From<Result<Value, String>> for ToolState {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(output) => ToolState::Succeeded { output },
            Err(reason) => ToolState::Failed { reason },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub input: Value,
    #[serde(flatten)]
    pub state: ToolState,
}

impl ToolInvocation {
    pub fn pending<C: Into<String>, N: Into<String>>(call_id: C, tool_name: N, input: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            input,
            state: ToolState::Pending,
        }
    }

    pub fn status(&self) -> ToolStatus {
        self.state.status()
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.state {
            ToolState::Succeeded { output } => Some(output),
            _ => None,
        }
    }

    pub fn error_reason(&self) -> Option<&str> {
        match &self.state {
            ToolState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// One ordered piece of a turn
pub enum Part {
    Text { text: String },
    ToolCall(ToolInvocation),
}

impl Part {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolInvocation> {
        match self {
            Part::ToolCall(invocation) => Some(invocation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A user submission or an assistant reply
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub created: i64,
    pub parts: Vec<Part>,
    /// Set once the stream that produced this turn finished; the turn is immutable after
    pub completed: bool,
}

impl Turn {
    fn new<S: Into<String>>(id: S, role: Role) -> Self {
        Turn {
            id: id.into(),
            role,
            created: Utc::now().timestamp(),
            parts: Vec::new(),
            completed: false,
        }
    }

    /// Create a new user turn with the current timestamp
    pub fn user<S: Into<String>>(id: S) -> Self {
        Self::new(id, Role::User)
    }

    /// Create a new assistant turn with the current timestamp
    pub fn assistant<S: Into<String>>(id: S) -> Self {
        Self::new(id, Role::Assistant)
    }

    pub fn with_part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_part(Part::text(text))
    }

    pub fn with_tool_call(self, invocation: ToolInvocation) -> Self {
        self.with_part(Part::ToolCall(invocation))
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Append to the trailing text part, or start a new one if the turn does not end in text
    pub fn push_text(&mut self, delta: &str) {
        match self.parts.last_mut() {
            Some(Part::Text { text }) => text.push_str(delta),
            _ => self.parts.push(Part::text(delta)),
        }
    }

    /// All text parts joined in order
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(Part::as_tool_call)
    }

    pub fn tool_call(&self, call_id: &str) -> Option<&ToolInvocation> {
        self.tool_calls().find(|invocation| invocation.call_id == call_id)
    }

    pub fn tool_call_mut(&mut self, call_id: &str) -> Option<&mut ToolInvocation> {
        self.parts.iter_mut().find_map(|part| match part {
            Part::ToolCall(invocation) if invocation.call_id == call_id => Some(invocation),
            _ => None,
        })
    }
}

/// Append-only list of turns in arrival order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn position(&self, turn_id: &str) -> Option<usize> {
        self.turns.iter().position(|turn| turn.id == turn_id)
    }

    pub fn get(&self, turn_id: &str) -> Option<&Turn> {
        self.turns.iter().find(|turn| turn.id == turn_id)
    }

    pub(crate) fn get_mut(&mut self, turn_id: &str) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|turn| turn.id == turn_id)
    }

    pub(crate) fn at_mut(&mut self, index: usize) -> &mut Turn {
        &mut self.turns[index]
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub(crate) fn complete_all(&mut self) {
        for turn in &mut self.turns {
            turn.completed = true;
        }
    }
}
