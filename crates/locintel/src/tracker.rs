use serde_json::Value;
use std::collections::HashMap;

use crate::errors::TrackerError;
use crate::models::message::{ToolInvocation, ToolState, ToolStatus};

/// A tracked invocation and the turn that announced it
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub turn_id: String,
    pub invocation: ToolInvocation,
}

/// Matches every tool call to its eventual result.
///
/// Records only ever move from pending to a terminal state, once. Terminal
/// notifications for unknown or already settled calls are reported back as
/// [`TrackerError`] and leave the records untouched, so redelivered results are
/// harmless.
#[derive(Debug, Default)]
pub struct ToolTracker {
    records: HashMap<String, ToolRecord>,
}

impl ToolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a pending call
    pub fn register<T, C, N>(
        &mut self,
        turn_id: T,
        call_id: C,
        tool_name: N,
        input: Value,
    ) -> Result<&ToolRecord, TrackerError>
    where
        T: Into<String>,
        C: Into<String>,
        N: Into<String>,
    {
        let call_id = call_id.into();
        if self.records.contains_key(&call_id) {
            return Err(TrackerError::DuplicateCall(call_id));
        }

        let record = ToolRecord {
            turn_id: turn_id.into(),
            invocation: ToolInvocation::pending(call_id.clone(), tool_name, input),
        };
        Ok(self.records.entry(call_id).or_insert(record))
    }

    /// Mark a pending call as succeeded with its output
    pub fn resolve(&mut self, call_id: &str, output: Value) -> Result<&ToolRecord, TrackerError> {
        self.transition(call_id, ToolState::Succeeded { output })
    }

    /// Mark a pending call as failed with a reason
    pub fn fail<R: Into<String>>(
        &mut self,
        call_id: &str,
        reason: R,
    ) -> Result<&ToolRecord, TrackerError> {
        self.transition(
            call_id,
            ToolState::Failed {
                reason: reason.into(),
            },
        )
    }

    /// Apply either terminal outcome
    pub fn complete(
        &mut self,
        call_id: &str,
        result: Result<Value, String>,
    ) -> Result<&ToolRecord, TrackerError> {
        self.transition(call_id, ToolState::from(result))
    }

    fn transition(&mut self, call_id: &str, state: ToolState) -> Result<&ToolRecord, TrackerError> {
        let record = self
            .records
            .get_mut(call_id)
            .ok_or_else(|| TrackerError::UnknownCall(call_id.to_string()))?;

        if record.invocation.status().is_terminal() {
            return Err(TrackerError::AlreadyTerminal(call_id.to_string()));
        }

        record.invocation.state = state;
        Ok(record)
    }

    pub fn get(&self, call_id: &str) -> Option<&ToolRecord> {
        self.records.get(call_id)
    }

    pub fn status(&self, call_id: &str) -> Option<ToolStatus> {
        self.get(call_id).map(|record| record.invocation.status())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Calls still waiting for a result
    pub fn pending(&self) -> impl Iterator<Item = &ToolRecord> {
        self.records
            .values()
            .filter(|record| !record.invocation.status().is_terminal())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// True when every tracked call has reached a terminal state
    pub fn is_settled(&self) -> bool {
        self.pending_count() == 0
    }
}
