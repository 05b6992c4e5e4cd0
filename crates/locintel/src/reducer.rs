use uuid::Uuid;

use crate::errors::{StreamError, TrackerError};
use crate::models::event::StreamEvent;
use crate::models::message::{Conversation, Part, ToolInvocation, Turn};
use crate::tracker::ToolTracker;

/// What a successfully applied event changed
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Text {
        turn_id: String,
    },
    ToolCallStarted {
        turn_id: String,
        call_id: String,
    },
    ToolCallEnded {
        turn_id: String,
        invocation: ToolInvocation,
    },
}

/// Folds stream events into the conversation.
///
/// Parts of a turn only ever append or advance their status, so every snapshot
/// is a prefix-extension of the previous one. Once the stream finishes, every
/// turn is frozen and events are refused until the next user submission opens
/// a new stream.
#[derive(Debug, Default)]
pub struct MessageReducer {
    conversation: Conversation,
    tracker: ToolTracker,
    finished: bool,
}

impl MessageReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tracker(&self) -> &ToolTracker {
        &self.tracker
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Commit a user submission and open the reducer for the reply stream.
    ///
    /// Returns the id of the new user turn.
    pub fn push_user_turn<S: Into<String>>(&mut self, text: S) -> String {
        let id = Uuid::new_v4().to_string();
        self.conversation
            .push(Turn::user(id.clone()).with_text(text).completed());
        self.finished = false;
        id
    }

    /// Apply one event, returning what changed or why it was refused
    pub fn apply(&mut self, event: StreamEvent) -> Result<Applied, StreamError> {
        if self.finished {
            return Err(StreamError::Finished);
        }

        match event {
            StreamEvent::TextDelta { turn_id, text } => {
                self.ensure_open(&turn_id)?;
                self.open_turn(&turn_id).push_text(&text);
                Ok(Applied::Text { turn_id })
            }
            StreamEvent::ToolCallStart {
                turn_id,
                call_id,
                tool_name,
                input,
            } => {
                self.ensure_open(&turn_id)?;
                let invocation = self
                    .tracker
                    .register(turn_id.clone(), call_id.clone(), tool_name, input)?
                    .invocation
                    .clone();
                self.open_turn(&turn_id)
                    .parts
                    .push(Part::ToolCall(invocation));
                Ok(Applied::ToolCallStarted { turn_id, call_id })
            }
            StreamEvent::ToolCallEnd { call_id, result } => {
                // The tracker only knows calls announced inside a turn, so an unknown
                // call id here can never resurrect a part somewhere else.
                let turn_id = self
                    .tracker
                    .get(&call_id)
                    .map(|record| record.turn_id.clone())
                    .ok_or_else(|| TrackerError::UnknownCall(call_id.clone()))?;
                self.ensure_open(&turn_id)?;

                let invocation = self.tracker.complete(&call_id, result)?.invocation.clone();
                if let Some(part) = self
                    .conversation
                    .get_mut(&turn_id)
                    .and_then(|turn| turn.tool_call_mut(&call_id))
                {
                    *part = invocation.clone();
                }
                Ok(Applied::ToolCallEnded {
                    turn_id,
                    invocation,
                })
            }
        }
    }

    /// The stream completed: freeze every turn and refuse further events
    pub fn finish(&mut self) {
        self.conversation.complete_all();
        self.finished = true;
    }

    fn ensure_open(&self, turn_id: &str) -> Result<(), StreamError> {
        match self.conversation.get(turn_id) {
            Some(turn) if turn.completed => Err(StreamError::TurnCompleted(turn_id.to_string())),
            _ => Ok(()),
        }
    }

    /// The named turn, created as an assistant turn when it is new
    fn open_turn(&mut self, turn_id: &str) -> &mut Turn {
        let index = match self.conversation.position(turn_id) {
            Some(index) => index,
            None => {
                self.conversation.push(Turn::assistant(turn_id));
                self.conversation.len() - 1
            }
        };
        self.conversation.at_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::ToolStatus;
    use crate::models::role::Role;
    use serde_json::json;

    fn reducer_with_submission() -> MessageReducer {
        let mut reducer = MessageReducer::new();
        reducer.push_user_turn("find me a park");
        reducer
    }

    #[test]
    fn test_text_deltas_concatenate_in_order() {
        let mut reducer = reducer_with_submission();
        for fragment in ["Here ", "are ", "some ", "parks."] {
            reducer
                .apply(StreamEvent::text_delta("a1", fragment))
                .unwrap();
        }

        let conversation = reducer.conversation();
        assert_eq!(conversation.len(), 2);
        let turn = conversation.get("a1").unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.parts, vec![Part::text("Here are some parks.")]);
    }

    #[test]
    fn test_tool_call_lifecycle_updates_part_in_place() {
        let mut reducer = reducer_with_submission();
        reducer
            .apply(StreamEvent::text_delta("a1", "Searching."))
            .unwrap();
        reducer
            .apply(StreamEvent::tool_call_start(
                "a1",
                "c1",
                "geocode__search",
                json!({"query": "park"}),
            ))
            .unwrap();
        reducer
            .apply(StreamEvent::text_delta("a1", "One moment."))
            .unwrap();

        let applied = reducer
            .apply(StreamEvent::tool_succeeded("c1", json!({"success": true})))
            .unwrap();

        match applied {
            Applied::ToolCallEnded {
                turn_id,
                invocation,
            } => {
                assert_eq!(turn_id, "a1");
                assert_eq!(invocation.status(), ToolStatus::Succeeded);
            }
            other => panic!("unexpected {:?}", other),
        }

        let turn = reducer.conversation().get("a1").unwrap();
        assert_eq!(turn.parts.len(), 3);
        assert_eq!(turn.parts[0], Part::text("Searching."));
        assert_eq!(
            turn.parts[1].as_tool_call().unwrap().status(),
            ToolStatus::Succeeded
        );
        assert_eq!(turn.parts[2], Part::text("One moment."));
    }

    #[test]
    fn test_duplicate_tool_call_start_is_refused() {
        let mut reducer = reducer_with_submission();
        reducer
            .apply(StreamEvent::tool_call_start("a1", "c1", "geocode__search", json!({})))
            .unwrap();
        let result =
            reducer.apply(StreamEvent::tool_call_start("a1", "c1", "geocode__search", json!({})));

        assert_eq!(
            result.unwrap_err(),
            StreamError::Tracker(TrackerError::DuplicateCall("c1".into()))
        );
        assert_eq!(reducer.conversation().get("a1").unwrap().parts.len(), 1);
    }

    #[test]
    fn test_unknown_tool_result_is_ignored() {
        let mut reducer = reducer_with_submission();
        reducer
            .apply(StreamEvent::text_delta("a1", "Hi"))
            .unwrap();
        let before = reducer.conversation().clone();

        let result = reducer.apply(StreamEvent::tool_succeeded("ghost", json!({})));

        assert!(matches!(
            result,
            Err(StreamError::Tracker(TrackerError::UnknownCall(_)))
        ));
        assert_eq!(reducer.conversation(), &before);
    }

    #[test]
    fn test_redelivered_result_keeps_first_outcome() {
        let mut reducer = reducer_with_submission();
        reducer
            .apply(StreamEvent::tool_call_start("a1", "c1", "geocode__search", json!({})))
            .unwrap();
        reducer
            .apply(StreamEvent::tool_failed("c1", "Nominatim API error: 503"))
            .unwrap();

        let result = reducer.apply(StreamEvent::tool_succeeded("c1", json!({})));

        assert!(result.is_err());
        let invocation = reducer
            .conversation()
            .get("a1")
            .unwrap()
            .tool_call("c1")
            .unwrap()
            .clone();
        assert_eq!(invocation.error_reason(), Some("Nominatim API error: 503"));
    }

    #[test]
    fn test_text_for_user_turn_is_refused() {
        let mut reducer = MessageReducer::new();
        let user_turn = reducer.push_user_turn("hello");

        let result = reducer.apply(StreamEvent::text_delta(user_turn.clone(), "injected"));

        assert_eq!(result.unwrap_err(), StreamError::TurnCompleted(user_turn));
    }

    #[test]
    fn test_finish_freezes_conversation() {
        let mut reducer = reducer_with_submission();
        reducer
            .apply(StreamEvent::tool_call_start("a1", "c1", "geocode__search", json!({})))
            .unwrap();
        reducer.finish();

        assert_eq!(
            reducer
                .apply(StreamEvent::tool_succeeded("c1", json!({})))
                .unwrap_err(),
            StreamError::Finished
        );
        assert!(reducer.conversation().turns().iter().all(|t| t.completed));

        // A new submission reopens the stream, but the frozen turn stays frozen
        reducer.push_user_turn("find cafes");
        assert_eq!(
            reducer
                .apply(StreamEvent::tool_succeeded("c1", json!({})))
                .unwrap_err(),
            StreamError::TurnCompleted("a1".into())
        );
        assert_eq!(reducer.tracker().status("c1"), Some(ToolStatus::Pending));
    }

    #[test]
    fn test_turn_order_is_arrival_order() {
        let mut reducer = reducer_with_submission();
        reducer.apply(StreamEvent::text_delta("a1", "first")).unwrap();
        reducer.apply(StreamEvent::text_delta("a2", "second")).unwrap();
        reducer.apply(StreamEvent::text_delta("a1", " again")).unwrap();

        let ids: Vec<_> = reducer
            .conversation()
            .turns()
            .iter()
            .skip(1)
            .map(|turn| turn.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(reducer.conversation().get("a1").unwrap().text(), "first again");
    }
}
