use futures::{Stream, StreamExt};

use crate::aggregator::FeatureAggregator;
use crate::models::event::StreamEvent;
use crate::models::geo::{FeatureCollection, GeocodeResponse};
use crate::models::message::{Conversation, ToolInvocation, ToolState};
use crate::overlay::{MapSurface, OverlayChange, OverlayConfig, OverlaySynchronizer, OverlayState};
use crate::reducer::{Applied, MessageReducer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Streaming,
}

/// The single reactive loop behind the chat and the map.
///
/// A submission opens a new epoch and clears the overlay. The reply stream is
/// applied with the epoch it was started in: its events are always folded into
/// the conversation, but its tool calls only count toward the overlay while
/// that epoch is still the active one.
pub struct Session {
    reducer: MessageReducer,
    aggregator: FeatureAggregator,
    overlay: OverlaySynchronizer,
    phase: Phase,
}

impl Session {
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            reducer: MessageReducer::new(),
            aggregator: FeatureAggregator::new(),
            overlay: OverlaySynchronizer::new(config),
            phase: Phase::Idle,
        }
    }

    pub fn with_surface(mut self, surface: Box<dyn MapSurface>) -> Self {
        self.overlay = self.overlay.with_surface(surface);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        self.reducer.conversation()
    }

    pub fn overlay(&self) -> &OverlayState {
        self.overlay.state()
    }

    pub fn features(&self) -> &FeatureCollection {
        self.overlay.features()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.aggregator.epoch()
    }

    /// Start answering a new user message. Returns the epoch the reply
    /// stream has to be applied with.
    ///
    /// Anything still outstanding from an earlier submission is superseded:
    /// its results can update its own turn but never the overlay.
    pub fn submit<S: Into<String>>(&mut self, text: S) -> u64 {
        if self.phase == Phase::Streaming {
            tracing::debug!(epoch = self.aggregator.epoch(), "superseding unfinished query");
        }
        let epoch = self.aggregator.begin_query();
        self.overlay.clear();
        self.phase = Phase::Streaming;
        self.reducer.push_user_turn(text);
        epoch
    }

    /// Apply one event of the reply stream started in `epoch`. Returns the
    /// overlay change it caused, if any.
    pub fn apply(&mut self, epoch: u64, event: StreamEvent) -> Option<OverlayChange> {
        match self.reducer.apply(event) {
            Ok(Applied::Text { .. }) => None,
            Ok(Applied::ToolCallStarted { turn_id, call_id }) => {
                if epoch == self.aggregator.epoch() {
                    self.aggregator.register_call(call_id);
                } else {
                    tracing::debug!(
                        %turn_id,
                        %call_id,
                        epoch,
                        "tool call from a superseded query"
                    );
                }
                None
            }
            Ok(Applied::ToolCallEnded { invocation, .. }) => self.aggregate(&invocation),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring inconsistent stream event");
                None
            }
        }
    }

    /// The stream completed
    pub fn finish(&mut self) {
        self.reducer.finish();
        self.phase = Phase::Idle;
    }

    /// Consume a whole reply stream started in `epoch`, then finish it
    pub async fn run<S>(&mut self, epoch: u64, events: S)
    where
        S: Stream<Item = StreamEvent>,
    {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            self.apply(epoch, event);
        }
        self.finish();
    }

    /// Clear the overlay. The conversation is untouched.
    pub fn clear_results(&mut self) {
        self.overlay.clear();
    }

    /// True once the stream finished and every tool call of the current
    /// submission reached a terminal state
    pub fn is_settled(&self) -> bool {
        self.phase == Phase::Idle
            && self
                .reducer
                .tracker()
                .pending()
                .all(|record| !self.aggregator.is_active(&record.invocation.call_id))
    }

    fn aggregate(&mut self, invocation: &ToolInvocation) -> Option<OverlayChange> {
        let response = match &invocation.state {
            ToolState::Succeeded { output } => {
                match serde_json::from_value::<GeocodeResponse>(output.clone()) {
                    Ok(response) => response,
                    Err(err) => {
                        tracing::debug!(
                            call_id = %invocation.call_id,
                            error = %err,
                            "tool output is not a geocode response"
                        );
                        return None;
                    }
                }
            }
            ToolState::Failed { reason } => GeocodeResponse::failure(reason.clone()),
            ToolState::Pending => return None,
        };

        let merged = self
            .aggregator
            .add_tool_result(&invocation.call_id, &response)?;
        Some(self.overlay.sync(merged))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(OverlayConfig::default())
    }
}
