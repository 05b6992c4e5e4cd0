use futures::stream::{BoxStream, FuturesUnordered};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::{ToolError, ToolResult};
use crate::models::event::StreamEvent;
use crate::models::message::{Part, ToolInvocation, ToolState, Turn};
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::{load_prompt, SYSTEM_PROMPT};
use crate::providers::base::Provider;
use crate::systems::System;

pub const DEFAULT_MAX_STEPS: usize = 5;

// Recorded for a request whose tool call could not be decoded
const INVALID_TOOL_NAME: &str = "invalid_tool_call";

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// Agent integrates a chat-completion provider with the systems it can operate.
///
/// It only produces [`StreamEvent`]s; folding them into state is up to the
/// consumer of [`Agent::reply`].
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
    max_steps: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Bound the number of provider round trips in one reply
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// Get all tools from all systems with proper system prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for system in &self.systems {
            for tool in system.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", system.name(), tool.name),
                    &tool.description,
                    tool.input_schema.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate system for a tool call based on the prefixed name
    fn get_system_for_tool(&self, prefixed_name: &str) -> Option<&dyn System> {
        let (system_name, _) = prefixed_name.split_once("__")?;
        self.systems
            .iter()
            .find(|sys| sys.name() == system_name)
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(&self, tool_call: ToolResult<ToolCall>) -> ToolResult<Value> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| ToolError::ToolNotFound(call.name.clone()))?;

        let tool_name = call
            .name
            .split_once("__")
            .map(|(_, tool)| tool)
            .ok_or_else(|| ToolError::ToolNotFound(call.name.clone()))?;
        let system_tool_call = ToolCall::new(tool_name, call.arguments);

        system.call(system_tool_call).await
    }

    fn get_system_prompt(&self) -> String {
        let systems: Vec<SystemInfo> = self
            .systems
            .iter()
            .map(|system| {
                SystemInfo::new(system.name(), system.description(), system.instructions())
            })
            .collect();

        load_prompt(SYSTEM_PROMPT, &json!({ "systems": systems })).unwrap_or_else(|err| {
            tracing::error!(error = %err, "could not render system prompt");
            "You are a helpful assistant.".to_string()
        })
    }

    /// Stream the reply to the conversation so far as events for one new
    /// assistant turn.
    ///
    /// Text arrives as `TextDelta`. Every tool call the model asks for is
    /// announced with `ToolCallStart`, all calls of a step run concurrently and
    /// each `ToolCallEnd` is emitted as soon as its call finishes. The loop
    /// stops once the model answers without tool calls or the step limit is
    /// reached. A provider failure ends the reply with a final text fragment.
    pub fn reply(&self, history: &[Turn]) -> BoxStream<'_, StreamEvent> {
        let history = history.to_vec();
        let tools = self.get_prefixed_tools();
        let system_prompt = self.get_system_prompt();
        let turn_id = Uuid::new_v4().to_string();

        Box::pin(async_stream::stream! {
            // The reply so far, so later steps see earlier tool results
            let mut working = Turn::assistant(turn_id.clone());

            for step in 0..self.max_steps {
                let mut context = history.clone();
                context.push(working.clone());

                let completion = match self.provider.complete(&system_prompt, &context, &tools).await {
                    Ok((completion, _usage)) => completion,
                    Err(err) => {
                        tracing::error!(error = %err, step, "provider request failed");
                        yield StreamEvent::text_delta(
                            turn_id.clone(),
                            format!("\n\nSorry, I could not complete that request: {}", err),
                        );
                        break;
                    }
                };

                if let Some(text) = completion.text {
                    working.push_text(&text);
                    yield StreamEvent::text_delta(turn_id.clone(), text);
                }

                if completion.tool_requests.is_empty() {
                    break;
                }

                let mut running = FuturesUnordered::new();
                for request in completion.tool_requests {
                    let (tool_name, input) = match &request.tool_call {
                        Ok(call) => (call.name.clone(), call.arguments.clone()),
                        Err(_) => (INVALID_TOOL_NAME.to_string(), Value::Null),
                    };
                    working.parts.push(Part::ToolCall(ToolInvocation::pending(
                        request.id.clone(),
                        tool_name.clone(),
                        input.clone(),
                    )));
                    yield StreamEvent::tool_call_start(turn_id.clone(), request.id.clone(), tool_name, input);

                    let call_id = request.id;
                    let tool_call = request.tool_call;
                    running.push(async move {
                        let result = self.dispatch_tool_call(tool_call).await;
                        (call_id, result)
                    });
                }

                while let Some((call_id, result)) = running.next().await {
                    let result = result.map_err(|err| err.reason());
                    if let Some(invocation) = working.tool_call_mut(&call_id) {
                        invocation.state = ToolState::from(result.clone());
                    }
                    yield StreamEvent::ToolCallEnd { call_id, result };
                }

                if step + 1 == self.max_steps {
                    tracing::warn!(max_steps = self.max_steps, "reply stopped at the step limit");
                }
            }
        })
    }
}
