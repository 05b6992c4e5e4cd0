use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use crate::errors::ToolError;
use crate::models::message::{Part, ToolInvocation, ToolState, Turn};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall, ToolRequest};
use crate::providers::base::Completion;

/// Convert the conversation into OpenAI's chat message specification.
///
/// An assistant turn interleaves text and tool calls, so it is split into
/// steps: every run of text followed by tool calls becomes one assistant
/// message carrying `tool_calls`, followed by one `tool` message per call.
pub fn turns_to_openai_spec(turns: &[Turn]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for turn in turns {
        match turn.role {
            Role::User => {
                let text = turn.text();
                if !text.is_empty() {
                    messages_spec.push(json!({"role": "user", "content": text}));
                }
            }
            Role::Assistant => {
                let mut text = String::new();
                let mut calls: Vec<&ToolInvocation> = Vec::new();
                for part in &turn.parts {
                    match part {
                        Part::Text { text: delta } => {
                            if !calls.is_empty() {
                                messages_spec.extend(assistant_step(&text, &calls));
                                text.clear();
                                calls.clear();
                            }
                            text.push_str(delta);
                        }
                        Part::ToolCall(invocation) => calls.push(invocation),
                    }
                }
                messages_spec.extend(assistant_step(&text, &calls));
            }
        }
    }

    messages_spec
}

fn assistant_step(text: &str, calls: &[&ToolInvocation]) -> Vec<Value> {
    if text.is_empty() && calls.is_empty() {
        return Vec::new();
    }

    let mut converted = json!({"role": "assistant"});
    if !text.is_empty() {
        converted["content"] = json!(text);
    }
    if !calls.is_empty() {
        converted["tool_calls"] = calls
            .iter()
            .map(|invocation| {
                json!({
                    "id": invocation.call_id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&invocation.tool_name),
                        "arguments": invocation.input.to_string(),
                    }
                })
            })
            .collect();
    }

    let mut output = vec![converted];
    for invocation in calls {
        let content = match &invocation.state {
            ToolState::Succeeded { output } => output.to_string(),
            // A tool error is shown as output so the model can interpret it
            ToolState::Failed { reason } => {
                format!("The tool call returned the following error:\n{}", reason)
            }
            ToolState::Pending => "The tool call did not complete.".to_string(),
        };
        output.push(json!({
            "role": "tool",
            "content": content,
            "tool_call_id": invocation.call_id
        }));
    }
    output
}

/// Convert tool definitions to OpenAI's tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert an OpenAI chat completion response into a [`Completion`]
pub fn openai_response_to_completion(response: &Value) -> Result<Completion> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("No message in response"))?;

    let text = original
        .get("content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let mut tool_requests = Vec::new();
    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let call = if !is_valid_function_name(&function_name) {
                Err(ToolError::ToolNotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                )))
            } else {
                serde_json::from_str::<Value>(arguments)
                    .map(|params| ToolCall::new(&function_name, params))
                    .map_err(|e| {
                        ToolError::InvalidParameters(format!(
                            "Could not interpret tool use parameters for id {}: {}",
                            id, e
                        ))
                    })
            };
            tool_requests.push(ToolRequest::new(id, call));
        }
    }

    Ok(Completion {
        text,
        tool_requests,
    })
}

fn sanitize_function_name(name: &str) -> String {
    Regex::new(r"[^a-zA-Z0-9_-]")
        .map(|re| re.replace_all(name, "_").into_owned())
        .unwrap_or_else(|_| name.to_string())
}

fn is_valid_function_name(name: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9_-]+$").is_ok_and(|re| re.is_match(name))
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
