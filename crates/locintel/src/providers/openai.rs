use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::base::{Completion, Provider, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, openai_response_to_completion, tools_to_openai_spec,
    turns_to_openai_spec,
};
use crate::models::message::Turn;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage") else {
            return Usage::default();
        };

        let count = |key: &str| usage.get(key).and_then(Value::as_i64).map(|v| v as i32);
        let input_tokens = count("prompt_tokens");
        let output_tokens = count("completion_tokens");
        let total_tokens = count("total_tokens").or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn payload(&self, system: &str, history: &[Turn], tools: &[Tool]) -> Result<Value> {
        let mut messages = vec![json!({"role": "system", "content": system})];
        messages.extend(turns_to_openai_spec(history));

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert("messages".to_string(), Value::Array(messages));
        if !tools.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temperature) = self.config.temperature {
            payload.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }
        Ok(Value::Object(payload))
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                // The body usually carries an OpenAI error object worth surfacing
                let body: Value = response.json().await.unwrap_or(Value::Null);
                match body.get("error") {
                    Some(error) => match check_openai_context_length_error(error) {
                        Some(err) => Err(err.into()),
                        None => Err(anyhow!("Request failed: {}: {}", status, error)),
                    },
                    None => Err(anyhow!("Request failed: {}", status)),
                }
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        history: &[Turn],
        tools: &[Tool],
    ) -> Result<(Completion, Usage)> {
        let payload = self.payload(system, history, tools)?;
        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let completion = openai_response_to_completion(&response)?;
        let usage = Self::get_usage(&response);
        tracing::debug!(
            model = %self.config.model,
            tool_calls = completion.tool_requests.len(),
            total_tokens = ?usage.total_tokens,
            "completion received"
        );

        Ok((completion, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(host: String) -> OpenAiProviderConfig {
        OpenAiProviderConfig {
            host,
            api_key: "test_api_key".to_string(),
            model: "gpt-5-mini".to_string(),
            temperature: Some(0.7),
            max_tokens: None,
        }
    }

    async fn setup_mock_server(response: ResponseTemplate) -> (MockServer, OpenAiProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test_api_key"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let provider = OpenAiProvider::new(config(mock_server.uri())).unwrap();
        (mock_server, provider)
    }

    fn geocode_tool() -> Tool {
        Tool::new(
            "geocode__search",
            "Find places matching a free-text query",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }),
        )
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! Where would you like to go?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let history = vec![Turn::user("u1").with_text("Hello?")];
        let (completion, usage) = provider
            .complete("You are a helpful assistant.", &history, &[])
            .await?;

        assert_eq!(
            completion.text.as_deref(),
            Some("Hello! Where would you like to go?")
        );
        assert!(completion.tool_requests.is_empty());
        assert_eq!(usage, Usage::new(Some(12), Some(15), Some(27)));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "geocode__search",
                            "arguments": "{\"query\":\"parks in Delhi\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 15}
        });
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(200).set_body_json(response_body)).await;

        let history = vec![Turn::user("u1").with_text("Find me a park")];
        let (completion, usage) = provider
            .complete("You are a helpful assistant.", &history, &[geocode_tool()])
            .await?;

        let call = completion.tool_requests[0].tool_call.as_ref().unwrap();
        assert_eq!(completion.tool_requests[0].id, "call_123");
        assert_eq!(call.name, "geocode__search");
        assert_eq!(call.arguments, json!({"query": "parks in Delhi"}));
        assert_eq!(usage.total_tokens, Some(35));
        Ok(())
    }

    #[tokio::test]
    async fn test_payload_carries_model_and_tools() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-5-mini",
                "tools": [{"type": "function", "function": {"name": "geocode__search"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        let provider = OpenAiProvider::new(config(mock_server.uri()))?;

        let history = vec![Turn::user("u1").with_text("Find me a park")];
        let (completion, _) = provider
            .complete("system", &history, &[geocode_tool()])
            .await?;

        assert_eq!(completion.text.as_deref(), Some("ok"));
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error() {
        let (_server, provider) = setup_mock_server(ResponseTemplate::new(503)).await;

        let history = vec![Turn::user("u1").with_text("Hello?")];
        let err = provider
            .complete("system", &history, &[])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Server error: 503"));
    }

    #[tokio::test]
    async fn test_context_length_error() {
        let body = json!({
            "error": {
                "code": "context_length_exceeded",
                "message": "This model's maximum context length is 128000 tokens"
            }
        });
        let (_server, provider) =
            setup_mock_server(ResponseTemplate::new(400).set_body_json(body)).await;

        let history = vec![Turn::user("u1").with_text("Hello?")];
        let err = provider
            .complete("system", &history, &[])
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Context length exceeded"));
    }
}
