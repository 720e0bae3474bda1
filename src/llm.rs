//! Chat-completions client with tool calling.
//!
//! Speaks the OpenAI-compatible wire format, so a local Ollama-compatible
//! endpoint works by pointing `base_url` at it. Unlike tool failures, any
//! failure here (transport, auth, quota, empty reply) is fatal to the run.

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::tools::ToolDefinition;

/// One message in the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Tool result message, tied back to the call that produced it.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_call_id: Some(call_id.into()),
            ..Default::default()
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as the wire format delivers them.
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSchema<'a>>,
}

#[derive(Serialize)]
struct ToolSchema<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Completion collaborator seam; tests drive the loop with a scripted one.
#[allow(async_fn_in_trait)]
pub trait Completer {
    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage>;
}

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

impl Completer for OpenAiClient {
    async fn complete(
        &mut self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools: tools
                .iter()
                .map(|t| ToolSchema {
                    kind: "function",
                    function: t,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, text));
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow!("LLM response contained no choices"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_tool_call_reply() {
        let raw = r##"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc123",
                        "type": "function",
                        "function": {
                            "name": "check_color_contrast",
                            "arguments": "{\"foreground\":\"#777777\",\"background\":\"#ffffff\"}"
                        }
                    }]
                }
            }]
        }"##;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        let message = &response.choices[0].message;
        assert_eq!(message.role, "assistant");
        assert!(message.content.is_none());
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_abc123");
        assert_eq!(calls[0].function.name, "check_color_contrast");
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let serialized = serde_json::to_string(&ChatMessage::user("hello")).unwrap();
        assert!(!serialized.contains("tool_calls"));
        assert!(!serialized.contains("tool_call_id"));

        let tool = serde_json::to_string(&ChatMessage::tool("call_1", "{}")).unwrap();
        assert!(tool.contains("\"tool_call_id\":\"call_1\""));
    }

    #[test]
    fn test_tool_call_type_defaults_to_function() {
        let raw = r#"{"id": "call_1", "function": {"name": "get_accessibility_rules", "arguments": "{}"}}"#;
        let call: ToolCallRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(call.kind, "function");
    }
}
