//! The bounded tool-calling loop between the LLM and the tool invoker.
//!
//! Each step asks for a completion over the full transcript, executes any
//! tool calls the model issued (in order, one result message per call id),
//! and loops until the model answers without tool calls or the iteration
//! budget runs out. The transcript is append-only and stays on the loop
//! value, so it remains readable for diagnostics after an LLM failure.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{ChatMessage, Completer, ToolCallRequest};
use crate::tools::{ToolDefinition, ToolError, ToolExecutor};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model produced a final answer with no further tool requests.
    Completed { final_text: String },
    /// The iteration budget ran out before a final answer arrived.
    Exhausted,
}

pub struct ConversationLoop {
    transcript: Vec<ChatMessage>,
    tools: Vec<ToolDefinition>,
    max_iterations: usize,
    tool_call_rounds: usize,
}

impl ConversationLoop {
    pub fn new(
        system_prompt: &str,
        user_prompt: &str,
        tools: Vec<ToolDefinition>,
        max_iterations: usize,
    ) -> Self {
        Self {
            transcript: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_prompt),
            ],
            tools,
            max_iterations,
            tool_call_rounds: 0,
        }
    }

    /// Drive the exchange to one of the terminal states.
    ///
    /// An `Err` here means the LLM collaborator itself failed; tool
    /// failures never surface as errors, they become tool results.
    pub async fn run<C, T>(&mut self, completer: &mut C, tools: &mut T) -> Result<Outcome>
    where
        C: Completer,
        T: ToolExecutor,
    {
        for iteration in 1..=self.max_iterations {
            debug!(iteration, turns = self.transcript.len(), "requesting completion");
            let reply = completer.complete(&self.transcript, &self.tools).await?;
            let calls = reply.tool_calls.clone().unwrap_or_default();
            self.transcript.push(reply);

            if calls.is_empty() {
                let final_text = self
                    .transcript
                    .last()
                    .and_then(|m| m.content.clone())
                    .unwrap_or_default();
                return Ok(Outcome::Completed { final_text });
            }

            self.tool_call_rounds += 1;
            for call in &calls {
                let payload = Self::dispatch(tools, call).await;
                self.transcript
                    .push(ChatMessage::tool(&call.id, payload.to_string()));
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "iteration budget exhausted without a final answer"
        );
        Ok(Outcome::Exhausted)
    }

    async fn dispatch<T: ToolExecutor>(tools: &mut T, call: &ToolCallRequest) -> Value {
        let arguments: Value = match serde_json::from_str(&call.function.arguments) {
            Ok(v) => v,
            Err(e) => {
                return ToolError::new(format!("invalid tool arguments: {}", e)).into_value()
            }
        };

        debug!(tool = %call.function.name, "executing tool call");
        match tools.execute(&call.function.name, &arguments).await {
            Ok(value) => value,
            Err(e) => {
                warn!(tool = %call.function.name, "tool call failed: {}", e.error);
                e.into_value()
            }
        }
    }

    /// Full transcript so far, including after an aborted run.
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Number of assistant turns that requested at least one tool call.
    pub fn tool_call_rounds(&self) -> usize {
        self.tool_call_rounds
    }
}
