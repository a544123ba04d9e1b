//! The agent reasoning loop implementation.

use chrono::Utc;
use filvyn_core::event::{DomainEvent, EventBus};
use filvyn_core::message::{Conversation, Message};
use filvyn_core::provider::{Provider, ProviderRequest};
use filvyn_core::tool::{ToolCall, ToolOutput, ToolRegistry};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::parser::parse_tool_calls;
use crate::prompt::system_prompt;

/// Default cap on model calls per user message.
pub const DEFAULT_MAX_TURNS: u32 = 16;

/// How a conversation turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model called `complete`.
    Completed,
    /// The model answered without any tool call. Nothing was sent to the user.
    NoToolCalls,
}

/// Drives one user message to completion: model call, tool dispatch,
/// results back into the history, repeat.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tools available for this conversation
    tools: Arc<ToolRegistry>,

    /// Name the assistant introduces itself with
    name: String,

    /// Maximum model calls per turn
    max_turns: u32,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            name: "Filvyn".into(),
            max_turns: DEFAULT_MAX_TURNS,
            event_bus,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max.max(1);
        self
    }

    /// Run the conversation until the model calls `complete`, stops calling
    /// tools, or the turn limit is hit.
    ///
    /// The conversation's first message is kept as the current system
    /// prompt. Every model reply and every tool result is appended, so the
    /// history reflects exactly what the model saw.
    pub async fn chat(&self, conversation: &mut Conversation) -> filvyn_core::Result<TurnOutcome> {
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            "Processing conversation"
        );

        let definitions = self.tools.definitions();

        for turn in 1..=self.max_turns {
            debug!(conversation_id = %conversation.id, turn, "Agent loop iteration");

            conversation.set_system_prompt(system_prompt(&self.name, &definitions, Utc::now()));

            let mut request = ProviderRequest::new(self.model.clone(), conversation.messages.clone());
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;

            let start = Instant::now();
            let response = self.provider.complete(request).await?;
            let duration_ms = start.elapsed().as_millis() as u64;
            debug!(model = %response.model, duration_ms, "Model responded");

            self.event_bus.publish(DomainEvent::ResponseGenerated {
                conversation_id: conversation.id.to_string(),
                model: response.model.clone(),
                duration_ms,
                timestamp: Utc::now(),
            });

            let calls = parse_tool_calls(&response.content);
            conversation.push(Message::assistant(response.content));

            if calls.is_empty() {
                info!(conversation_id = %conversation.id, turn, "Model stopped without tool calls");
                self.finished(conversation, turn, false);
                return Ok(TurnOutcome::NoToolCalls);
            }

            let results = join_all(calls.iter().map(|call| self.execute(call))).await;

            for (call, result) in calls.iter().zip(results) {
                match result {
                    None => continue,
                    Some(ToolOutput::Complete) => {
                        info!(conversation_id = %conversation.id, turn, "Task complete");
                        self.finished(conversation, turn, true);
                        return Ok(TurnOutcome::Completed);
                    }
                    Some(ToolOutput::Text(text)) => {
                        conversation.push(Message::system(format!(
                            "Tool result from {}: {}",
                            call.name,
                            serde_json::Value::String(text)
                        )));
                    }
                }
            }
        }

        warn!(
            conversation_id = %conversation.id,
            max_turns = self.max_turns,
            "Turn limit reached without completion"
        );
        self.finished(conversation, self.max_turns, false);
        Err(filvyn_core::Error::TurnLimitExceeded { max_turns: self.max_turns })
    }

    fn finished(&self, conversation: &Conversation, iterations: u32, completed: bool) {
        self.event_bus.publish(DomainEvent::TurnFinished {
            conversation_id: conversation.id.to_string(),
            iterations,
            completed,
            timestamp: Utc::now(),
        });
    }

    /// Run one call. Unknown tools yield `None`; failures become an
    /// `Error: ...` result the model can react to.
    async fn execute(&self, call: &ToolCall) -> Option<ToolOutput> {
        if self.tools.get(&call.name).is_none() {
            debug!(tool = %call.name, "Skipping call to unknown tool");
            return None;
        }

        let start = Instant::now();
        let result = self.tools.execute(call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match result {
            Ok(output) => {
                debug!(tool = %call.name, duration_ms, "Tool executed");
                Some(output)
            }
            Err(e) => {
                warn!(tool = %call.name, duration_ms, error = %e, "Tool execution failed");
                Some(ToolOutput::Text(format!("Error: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, invoke};
    use async_trait::async_trait;
    use filvyn_core::error::{ProviderError, ToolError};
    use filvyn_core::message::Role;
    use filvyn_core::tool::{Tool, ToolParams};
    use std::sync::Mutex;

    /// Records every message it is asked to echo.
    #[derive(Default)]
    struct EchoTool {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(&self, params: ToolParams) -> Result<ToolOutput, ToolError> {
            let text = params.require_text("text")?;
            self.seen.lock().unwrap().push(text.to_string());
            Ok(ToolOutput::text(format!("echo: {text}")))
        }
    }

    fn agent(provider: Arc<ScriptedProvider>) -> (AgentLoop, Arc<Mutex<Vec<String>>>) {
        let echo = EchoTool::default();
        let seen = echo.seen.clone();
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(echo));
        let agent = AgentLoop::new(provider, "mock-model", Arc::new(tools), Arc::new(EventBus::default()));
        (agent, seen)
    }

    fn conversation(text: &str) -> Conversation {
        let mut conv = Conversation::new();
        conv.push(Message::user(text));
        conv
    }

    #[tokio::test]
    async fn plain_text_reply_ends_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec!["Hello! How can I help?"]));
        let (agent, _) = agent(provider.clone());
        let mut conv = conversation("Hello!");

        let outcome = agent.chat(&mut conv).await.unwrap();
        assert_eq!(outcome, TurnOutcome::NoToolCalls);
        // System + User + Assistant
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages[0].role, Role::System);
        assert!(conv.messages[0].content.contains("- echo: Echoes back the input"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_then_complete() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            invoke("echo", &[("text", "hi \"there\"")]),
            invoke("complete", &[]),
        ]));
        let (agent, echo) = agent(provider.clone());
        let mut conv = conversation("say hi");

        let outcome = agent.chat(&mut conv).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(*echo.lock().unwrap(), vec!["hi \"there\"".to_string()]);

        // system, user, assistant(echo), tool result, assistant(complete)
        assert_eq!(conv.len(), 5);
        assert_eq!(conv.messages[3].role, Role::System);
        assert_eq!(conv.messages[3].content, r#"Tool result from echo: "echo: hi \"there\"""#);
        // The model saw the tool result on its second call
        let second = &provider.requests()[1];
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[3].content, conv.messages[3].content);
    }

    #[tokio::test]
    async fn self_closing_complete_ends_turn() {
        let response = format!("{}<invoke name=\"complete\"/>", invoke("echo", &[("text", "done")]));
        let provider = Arc::new(ScriptedProvider::new(vec![response]));
        let (agent, echo) = agent(provider.clone());
        let mut conv = conversation("go");

        assert_eq!(agent.chat(&mut conv).await.unwrap(), TurnOutcome::Completed);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(*echo.lock().unwrap(), vec!["done".to_string()]);
    }

    #[tokio::test]
    async fn complete_short_circuits_later_results() {
        let response = format!(
            "{}{}{}",
            invoke("echo", &[("text", "before")]),
            invoke("complete", &[]),
            invoke("echo", &[("text", "after")]),
        );
        let provider = Arc::new(ScriptedProvider::new(vec![response]));
        let (agent, echo) = agent(provider.clone());
        let mut conv = conversation("go");

        assert_eq!(agent.chat(&mut conv).await.unwrap(), TurnOutcome::Completed);
        assert_eq!(provider.call_count(), 1);
        // Both echoes ran concurrently, but only the one before `complete` is recorded
        assert_eq!(echo.lock().unwrap().len(), 2);
        let results: Vec<_> = conv
            .messages
            .iter()
            .filter(|m| m.content.starts_with("Tool result from"))
            .collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("before"));
    }

    #[tokio::test]
    async fn unknown_tools_are_skipped() {
        let response = format!(
            "{}{}",
            invoke("launchRocket", &[("fuel", "lots")]),
            invoke("echo", &[("text", "still here")])
        );
        let provider = Arc::new(ScriptedProvider::new(vec![response, invoke("complete", &[])]));
        let (agent, _) = agent(provider);
        let mut conv = conversation("go");

        assert_eq!(agent.chat(&mut conv).await.unwrap(), TurnOutcome::Completed);
        let results: Vec<_> = conv
            .messages
            .iter()
            .filter(|m| m.content.starts_with("Tool result from"))
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(results, vec![r#"Tool result from echo: "echo: still here""#]);
    }

    #[tokio::test]
    async fn tool_errors_become_results() {
        let provider = Arc::new(ScriptedProvider::new(vec![invoke("echo", &[]), invoke("complete", &[])]));
        let (agent, _) = agent(provider);
        let mut conv = conversation("go");

        assert_eq!(agent.chat(&mut conv).await.unwrap(), TurnOutcome::Completed);
        assert!(conv.messages[3].content.starts_with("Tool result from echo: \"Error: "));
        assert!(conv.messages[3].content.contains("Missing 'text' argument"));
    }

    #[tokio::test]
    async fn turn_limit_is_an_error() {
        let responses: Vec<String> = (0..3).map(|i| invoke("echo", &[("text", &i.to_string())])).collect();
        let provider = Arc::new(ScriptedProvider::new(responses));
        let (agent, _) = agent(provider.clone());
        let agent = agent.with_max_turns(3);
        let mut conv = conversation("loop forever");

        let err = agent.chat(&mut conv).await.unwrap_err();
        assert!(matches!(err, filvyn_core::Error::TurnLimitExceeded { max_turns: 3 }));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn provider_failure_aborts_turn() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::RateLimited { retry_after_secs: 5 }));
        let (agent, _) = agent(provider);
        let mut conv = conversation("hi");

        let err = agent.chat(&mut conv).await.unwrap_err();
        assert!(matches!(err, filvyn_core::Error::Provider(ProviderError::RateLimited { .. })));
        // System prompt added, nothing else
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn system_prompt_is_replaced_not_duplicated() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            invoke("echo", &[("text", "a")]),
            invoke("complete", &[]),
        ]));
        let (agent, _) = agent(provider);
        let mut conv = Conversation::new();
        conv.set_system_prompt("stale prompt");
        conv.push(Message::user("go"));

        agent.chat(&mut conv).await.unwrap();
        let systems_with_persona = conv
            .messages
            .iter()
            .filter(|m| m.content.starts_with("You are Filvyn"))
            .count();
        assert_eq!(systems_with_persona, 1);
        assert!(conv.messages[0].content.starts_with("You are Filvyn"));
    }

    #[tokio::test]
    async fn events_are_published() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::new(vec![
            format!("{}{}", invoke("echo", &[("text", "x")]), invoke("complete", &[])),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoTool::default()));
        let agent = AgentLoop::new(provider, "mock-model", Arc::new(tools), bus);

        agent.chat(&mut conversation("go")).await.unwrap();

        let mut tool_events = Vec::new();
        let mut responses = 0;
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event.as_ref() {
                DomainEvent::ResponseGenerated { model, .. } => {
                    assert_eq!(model, "mock-model");
                    responses += 1;
                }
                DomainEvent::ToolExecuted { tool_name, success, .. } => {
                    tool_events.push((tool_name.clone(), *success));
                }
                DomainEvent::TurnFinished { iterations, completed, .. } => {
                    finished = Some((*iterations, *completed));
                }
                _ => {}
            }
        }
        assert_eq!(responses, 1);
        assert_eq!(finished, Some((1, true)));
        tool_events.sort();
        assert_eq!(tool_events, vec![("complete".to_string(), true), ("echo".to_string(), true)]);
    }
}
