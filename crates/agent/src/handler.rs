//! Front-end entry points: one call per inbound chat event.
//!
//! The handler owns every user's conversation history. Messages from the
//! same user are processed one at a time; different users run in parallel.

use chrono::Utc;
use filvyn_config::{AgentConfig, AppConfig};
use filvyn_core::channel::{InboundMessage, Replier};
use filvyn_core::event::{DomainEvent, EventBus};
use filvyn_core::message::{Conversation, Message};
use filvyn_core::provider::Provider;
use filvyn_core::UserId;
use filvyn_store::NoteStore;
use filvyn_tools::note_registry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

use crate::loop_runner::{AgentLoop, TurnOutcome};

pub const WELCOME_MESSAGE: &str = "Hello!\n\nWelcome to your personal AI assistant. I can help you store and retrieve \
information intelligently. Feel free to share any content you'd like to save or ask me questions about previously \
stored information. I'll analyze your requests and manage the data accordingly!";

pub const ERROR_REPLY: &str = "Sorry, I encountered an error while processing your message. Please try again later.";

type History = Arc<tokio::sync::Mutex<Conversation>>;

pub struct MessageHandler {
    provider: Arc<dyn Provider>,
    store: Arc<NoteStore>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: f32,
    agent: AgentConfig,
    histories: Mutex<HashMap<UserId, History>>,
}

impl MessageHandler {
    pub fn new(provider: Arc<dyn Provider>, store: Arc<NoteStore>, model: impl Into<String>) -> Self {
        Self {
            provider,
            store,
            event_bus: Arc::new(EventBus::default()),
            model: model.into(),
            temperature: 0.7,
            agent: AgentConfig::default(),
            histories: Mutex::new(HashMap::new()),
        }
    }

    /// Model, temperature and agent limits taken from `config`.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, store: Arc<NoteStore>) -> Self {
        Self::new(provider, store, config.provider.chat_model.clone())
            .with_temperature(config.provider.temperature)
            .with_agent_config(config.agent.clone())
    }

    pub fn with_agent_config(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    fn history(&self, user: &UserId) -> History {
        let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        histories.entry(user.clone()).or_default().clone()
    }

    /// Snapshot of a user's conversation, system prompt included.
    pub async fn messages(&self, user: &UserId) -> Vec<Message> {
        self.history(user).lock().await.messages.clone()
    }

    /// Forget a user's conversation.
    pub fn reset(&self, user: &UserId) {
        let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        histories.remove(user);
    }

    /// Greet a user who just started a chat.
    pub async fn handle_start(&self, replier: &dyn Replier) {
        if let Err(e) = replier.reply(WELCOME_MESSAGE).await {
            warn!(error = %e, "Failed to send welcome message");
        }
    }

    /// Run the agent on one user message.
    ///
    /// Never fails: agent errors are logged and answered with an apology.
    /// Returns how the turn ended, or `None` if it failed.
    pub async fn handle_text(&self, inbound: InboundMessage, replier: Arc<dyn Replier>) -> Option<TurnOutcome> {
        let user = inbound.user_id;
        info!(
            user_id = %user,
            username = inbound.username.as_deref().unwrap_or(""),
            len = inbound.text.len(),
            "Received message"
        );
        self.event_bus.publish(DomainEvent::MessageReceived {
            user_id: user.to_string(),
            content_preview: inbound.text.chars().take(50).collect(),
            timestamp: Utc::now(),
        });

        if let Err(e) = replier.send_typing().await {
            warn!(user_id = %user, error = %e, "Failed to send typing indicator");
        }

        let history = self.history(&user);
        let mut conversation = history.lock().await;
        conversation.trim_to(self.agent.max_history);
        conversation.push(Message::user(inbound.text));

        let tools = note_registry(user.clone(), self.store.clone(), replier.clone());
        let agent = AgentLoop::new(self.provider.clone(), self.model.clone(), Arc::new(tools), self.event_bus.clone())
            .with_name(self.agent.name.clone())
            .with_temperature(self.temperature)
            .with_max_turns(self.agent.max_turns);

        match agent.chat(&mut conversation).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(user_id = %user, error = %e, "Error handling message");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: format!("handle_text user={user}"),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                if let Err(e) = replier.reply(ERROR_REPLY).await {
                    warn!(user_id = %user, error = %e, "Failed to deliver error reply");
                }
                None
            }
        }
    }
}
