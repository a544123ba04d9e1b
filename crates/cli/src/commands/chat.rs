//! `filvyn chat`: Talk to the assistant from the terminal.
//!
//! The terminal plays the part of a chat front end: every line typed is an
//! inbound message, and whatever the assistant sends back is printed.

use async_trait::async_trait;
use filvyn_agent::{MessageHandler, TurnOutcome};
use filvyn_core::channel::{InboundMessage, Replier};
use filvyn_core::error::ChannelError;
use filvyn_core::event::EventBus;
use filvyn_core::provider::Provider;
use filvyn_core::UserId;
use filvyn_providers::OpenAiCompatProvider;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::{load_config, note_store, CliResult};

/// Prints assistant messages to stdout.
pub struct ConsoleReplier {
    name: String,
}

impl ConsoleReplier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn format(&self, text: &str) -> String {
        let mut out = String::new();
        for line in text.lines() {
            out.push_str(&format!("  {} > {line}\n", self.name));
        }
        out
    }
}

#[async_trait]
impl Replier for ConsoleReplier {
    async fn reply(&self, text: &str) -> Result<(), ChannelError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout)
            .and_then(|_| write!(stdout, "{}", self.format(text)))
            .and_then(|_| stdout.flush())
            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))
    }

    async fn send_typing(&self) -> Result<(), ChannelError> {
        eprint!("  ...\r");
        Ok(())
    }
}

/// Mirror domain events into the debug log until the bus is dropped.
fn log_events(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::debug!(
                    event = event.kind(),
                    at = %event.timestamp().format("%H:%M:%S%.3f"),
                    "{}",
                    serde_json::to_string(event.as_ref()).unwrap_or_default()
                ),
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "Event log lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn prompt() -> std::io::Result<()> {
    print!("\n  You > ");
    std::io::stdout().flush()
}

pub async fn run(user: String) -> CliResult {
    let config = load_config()?;
    config.require_api_key()?;
    config.require_pdp_token()?;

    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config)?);
    let events = Arc::new(EventBus::default());
    log_events(&events);

    let store = Arc::new(note_store(&config, provider.clone())?.with_event_bus(events.clone()));
    let handler = MessageHandler::from_config(&config, provider, store).with_event_bus(events);
    let replier = Arc::new(ConsoleReplier::new(config.agent.name.clone()));
    let user = UserId::new(user);

    println!();
    println!("  {}: interactive mode", config.agent.name);
    println!("  Model:   {}", config.provider.chat_model);
    println!("  User:    {user}");
    println!("  Commands: /start, /reset, exit");

    handler.handle_start(replier.as_ref()).await;
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "exit" | "quit" => break,
            "/start" => handler.handle_start(replier.as_ref()).await,
            "/reset" => {
                handler.reset(&user);
                println!("  History cleared.");
            }
            text => {
                let inbound = InboundMessage::new(user.clone(), text);
                if handler.handle_text(inbound, replier.clone()).await == Some(TurnOutcome::NoToolCalls) {
                    tracing::debug!(user_id = %user, "Turn ended without a tool call");
                }
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
