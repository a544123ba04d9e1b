//! The Filvyn agent.
//!
//! The model can only act through tool calls written as markup in its
//! reply. Each user message runs through an **ask → parse → dispatch**
//! cycle:
//!
//! 1. **Prompt**: the system prompt lists every tool and its call format
//! 2. **Ask**: send the whole conversation to the provider
//! 3. **Parse**: extract `<invoke>` blocks from the reply
//! 4. **Dispatch**: run all calls concurrently, append their results in
//!    call order, and loop back to step 2
//!
//! The cycle ends when the model calls `complete`, replies without any
//! tool call, or the turn limit is hit.

pub mod handler;
pub mod loop_runner;
pub mod parser;
pub mod prompt;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use handler::{MessageHandler, ERROR_REPLY, WELCOME_MESSAGE};
pub use loop_runner::{AgentLoop, TurnOutcome, DEFAULT_MAX_TURNS};
pub use parser::{parse_tool_calls, try_parse_tool_calls, ParseError};
pub use prompt::system_prompt;
