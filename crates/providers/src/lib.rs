//! LLM Provider implementations for Filvyn.
//!
//! All providers implement the `filvyn_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
