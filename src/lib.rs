//! Colloquy: one conversational interface over OpenAI, Anthropic, Gemini,
//! DeepSeek and Bedrock.
//!
//! Provider wire formats are normalized into one message model. A
//! [`ChatSession`](chat::ChatSession) drives the tool-calling loop until the
//! model answers, with retrying transport underneath.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use colloquy::prelude::*;
//!
//! # async fn example() -> colloquy::error::Result<()> {
//! let registry = Arc::new(ModelRegistry::new(Config::from_env()?)?);
//! let mut chat = registry.chat()?;
//! chat.with_instructions("You are terse.");
//! let reply = chat.ask("What is the capital of Norway?").await?;
//! println!("{}", reply.text());
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod transport;
pub mod types;
pub mod util;
