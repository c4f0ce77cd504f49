//! Core types, config, errors, and the transcript model for the studio
//! conversation engine.

pub mod config;
pub mod error;
pub mod transcript;
pub mod types;

pub use transcript::Transcript;
pub use types::{ContentBlock, MessageContent, Role, ToolDefinition, Turn};
