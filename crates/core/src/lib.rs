//! Core domain types for the huzi chat relay.
//!
//! This crate defines the data model shared by the storage and server crates:
//! - Byte-range parsing and validation
//! - Chat messages, client request narrowing and prompt assembly
//! - Application configuration

pub mod chat;
pub mod config;
pub mod error;
pub mod range;

pub use chat::{ChatMessage, ChatReply, ChatRequest, ChatRole, IncomingMessage, ReplyMeta};
pub use error::{Error, Result};
pub use range::{ByteRange, RangeDecision, parse_range};
