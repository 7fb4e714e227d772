//! HTTP request handlers.

pub mod audio;
pub mod chat;
pub mod health;

pub use audio::*;
pub use chat::*;
pub use health::*;
