//! HTTP request handlers

pub mod chat;
pub mod health;
pub mod types;

pub use chat::*;
pub use health::*;
pub use types::*;
