//! ragguard Core - shared data model, collaborator traits and infrastructure
//!
//! Everything the guarded pipeline needs that is not pipeline logic itself:
//! the request/response model, the interfaces of the external collaborators
//! (similarity search, completion backend, trace sink), configuration,
//! logging and error handling.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
