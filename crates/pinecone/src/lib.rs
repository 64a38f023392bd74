//! Blocking client for the Pinecone control plane and admin APIs.
//!
//! - [`types`]: request and response bodies
//! - [`backend::ControlPlane`]: the client contract, with an HTTP
//!   implementation and an in-memory one for tests
//! - [`error`]: errors categorized for retry decisions

pub mod backend;
pub mod error;
pub mod types;

pub use backend::{ControlPlane, HttpBackend, MemoryBackend};
pub use error::{Error, ErrorCategory, Result};
pub use types::*;
