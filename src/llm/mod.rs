// ABOUTME: LLM module - message types and the client abstraction.
// ABOUTME: Provider wire protocols live with the host, not here.

mod client;
mod types;

pub use client::*;
pub use types::*;
