// ABOUTME: Defines the LlmClient trait - the seam through which the task
// ABOUTME: classifier reaches whichever provider hosts the cheapest model.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Request, Response};
use crate::error::LlmError;
use crate::model::ModelInfo;

/// Trait for LLM client implementations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Create a message (non-streaming).
    async fn create_message(&self, req: &Request) -> Result<Response, LlmError>;
}

/// Builds a client able to talk to the given model, if the host has one.
pub type ClientFactory = Arc<dyn Fn(&ModelInfo) -> Option<Arc<dyn LlmClient>> + Send + Sync>;
