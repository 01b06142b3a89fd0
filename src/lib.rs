// ABOUTME: Root module for fleet - subagent orchestration and model routing.
// ABOUTME: Re-exports the orchestrator entry points from submodules.

pub mod agent;
pub mod background;
pub mod coordinator;
pub mod error;
pub mod hook;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod prelude;
pub mod routing;
pub mod supervisor;

pub use error::FleetError;
pub use orchestrator::{OrchestrationOutcome, OrchestrationRequest, Orchestrator};
