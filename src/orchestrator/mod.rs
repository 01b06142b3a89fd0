// ABOUTME: Orchestrator module - request validation, subagent execution across
// ABOUTME: the three modes, denial detection and the result types callers see.

mod denial;
mod orchestrator;
mod request;
mod result;

pub use denial::{detect_denial, ToolDenial, DENIAL_PHRASES};
pub use orchestrator::{Orchestrator, OrchestratorOptions, MAX_CONCURRENCY, MAX_PARALLEL_TASKS};
pub use request::{substitute_previous, Mode, OrchestrationRequest, TaskSpec, PREVIOUS_PLACEHOLDER};
pub use result::{InvocationResult, OrchestrationOutcome, Outcome};
