// ABOUTME: Defines all error types for the fleet library using thiserror.
// ABOUTME: Each concern has its own error enum, unified under FleetError.

use std::path::PathBuf;

use crate::model::TaskType;

/// Top-level error type for the fleet library.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Routing failed: {0}")]
    Route(#[from] RouteFailure),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Errors from LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Input validation failures for an orchestration call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error(
        "exactly one of single (agent + task), tasks, or chain must be supplied; got {supplied}"
    )]
    AmbiguousMode { supplied: usize },

    #[error("single mode requires both 'agent' and 'task'")]
    IncompleteSingle,

    #[error("{mode} mode requires at least one task")]
    EmptyBatch { mode: &'static str },

    #[error("too many parallel tasks ({count}); the maximum is {max}")]
    TooManyTasks { count: usize, max: usize },

    #[error("background disposition is only supported in single mode, not {mode}")]
    BackgroundUnsupported { mode: &'static str },
}

/// Errors from agent discovery and resolution.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid frontmatter in {path}: {message}")]
    Frontmatter { path: PathBuf, message: String },

    #[error("agent '{name}' not found. Available agents: {}", available.join(", "))]
    NotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("agent '{name}' is not in the allowed agent types ({})", allowed.join(", "))]
    NotAllowed { name: String, allowed: Vec<String> },
}

/// Structured routing exhaustion. Reported, never thrown as a low-level error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteFailure {
    #[error("routing is disabled")]
    Disabled,

    #[error("model hint '{hint}' did not match any known model")]
    UnresolvedHint { hint: String },

    #[error("no model is rated {complexity} or better for {task_type} tasks")]
    NoQualifyingModel { task_type: TaskType, complexity: u8 },

    #[error("no credentials available for any qualifying model (tried: {})", tried.join(", "))]
    NoCredentials { tried: Vec<String> },
}

/// Errors from the child process layer.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git worktree error: {0}")]
    Worktree(String),
}
