// ABOUTME: Result types for orchestration - per-invocation outcomes and the
// ABOUTME: per-mode aggregate, with human-readable summaries for the caller.

use serde::Serialize;

use crate::agent::{IsolationMode, Resolution};
use crate::llm::{Message, Usage};

/// How one invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The child exited with status 0.
    Completed,
    /// The child exited non-zero or was killed.
    ProcessFailed { exit_code: Option<i32> },
    /// A tool call was vetoed. Terminal, never retried.
    ToolDenied { tool_use_id: String, reason: String },
    /// Aborted by the caller.
    Cancelled,
    /// No model both qualifies and has credentials.
    Unroutable { reason: String },
    /// The child could not be started.
    SpawnFailed { message: String },
    /// A hook refused the spawn.
    Blocked { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// Short label used in events and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::ProcessFailed { .. } => "process_failed",
            Outcome::ToolDenied { .. } => "tool_denied",
            Outcome::Cancelled => "cancelled",
            Outcome::Unroutable { .. } => "unroutable",
            Outcome::SpawnFailed { .. } => "spawn_failed",
            Outcome::Blocked { .. } => "blocked",
        }
    }

    /// Why the invocation did not complete; `None` on success.
    pub fn error(&self) -> Option<String> {
        match self {
            Outcome::Completed => None,
            Outcome::ProcessFailed {
                exit_code: Some(code),
            } => Some(format!("process exited with status {}", code)),
            Outcome::ProcessFailed { exit_code: None } => {
                Some("process terminated by signal".to_string())
            }
            Outcome::ToolDenied { reason, .. } => Some(format!("tool call denied: {}", reason)),
            Outcome::Cancelled => Some("cancelled".to_string()),
            Outcome::Unroutable { reason } => Some(format!("no usable model: {}", reason)),
            Outcome::SpawnFailed { message } => Some(format!("spawn failed: {}", message)),
            Outcome::Blocked { reason } => Some(format!("blocked by hook: {}", reason)),
        }
    }
}

/// Everything known about one subagent invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub id: String,
    /// Resolved agent name.
    pub agent: String,
    pub requested_agent: String,
    pub resolution: Resolution,
    /// Task text as dispatched.
    pub task: String,
    pub model: Option<String>,
    pub isolation: IsolationMode,
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub messages: Vec<Message>,
    /// Last assistant text; empty when there was none.
    pub final_output: String,
    pub usage: Usage,
    /// Assistant messages seen.
    pub turns: usize,
    pub duration_ms: u64,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// One line: agent, model and what happened.
    pub fn summary(&self) -> String {
        let agent = if self.agent == self.requested_agent {
            self.agent.clone()
        } else {
            format!("{} (requested '{}')", self.agent, self.requested_agent)
        };
        let model = self.model.as_deref().unwrap_or("default model");
        match self.outcome.error() {
            None => format!("{} on {}: completed", agent, model),
            Some(error) => format!("{} on {}: {}", agent, model, error),
        }
    }
}

/// Aggregate result of one orchestration call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    Single {
        result: InvocationResult,
    },
    Parallel {
        results: Vec<InvocationResult>,
    },
    Chain {
        steps: Vec<InvocationResult>,
        /// Index of the first step that did not complete.
        stopped_at: Option<usize>,
    },
    Background {
        id: String,
        agent: String,
    },
}

impl OrchestrationOutcome {
    pub fn mode(&self) -> &'static str {
        match self {
            OrchestrationOutcome::Single { .. } => "single",
            OrchestrationOutcome::Parallel { .. } => "parallel",
            OrchestrationOutcome::Chain { .. } => "chain",
            OrchestrationOutcome::Background { .. } => "background",
        }
    }

    pub fn results(&self) -> &[InvocationResult] {
        match self {
            OrchestrationOutcome::Single { result } => std::slice::from_ref(result),
            OrchestrationOutcome::Parallel { results } => results,
            OrchestrationOutcome::Chain { steps, .. } => steps,
            OrchestrationOutcome::Background { .. } => &[],
        }
    }

    /// True when every invocation completed.
    pub fn is_success(&self) -> bool {
        match self {
            OrchestrationOutcome::Chain { stopped_at, .. } if stopped_at.is_some() => false,
            _ => self.results().iter().all(InvocationResult::is_success),
        }
    }

    /// Usage summed across invocations.
    pub fn total_usage(&self) -> Usage {
        let mut total = Usage::default();
        for result in self.results() {
            total.accumulate(&result.usage);
        }
        total
    }

    /// Multi-line report naming the mode and each invocation's fate.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        match self {
            OrchestrationOutcome::Background { id, agent } => {
                lines.push(format!("background: started {} as {}", agent, id));
            }
            OrchestrationOutcome::Chain { steps, stopped_at } => {
                let done = steps.iter().filter(|s| s.is_success()).count();
                match stopped_at {
                    Some(index) => lines.push(format!(
                        "chain: stopped at step {} ({} of {} steps completed)",
                        index + 1,
                        done,
                        steps.len()
                    )),
                    None => lines.push(format!("chain: {} steps completed", steps.len())),
                }
            }
            _ => {
                let results = self.results();
                let done = results.iter().filter(|r| r.is_success()).count();
                lines.push(format!(
                    "{}: {} of {} completed",
                    self.mode(),
                    done,
                    results.len()
                ));
            }
        }
        for (i, result) in self.results().iter().enumerate() {
            lines.push(format!("  [{}] {}", i + 1, result.summary()));
        }
        lines.join("\n")
    }
}
