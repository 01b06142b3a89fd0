// ABOUTME: Orchestration requests - the single/parallel/chain call shapes and the
// ABOUTME: validation that turns a request into exactly one execution mode.

use std::path::PathBuf;

use serde::Deserialize;

use crate::agent::IsolationMode;
use crate::error::RequestError;
use crate::routing::RoutingOverrides;

/// Placeholder in chain step tasks replaced by the previous step's output.
pub const PREVIOUS_PLACEHOLDER: &str = "{previous}";

/// One unit of work: an agent name plus the task to give it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub agent: String,
    pub task: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Model hint for this task only.
    #[serde(default)]
    pub model: Option<String>,
}

impl TaskSpec {
    pub fn new(agent: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            task: task.into(),
            cwd: None,
            model: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A validated request, reduced to its execution mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Single(TaskSpec),
    Parallel(Vec<TaskSpec>),
    Chain(Vec<TaskSpec>),
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Single(_) => "single",
            Mode::Parallel(_) => "parallel",
            Mode::Chain(_) => "chain",
        }
    }
}

/// One orchestration call. Exactly one of `agent`+`task`, `tasks` or `chain`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestrationRequest {
    pub agent: Option<String>,
    pub task: Option<String>,
    pub tasks: Option<Vec<TaskSpec>>,
    #[serde(alias = "centipede")]
    pub chain: Option<Vec<TaskSpec>>,
    /// Working directory for tasks that do not name their own.
    pub cwd: Option<PathBuf>,
    /// Model hint applied to every task without its own.
    pub model: Option<String>,
    pub isolation: Option<IsolationMode>,
    /// Run without waiting; single mode only.
    pub background: bool,
    #[serde(skip)]
    pub routing: Option<RoutingOverrides>,
}

impl OrchestrationRequest {
    pub fn single(agent: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent: Some(agent.into()),
            task: Some(task.into()),
            ..Default::default()
        }
    }

    pub fn parallel(tasks: Vec<TaskSpec>) -> Self {
        Self {
            tasks: Some(tasks),
            ..Default::default()
        }
    }

    pub fn chain(steps: Vec<TaskSpec>) -> Self {
        Self {
            chain: Some(steps),
            ..Default::default()
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn isolation(mut self, isolation: IsolationMode) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn routing(mut self, overrides: RoutingOverrides) -> Self {
        self.routing = Some(overrides);
        self
    }

    /// Check the request shape and pick the execution mode.
    ///
    /// A half-specified single call (only `agent` or only `task`) still
    /// counts as a supplied mode, so pairing it with `tasks` is ambiguous.
    pub fn validate(&self, max_tasks: usize) -> Result<Mode, RequestError> {
        let single = self.agent.is_some() || self.task.is_some();
        let supplied = [single, self.tasks.is_some(), self.chain.is_some()]
            .iter()
            .filter(|s| **s)
            .count();
        if supplied != 1 {
            return Err(RequestError::AmbiguousMode { supplied });
        }

        let mode = if single {
            match (&self.agent, &self.task) {
                (Some(agent), Some(task)) => Mode::Single(TaskSpec::new(agent, task)),
                _ => return Err(RequestError::IncompleteSingle),
            }
        } else if let Some(tasks) = &self.tasks {
            if tasks.is_empty() {
                return Err(RequestError::EmptyBatch { mode: "parallel" });
            }
            if tasks.len() > max_tasks {
                return Err(RequestError::TooManyTasks {
                    count: tasks.len(),
                    max: max_tasks,
                });
            }
            Mode::Parallel(tasks.clone())
        } else {
            let steps = self.chain.clone().unwrap_or_default();
            if steps.is_empty() {
                return Err(RequestError::EmptyBatch { mode: "chain" });
            }
            Mode::Chain(steps)
        };

        if self.background && !matches!(mode, Mode::Single(_)) {
            return Err(RequestError::BackgroundUnsupported { mode: mode.name() });
        }
        Ok(mode)
    }
}

/// Replace every `{previous}` in a chain step's task with the prior output.
pub fn substitute_previous(task: &str, previous: &str) -> String {
    task.replace(PREVIOUS_PLACEHOLDER, previous)
}
