// ABOUTME: Supervisor module - the seam between orchestration and child processes.
// ABOUTME: Defines spawn requests, child handles, worktrees, and the PID registry.

mod pid;
mod process;
mod worktree;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::SupervisorError;
use crate::llm::{Message, Usage};

pub use pid::{MemoryProcessRegistry, NoopProcessRegistry, ProcessRegistry};
pub use process::{ProcessSupervisor, ALLOWED_AGENTS_ENV, DEFAULT_AGENT_COMMAND};
pub use worktree::Worktree;

/// Everything needed to start one subagent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnRequest {
    /// Agent name, for logging and process bookkeeping.
    pub agent: String,
    pub task: String,
    pub cwd: PathBuf,
    /// Concrete model to run, `provider/id` or a raw hint.
    pub model: Option<String>,
    pub tools: Vec<String>,
    pub max_turns: Option<u32>,
    pub system_prompt: String,
    /// Agent names the child may itself spawn.
    pub allowed_agent_types: Option<Vec<String>>,
    pub env: HashMap<String, String>,
}

impl SpawnRequest {
    pub fn new(agent: impl Into<String>, task: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            agent: agent.into(),
            task: task.into(),
            cwd: cwd.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn allowed_agent_types(mut self, names: Option<Vec<String>>) -> Self {
        self.allowed_agent_types = names;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// How a child finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildExit {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub usage: Usage,
}

impl ChildExit {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A running subagent.
#[async_trait]
pub trait ChildHandle: Send {
    /// OS process id, when there is one.
    fn pid(&self) -> Option<u32>;

    /// Next completed message from the child; `None` once its output ends.
    async fn next_message(&mut self) -> Option<Message>;

    /// Ask the child to terminate.
    async fn signal(&mut self) -> Result<(), SupervisorError>;

    /// Wait for the child to exit and collect its final status.
    async fn wait(self: Box<Self>) -> Result<ChildExit, SupervisorError>;
}

/// Owns how subagents are started.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn ChildHandle>, SupervisorError>;
}
