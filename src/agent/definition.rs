// ABOUTME: Agent definition types - discovered agent configs and directory defaults.
// ABOUTME: Defaults only ever shape synthesized agents, never matched ones.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where an agent definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    User,
    Project,
    /// Built on the fly for a name nothing matched.
    Synthesized,
}

/// Filesystem isolation for a spawned subagent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Share the caller's working tree.
    #[default]
    None,
    /// Run inside a throwaway git worktree.
    Worktree,
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationMode::None => f.write_str("none"),
            IsolationMode::Worktree => f.write_str("worktree"),
        }
    }
}

impl FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(IsolationMode::None),
            "worktree" => Ok(IsolationMode::Worktree),
            other => Err(format!("unknown isolation mode '{}'", other)),
        }
    }
}

/// What to do when a requested agent matches nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingAgentBehavior {
    #[default]
    Ephemeral,
    Error,
}

/// A named, runnable agent definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub name: String,
    pub description: String,

    /// Tool allowlist. `None` means the built-in defaults.
    pub tools: Option<Vec<String>>,

    /// Tool denylist, applied after the allowlist.
    pub disallowed_tools: Option<Vec<String>>,

    pub skills: Option<Vec<String>>,

    /// Agent names this agent may itself spawn.
    pub allowed_agent_types: Option<Vec<String>>,

    pub mcp_servers: Option<Vec<String>>,

    /// Turn ceiling, enforced by the child process.
    pub max_turns: Option<u32>,

    /// Model hint: a model query or a routing keyword such as `auto-cheap`.
    pub model: Option<String>,

    pub isolation: Option<IsolationMode>,

    pub system_prompt: String,

    pub source: AgentSource,

    /// Definition file; `None` for synthesized agents.
    pub file_path: Option<PathBuf>,
}

impl AgentConfig {
    /// Create an agent with required fields.
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tools: None,
            disallowed_tools: None,
            skills: None,
            allowed_agent_types: None,
            mcp_servers: None,
            max_turns: None,
            model: None,
            isolation: None,
            system_prompt: system_prompt.into(),
            source: AgentSource::Project,
            file_path: None,
        }
    }

    /// Synthesize an agent for an unmatched name, shaped only by `defaults`.
    pub fn ephemeral(name: &str, defaults: &AgentDefaults) -> Self {
        let system_prompt = format!(
            "You are the \"{name}\" agent. Another agent has delegated a task to you. \
             Complete the task thoroughly using the tools available, then reply with a \
             concise summary of what you did and what you found."
        );
        Self {
            description: format!("Ephemeral agent for '{}'", name),
            tools: defaults.tools.clone(),
            disallowed_tools: defaults.disallowed_tools.clone(),
            max_turns: defaults.max_turns,
            mcp_servers: defaults.mcp_servers.clone(),
            isolation: defaults.isolation,
            source: AgentSource::Synthesized,
            ..Self::new(name, system_prompt)
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the tool allowlist.
    pub fn tools(mut self, tools: Vec<String>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set the tool denylist.
    pub fn disallowed_tools(mut self, tools: Vec<String>) -> Self {
        self.disallowed_tools = Some(tools);
        self
    }

    pub fn allowed_agent_types(mut self, names: Vec<String>) -> Self {
        self.allowed_agent_types = Some(names);
        self
    }

    pub fn max_turns(mut self, max: u32) -> Self {
        self.max_turns = Some(max);
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

    pub fn source(mut self, source: AgentSource) -> Self {
        self.source = source;
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}

/// Directory-scoped fallback values for synthesized agents.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    #[serde(deserialize_with = "super::discovery::string_list")]
    pub tools: Option<Vec<String>>,

    #[serde(
        alias = "disallowed-tools",
        deserialize_with = "super::discovery::string_list"
    )]
    pub disallowed_tools: Option<Vec<String>>,

    #[serde(alias = "max-turns")]
    pub max_turns: Option<u32>,

    #[serde(alias = "mcp-servers", deserialize_with = "super::discovery::string_list")]
    pub mcp_servers: Option<Vec<String>>,

    pub isolation: Option<IsolationMode>,

    #[serde(alias = "missing-agent-behavior")]
    pub missing_agent_behavior: Option<MissingAgentBehavior>,

    #[serde(alias = "fallback-agent")]
    pub fallback_agent: Option<String>,
}

impl AgentDefaults {
    /// Layer `other` on top: each field it sets wins, lists replace wholesale.
    pub fn merge(&mut self, other: AgentDefaults) {
        if other.tools.is_some() {
            self.tools = other.tools;
        }
        if other.disallowed_tools.is_some() {
            self.disallowed_tools = other.disallowed_tools;
        }
        if other.max_turns.is_some() {
            self.max_turns = other.max_turns;
        }
        if other.mcp_servers.is_some() {
            self.mcp_servers = other.mcp_servers;
        }
        if other.isolation.is_some() {
            self.isolation = other.isolation;
        }
        if other.missing_agent_behavior.is_some() {
            self.missing_agent_behavior = other.missing_agent_behavior;
        }
        if other.fallback_agent.is_some() {
            self.fallback_agent = other.fallback_agent;
        }
    }

    pub fn missing_agent_behavior(&self) -> MissingAgentBehavior {
        self.missing_agent_behavior.unwrap_or_default()
    }
}
