// ABOUTME: ToolFilter - allowlist/denylist filtering of tool names for a subagent.
// ABOUTME: Computes the effective tool list handed to the child process.

use super::definition::AgentConfig;

/// Tools a child gets when its agent declares no allowlist.
pub const BUILTIN_TOOLS: &[&str] = &["read", "bash", "edit", "write", "grep", "find", "ls"];

/// A filter over tool names. Denylist takes precedence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolFilter {
    allowed_tools: Option<Vec<String>>,
    denied_tools: Vec<String>,
}

impl ToolFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter described by an agent's `tools` and `disallowedTools`.
    pub fn for_agent(agent: &AgentConfig) -> Self {
        Self::new()
            .allowed(agent.tools.clone())
            .denied(agent.disallowed_tools.clone().unwrap_or_default())
    }

    /// Set the allowlist of tools. If None, the base list passes through.
    pub fn allowed(mut self, tools: Option<Vec<String>>) -> Self {
        self.allowed_tools = tools;
        self
    }

    /// Set the denylist of tools.
    pub fn denied(mut self, tools: Vec<String>) -> Self {
        self.denied_tools = tools;
        self
    }

    /// Check if a tool name passes the denylist.
    pub fn is_allowed(&self, name: &str) -> bool {
        !self.denied_tools.iter().any(|d| d == name)
    }

    /// `allowlist ?? base`, minus the denylist, order preserved and deduplicated.
    pub fn apply<S: AsRef<str>>(&self, base: &[S]) -> Vec<String> {
        let source: Vec<&str> = match &self.allowed_tools {
            Some(allowed) => allowed.iter().map(String::as_str).collect(),
            None => base.iter().map(AsRef::as_ref).collect(),
        };
        let mut tools: Vec<String> = Vec::with_capacity(source.len());
        for name in source {
            if self.is_allowed(name) && !tools.iter().any(|t| t == name) {
                tools.push(name.to_string());
            }
        }
        tools
    }
}

/// Effective tool list for an agent given the host's built-in tools.
pub fn effective_tools<S: AsRef<str>>(agent: &AgentConfig, builtin: &[S]) -> Vec<String> {
    ToolFilter::for_agent(agent).apply(builtin)
}
