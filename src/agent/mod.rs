// ABOUTME: Agent module - discovery of agent definitions and name resolution.
// ABOUTME: Provides AgentConfig, AgentCatalog, the fuzzy resolver, and ToolFilter.

mod definition;
mod discovery;
mod filter;
mod resolver;

pub use definition::{AgentConfig, AgentDefaults, AgentSource, IsolationMode, MissingAgentBehavior};
pub use discovery::{
    load_agent, AgentCatalog, AgentDirectories, AgentScope, AgentSummary, AGENTS_DIR,
    DEFAULTS_FILE,
};
pub use filter::{effective_tools, ToolFilter, BUILTIN_TOOLS};
pub use resolver::{resolve_isolation, score_agent_match, Resolution, ResolvedAgent, MATCH_THRESHOLD};
