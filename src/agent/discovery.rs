// ABOUTME: Agent discovery - scans user and project agent directories for Markdown
// ABOUTME: definitions with YAML frontmatter, merging per-directory defaults files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use super::definition::{AgentConfig, AgentDefaults, AgentSource, IsolationMode};
use crate::error::AgentError;
use crate::routing::SETTINGS_DIR;

/// Directory under [`SETTINGS_DIR`] holding agent definitions.
pub const AGENTS_DIR: &str = "agents";

/// Per-directory defaults file. Excluded from the agent list.
pub const DEFAULTS_FILE: &str = "_defaults.md";

/// Which directories to scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentScope {
    User,
    Project,
    #[default]
    Both,
}

impl std::str::FromStr for AgentScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(AgentScope::User),
            "project" => Ok(AgentScope::Project),
            "both" => Ok(AgentScope::Both),
            other => Err(format!("unknown agent scope '{}'", other)),
        }
    }
}

/// Agent directories per scope, in scan order.
#[derive(Debug, Clone, Default)]
pub struct AgentDirectories {
    user: Vec<PathBuf>,
    project: Vec<PathBuf>,
}

impl AgentDirectories {
    pub fn new() -> Self {
        Self::default()
    }

    /// `~/.fleet/agents` plus the nearest ancestor of `cwd` with `.fleet/agents`.
    pub fn standard(cwd: &Path) -> Self {
        let mut dirs = Self::new();
        if let Some(home) = dirs::home_dir() {
            dirs.user.push(home.join(SETTINGS_DIR).join(AGENTS_DIR));
        }
        if let Some(project) = find_project_agents_dir(cwd) {
            // A project at $HOME would otherwise be scanned twice.
            if !dirs.user.contains(&project) {
                dirs.project.push(project);
            }
        }
        dirs
    }

    pub fn with_user_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user.push(dir.into());
        self
    }

    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project.push(dir.into());
        self
    }

    /// User directories first so project definitions override them.
    fn scan_order(&self, scope: AgentScope) -> Vec<(AgentSource, &Path)> {
        let user = self.user.iter().map(|d| (AgentSource::User, d.as_path()));
        let project = self
            .project
            .iter()
            .map(|d| (AgentSource::Project, d.as_path()));
        match scope {
            AgentScope::User => user.collect(),
            AgentScope::Project => project.collect(),
            AgentScope::Both => user.chain(project).collect(),
        }
    }
}

fn find_project_agents_dir(cwd: &Path) -> Option<PathBuf> {
    cwd.ancestors()
        .map(|dir| dir.join(SETTINGS_DIR).join(AGENTS_DIR))
        .find(|candidate| candidate.is_dir())
}

/// Discovered agents keyed by name, plus the merged defaults.
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: BTreeMap<String, AgentConfig>,
    defaults: AgentDefaults,
}

/// One row of [`AgentCatalog::list`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub description: String,
    pub source: AgentSource,
}

impl AgentCatalog {
    /// Scan the directories for a scope. Unreadable files are logged and skipped.
    pub fn discover(dirs: &AgentDirectories, scope: AgentScope) -> Self {
        let mut catalog = Self::default();
        for (source, dir) in dirs.scan_order(scope) {
            catalog.scan_dir(dir, source);
        }
        tracing::debug!(
            agents = catalog.agents.len(),
            ?scope,
            "discovered agent definitions"
        );
        catalog
    }

    /// Build a catalog from in-memory definitions.
    pub fn from_agents(agents: impl IntoIterator<Item = AgentConfig>, defaults: AgentDefaults) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.name.clone(), a)).collect(),
            defaults,
        }
    }

    fn scan_dir(&mut self, dir: &Path, source: AgentSource) {
        if !dir.is_dir() {
            return;
        }

        let defaults_path = dir.join(DEFAULTS_FILE);
        if defaults_path.is_file() {
            match load_defaults(&defaults_path) {
                Ok(defaults) => self.defaults.merge(defaults),
                Err(e) => tracing::warn!("skipping agent defaults: {}", e),
            }
        }

        let pattern = format!("{}/*.md", glob::Pattern::escape(&dir.to_string_lossy()));
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "cannot scan agent directory: {}", e);
                return;
            }
        };

        let mut files: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        files.sort();
        for path in files {
            let excluded = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|n| n.starts_with('_'));
            if excluded || !path.is_file() {
                continue;
            }
            match load_agent(&path, source) {
                Ok(agent) => {
                    if let Some(previous) = self.agents.insert(agent.name.clone(), agent) {
                        tracing::debug!(
                            name = %previous.name,
                            shadowed = ?previous.file_path,
                            "agent definition overridden"
                        );
                    }
                }
                Err(e) => tracing::warn!("skipping agent definition: {}", e),
            }
        }
    }

    /// Look up an agent by exact name.
    pub fn get(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }

    /// Agents sorted by name.
    pub fn list(&self) -> Vec<AgentSummary> {
        self.agents
            .values()
            .map(|a| AgentSummary {
                name: a.name.clone(),
                description: a.description.clone(),
                source: a.source,
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn defaults(&self) -> &AgentDefaults {
        &self.defaults
    }

    pub(crate) fn agents(&self) -> impl Iterator<Item = &AgentConfig> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AgentFrontmatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(deserialize_with = "string_list")]
    tools: Option<Vec<String>>,
    #[serde(alias = "disallowed-tools", deserialize_with = "string_list")]
    disallowed_tools: Option<Vec<String>>,
    #[serde(deserialize_with = "string_list")]
    skills: Option<Vec<String>>,
    #[serde(alias = "allowed-agent-types", deserialize_with = "string_list")]
    allowed_agent_types: Option<Vec<String>>,
    #[serde(alias = "mcp-servers", deserialize_with = "string_list")]
    mcp_servers: Option<Vec<String>>,
    #[serde(alias = "max-turns")]
    max_turns: Option<u32>,
    model: Option<String>,
    isolation: Option<IsolationMode>,
}

/// A YAML list or a comma-separated string.
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }

    let items = match Option::<Raw>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Raw::List(items)) => items,
        Some(Raw::Csv(csv)) => csv.split(',').map(str::to_string).collect(),
    };
    Ok(Some(
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    ))
}

/// Split `---` delimited frontmatter from the body. `None` when there is none.
fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.trim_start_matches('\u{feff}').strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;
    let (yaml, after) = if rest.starts_with("---") {
        ("", &rest[3..])
    } else {
        let end = rest.find("\n---")?;
        (&rest[..end], &rest[end + 4..])
    };
    // Drop the remainder of the closing delimiter line.
    let body = after.split_once('\n').map(|(_, b)| b).unwrap_or("");
    Some((yaml, body))
}

fn parse_yaml<T>(yaml: &str, path: &Path) -> Result<T, AgentError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if yaml.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(yaml).map_err(|e| AgentError::Frontmatter {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn read(path: &Path) -> Result<String, AgentError> {
    std::fs::read_to_string(path).map_err(|source| AgentError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn load_defaults(path: &Path) -> Result<AgentDefaults, AgentError> {
    let raw = read(path)?;
    match split_frontmatter(&raw) {
        Some((yaml, _)) => parse_yaml(yaml, path),
        None => Ok(AgentDefaults::default()),
    }
}

/// Parse one agent file. The name falls back to the file stem.
pub fn load_agent(path: &Path, source: AgentSource) -> Result<AgentConfig, AgentError> {
    let raw = read(path)?;
    let (frontmatter, body) = match split_frontmatter(&raw) {
        Some((yaml, body)) => (parse_yaml::<AgentFrontmatter>(yaml, path)?, body),
        None => (AgentFrontmatter::default(), raw.as_str()),
    };

    let name = frontmatter
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .ok_or_else(|| AgentError::Frontmatter {
            path: path.to_path_buf(),
            message: "agent has no name".to_string(),
        })?;

    Ok(AgentConfig {
        name,
        description: frontmatter.description.unwrap_or_default(),
        tools: frontmatter.tools,
        disallowed_tools: frontmatter.disallowed_tools,
        skills: frontmatter.skills,
        allowed_agent_types: frontmatter.allowed_agent_types,
        mcp_servers: frontmatter.mcp_servers,
        max_turns: frontmatter.max_turns,
        model: frontmatter.model.filter(|m| !m.trim().is_empty()),
        isolation: frontmatter.isolation,
        system_prompt: body.trim().to_string(),
        source,
        file_path: Some(path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MissingAgentBehavior;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_split_frontmatter() {
        let (yaml, body) = split_frontmatter("---\nname: a\n---\nHello\nworld\n").unwrap();
        assert_eq!(yaml, "name: a");
        assert_eq!(body, "Hello\nworld\n");

        let (yaml, body) = split_frontmatter("---\n---\nBody").unwrap();
        assert_eq!(yaml, "");
        assert_eq!(body, "Body");

        assert!(split_frontmatter("# Just markdown").is_none());
    }

    #[test]
    fn test_load_agent_parses_fields() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "reviewer.md",
            "---\nname: reviewer\ndescription: Reviews code\ntools: read, grep ,\n\
             disallowedTools:\n  - bash\nallowed-agent-types: [scout]\nmaxTurns: 12\n\
             model: sonnet\nisolation: worktree\n---\n\nYou review diffs carefully.\n",
        );
        let agent = load_agent(&dir.path().join("reviewer.md"), AgentSource::Project).unwrap();

        assert_eq!(agent.name, "reviewer");
        assert_eq!(agent.description, "Reviews code");
        assert_eq!(agent.tools, Some(vec!["read".into(), "grep".into()]));
        assert_eq!(agent.disallowed_tools, Some(vec!["bash".into()]));
        assert_eq!(agent.allowed_agent_types, Some(vec!["scout".into()]));
        assert_eq!(agent.max_turns, Some(12));
        assert_eq!(agent.model.as_deref(), Some("sonnet"));
        assert_eq!(agent.isolation, Some(IsolationMode::Worktree));
        assert_eq!(agent.system_prompt, "You review diffs carefully.");
        assert_eq!(agent.source, AgentSource::Project);
    }

    #[test]
    fn test_load_agent_without_frontmatter_uses_stem() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "scout.md", "Find things.");
        let agent = load_agent(&dir.path().join("scout.md"), AgentSource::User).unwrap();
        assert_eq!(agent.name, "scout");
        assert_eq!(agent.system_prompt, "Find things.");
        assert!(agent.tools.is_none());
    }

    #[test]
    fn test_invalid_frontmatter_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.md", "---\nmaxTurns: lots\n---\nBody");
        let err = load_agent(&dir.path().join("bad.md"), AgentSource::User).unwrap_err();
        assert!(matches!(err, AgentError::Frontmatter { .. }));
    }

    #[test]
    fn test_discover_project_overrides_user() {
        let user = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write(user.path(), "worker.md", "---\ndescription: user worker\n---\nU");
        write(user.path(), "scout.md", "---\ndescription: scout\n---\nS");
        write(project.path(), "worker.md", "---\ndescription: project worker\n---\nP");
        write(project.path(), "broken.md", "---\ntools: {a: 1}\n---\nB");

        let dirs = AgentDirectories::new()
            .with_user_dir(user.path())
            .with_project_dir(project.path());
        let catalog = AgentCatalog::discover(&dirs, AgentScope::Both);

        assert_eq!(catalog.names(), vec!["scout", "worker"]);
        let worker = catalog.get("worker").unwrap();
        assert_eq!(worker.description, "project worker");
        assert_eq!(worker.source, AgentSource::Project);

        let user_only = AgentCatalog::discover(&dirs, AgentScope::User);
        assert_eq!(user_only.get("worker").unwrap().description, "user worker");
    }

    #[test]
    fn test_defaults_file_is_merged_and_excluded() {
        let user = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write(
            user.path(),
            DEFAULTS_FILE,
            "---\ntools: [read, bash]\nmaxTurns: 20\nfallbackAgent: general\n---\n",
        );
        write(
            project.path(),
            DEFAULTS_FILE,
            "---\ntools: grep\nmissing-agent-behavior: error\n---\n",
        );
        write(project.path(), "_draft.md", "---\nname: draft\n---\nD");
        write(project.path(), "general.md", "General.");

        let dirs = AgentDirectories::new()
            .with_user_dir(user.path())
            .with_project_dir(project.path());
        let catalog = AgentCatalog::discover(&dirs, AgentScope::Both);

        assert_eq!(catalog.names(), vec!["general"]);
        let defaults = catalog.defaults();
        assert_eq!(defaults.tools, Some(vec!["grep".into()]));
        assert_eq!(defaults.max_turns, Some(20));
        assert_eq!(defaults.fallback_agent.as_deref(), Some("general"));
        assert_eq!(
            defaults.missing_agent_behavior(),
            MissingAgentBehavior::Error
        );
    }

    #[test]
    fn test_standard_finds_nearest_project_dir() {
        let root = tempfile::tempdir().unwrap();
        let agents = root.path().join(SETTINGS_DIR).join(AGENTS_DIR);
        write(&agents, "a.md", "A");
        let nested = root.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let dirs = AgentDirectories::standard(&nested);
        let catalog = AgentCatalog::discover(&dirs, AgentScope::Project);
        assert!(catalog.get("a").is_some());
    }

    #[test]
    fn test_list_is_sorted_with_sources() {
        let catalog = AgentCatalog::from_agents(
            vec![
                AgentConfig::new("zeta", "z").source(AgentSource::User),
                AgentConfig::new("alpha", "a").description("first"),
            ],
            AgentDefaults::default(),
        );
        let list = catalog.list();
        assert_eq!(list[0].name, "alpha");
        assert_eq!(list[0].description, "first");
        assert_eq!(list[1].source, AgentSource::User);
        assert_eq!(catalog.len(), 2);
    }
}
