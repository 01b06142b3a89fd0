// ABOUTME: Agent resolution - maps a requested name onto a discovered agent by exact
// ABOUTME: match or fuzzy score, synthesizing an ephemeral agent when nothing is close.

use serde::Serialize;

use super::definition::{AgentConfig, AgentDefaults, IsolationMode, MissingAgentBehavior};
use super::discovery::AgentCatalog;
use crate::error::AgentError;

/// Minimum fuzzy score for a candidate to be used.
pub const MATCH_THRESHOLD: f64 = 40.0;

/// How a requested name became a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Exact,
    Match,
    Ephemeral,
    /// The configured fallback agent stood in for an unmatched name.
    Fallback,
}

/// A requested agent name resolved to a runnable config.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAgent {
    pub config: AgentConfig,
    pub resolution: Resolution,
    /// The name the caller asked for, kept even when another agent was substituted.
    pub requested_name: String,
}

/// Score how well `candidate` matches `requested`. Case-insensitive.
///
/// Equal names score `f64::INFINITY`; prefix matches outrank containment.
pub fn score_agent_match(candidate: &str, requested: &str) -> f64 {
    let candidate = candidate.to_lowercase();
    let requested = requested.to_lowercase();
    if candidate.is_empty() || requested.is_empty() {
        return 0.0;
    }
    if candidate == requested {
        return f64::INFINITY;
    }

    let (c_len, r_len) = (candidate.chars().count(), requested.chars().count());
    if candidate.starts_with(&requested) {
        100.0 + r_len as f64
    } else if requested.starts_with(&candidate) {
        90.0 + c_len as f64
    } else if candidate.contains(&requested) {
        50.0 + r_len as f64
    } else if requested.contains(&candidate) {
        40.0 + c_len as f64
    } else {
        0.0
    }
}

impl AgentCatalog {
    /// Resolve a requested agent name.
    ///
    /// Fails only when the defaults ask for `missingAgentBehavior: error` and
    /// no fallback agent is available.
    pub fn resolve(&self, requested: &str) -> Result<ResolvedAgent, AgentError> {
        let resolved = |config: &AgentConfig, resolution| ResolvedAgent {
            config: config.clone(),
            resolution,
            requested_name: requested.to_string(),
        };

        if let Some(agent) = self.get(requested) {
            return Ok(resolved(agent, Resolution::Exact));
        }

        let mut best: Option<(&AgentConfig, f64)> = None;
        for agent in self.agents() {
            let score = score_agent_match(&agent.name, requested);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((agent, score));
            }
        }
        if let Some((agent, score)) = best {
            if score >= MATCH_THRESHOLD {
                tracing::debug!(requested, matched = %agent.name, score, "fuzzy agent match");
                return Ok(resolved(agent, Resolution::Match));
            }
        }

        let defaults = self.defaults();
        if defaults.missing_agent_behavior() == MissingAgentBehavior::Error {
            let fallback = defaults.fallback_agent.as_deref().and_then(|n| self.get(n));
            return match fallback {
                Some(agent) => {
                    tracing::info!(requested, fallback = %agent.name, "using fallback agent");
                    Ok(resolved(agent, Resolution::Fallback))
                }
                None => Err(AgentError::NotFound {
                    name: requested.to_string(),
                    available: self.names(),
                }),
            };
        }

        tracing::info!(requested, "no matching agent; synthesizing ephemeral agent");
        Ok(ResolvedAgent {
            config: AgentConfig::ephemeral(requested, defaults),
            resolution: Resolution::Ephemeral,
            requested_name: requested.to_string(),
        })
    }
}

/// Isolation precedence: per-call value, then the agent's own, then defaults.
pub fn resolve_isolation(
    per_call: Option<IsolationMode>,
    agent: &AgentConfig,
    defaults: &AgentDefaults,
) -> IsolationMode {
    per_call
        .or(agent.isolation)
        .or(defaults.isolation)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSource;

    fn catalog(defaults: AgentDefaults) -> AgentCatalog {
        AgentCatalog::from_agents(
            vec![
                AgentConfig::new("worker", "Do work.").tools(vec!["bash".into()]),
                AgentConfig::new("code-reviewer", "Review.").max_turns(3),
                AgentConfig::new("scout", "Look around."),
                AgentConfig::new("general", "Anything."),
            ],
            defaults,
        )
    }

    #[test]
    fn test_scores() {
        assert_eq!(score_agent_match("worker", "Worker"), f64::INFINITY);
        assert_eq!(score_agent_match("worker", "work"), 104.0);
        assert_eq!(score_agent_match("work", "worker"), 94.0);
        assert_eq!(score_agent_match("code-reviewer", "review"), 56.0);
        assert_eq!(score_agent_match("scout", "the-scout-agent"), 45.0);
        assert_eq!(score_agent_match("scout", "planner"), 0.0);
        assert_eq!(score_agent_match("scout", ""), 0.0);
        assert!(score_agent_match("worker", "work") >= MATCH_THRESHOLD);
        assert!(score_agent_match("work", "worker") >= MATCH_THRESHOLD);
    }

    #[test]
    fn test_exact_is_unmodified_by_defaults() {
        let defaults = AgentDefaults {
            tools: Some(vec!["read".into()]),
            max_turns: Some(99),
            ..AgentDefaults::default()
        };
        let catalog = catalog(defaults);
        let resolved = catalog.resolve("worker").unwrap();
        assert_eq!(resolved.resolution, Resolution::Exact);
        assert_eq!(&resolved.config, catalog.get("worker").unwrap());
        assert_eq!(resolved.config.max_turns, None);
    }

    #[test]
    fn test_case_variant_is_a_match_not_exact() {
        let resolved = catalog(AgentDefaults::default()).resolve("Worker").unwrap();
        assert_eq!(resolved.resolution, Resolution::Match);
        assert_eq!(resolved.config.name, "worker");
        assert_eq!(resolved.requested_name, "Worker");
    }

    #[test]
    fn test_fuzzy_match_picks_highest_score() {
        let resolved = catalog(AgentDefaults::default()).resolve("reviewer").unwrap();
        assert_eq!(resolved.resolution, Resolution::Match);
        assert_eq!(resolved.config.name, "code-reviewer");
        assert_eq!(resolved.config.max_turns, Some(3));
    }

    #[test]
    fn test_ephemeral_takes_defaults_not_near_miss() {
        let defaults = AgentDefaults {
            tools: Some(vec!["read".into(), "grep".into()]),
            max_turns: Some(4),
            ..AgentDefaults::default()
        };
        let resolved = catalog(defaults.clone()).resolve("data-analyst").unwrap();
        assert_eq!(resolved.resolution, Resolution::Ephemeral);
        assert_eq!(resolved.config.name, "data-analyst");
        assert_eq!(resolved.config.source, AgentSource::Synthesized);
        assert_eq!(resolved.config.tools, defaults.tools);
        assert_eq!(resolved.config.max_turns, Some(4));
    }

    #[test]
    fn test_missing_agent_error_uses_fallback() {
        let defaults = AgentDefaults {
            missing_agent_behavior: Some(MissingAgentBehavior::Error),
            fallback_agent: Some("general".into()),
            ..AgentDefaults::default()
        };
        let resolved = catalog(defaults).resolve("data-analyst").unwrap();
        assert_eq!(resolved.resolution, Resolution::Fallback);
        assert_eq!(resolved.config.name, "general");
        assert_eq!(resolved.requested_name, "data-analyst");
    }

    #[test]
    fn test_missing_agent_error_without_fallback() {
        let defaults = AgentDefaults {
            missing_agent_behavior: Some(MissingAgentBehavior::Error),
            fallback_agent: Some("nobody".into()),
            ..AgentDefaults::default()
        };
        let err = catalog(defaults).resolve("data-analyst").unwrap_err();
        match err {
            AgentError::NotFound { name, available } => {
                assert_eq!(name, "data-analyst");
                assert_eq!(available, vec!["code-reviewer", "general", "scout", "worker"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_isolation_precedence() {
        let defaults = AgentDefaults {
            isolation: Some(IsolationMode::Worktree),
            ..AgentDefaults::default()
        };
        let plain = AgentConfig::new("a", "");
        let shared = AgentConfig::new("b", "").isolation(IsolationMode::None);

        assert_eq!(
            resolve_isolation(None, &plain, &defaults),
            IsolationMode::Worktree
        );
        assert_eq!(
            resolve_isolation(None, &shared, &defaults),
            IsolationMode::None
        );
        assert_eq!(
            resolve_isolation(Some(IsolationMode::Worktree), &shared, &defaults),
            IsolationMode::Worktree
        );
        assert_eq!(
            resolve_isolation(None, &plain, &AgentDefaults::default()),
            IsolationMode::None
        );
    }
}
