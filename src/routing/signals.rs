// ABOUTME: Provider health signals - an optional snapshot file marking providers
// ABOUTME: as down or rate limited so routing skips them while the data is fresh.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use super::RoutingConfig;

/// Reported health of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Degraded,
    RateLimited,
    Down,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSignal {
    pub status: ProviderStatus,
}

/// Snapshot written by whatever watches provider health.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalsSnapshot {
    pub captured_at_ms: u64,
    #[serde(default)]
    pub providers: HashMap<String, ProviderSignal>,
}

impl SignalsSnapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn is_fresh(&self, now_ms: u64, max_age_ms: u64) -> bool {
        now_ms.saturating_sub(self.captured_at_ms) <= max_age_ms
    }

    /// Providers routing should skip.
    pub fn blocked_providers(&self) -> HashSet<String> {
        self.providers
            .iter()
            .filter(|(_, s)| matches!(s.status, ProviderStatus::Down | ProviderStatus::RateLimited))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Providers to skip per the configured snapshot; empty when unset, stale, or unreadable.
pub fn blocked_providers(config: &RoutingConfig) -> HashSet<String> {
    let Some(path) = &config.signals_snapshot_path else {
        return HashSet::new();
    };
    match SignalsSnapshot::load(path) {
        Ok(snapshot) if snapshot.is_fresh(now_ms(), config.signals_max_age_ms) => {
            snapshot.blocked_providers()
        }
        Ok(_) => {
            tracing::debug!(path = %path.display(), "provider signals are stale; ignoring");
            HashSet::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring provider signals: {}", e);
            HashSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_snapshot(dir: &Path, captured_at_ms: u64) -> std::path::PathBuf {
        let path = dir.join("signals.json");
        let body = serde_json::json!({
            "capturedAtMs": captured_at_ms,
            "providers": {
                "openai": {"status": "rate_limited"},
                "anthropic": {"status": "ok"},
                "google": {"status": "down"},
                "xai": {"status": "flapping"}
            }
        });
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn test_fresh_snapshot_blocks_unhealthy_providers() {
        let dir = tempfile::tempdir().unwrap();
        let config = RoutingConfig {
            signals_snapshot_path: Some(write_snapshot(dir.path(), now_ms())),
            ..RoutingConfig::default()
        };
        let blocked = blocked_providers(&config);
        assert!(blocked.contains("openai"));
        assert!(blocked.contains("google"));
        assert!(!blocked.contains("anthropic"));
        assert!(!blocked.contains("xai"));
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = RoutingConfig {
            signals_snapshot_path: Some(write_snapshot(dir.path(), 1_000)),
            signals_max_age_ms: 60_000,
            ..RoutingConfig::default()
        };
        assert!(blocked_providers(&config).is_empty());
    }

    #[test]
    fn test_missing_snapshot_is_ignored() {
        let config = RoutingConfig {
            signals_snapshot_path: Some("/nonexistent/signals.json".into()),
            ..RoutingConfig::default()
        };
        assert!(blocked_providers(&config).is_empty());
    }
}
