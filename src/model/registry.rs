// ABOUTME: Model registry seam and request-scoped snapshots of it.
// ABOUTME: Snapshots memoise the cheapest-available lookup per orchestration call.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Per-million-token prices for a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCost {
    pub input: f64,
    pub output: f64,
}

/// A model the host can run, as reported by its registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub id: String,
    /// Human-readable name; falls back to the id when empty.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cost: ModelCost,
}

/// A ranked routing candidate is a registry model.
pub type ModelCandidate = ModelInfo;

impl ModelInfo {
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
            name: String::new(),
            cost: ModelCost::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_cost(mut self, input: f64, output: f64) -> Self {
        self.cost = ModelCost { input, output };
        self
    }

    /// Routing cost figure: the mean of input and output unit prices.
    pub fn mean_cost(&self) -> f64 {
        (self.cost.input + self.cost.output) / 2.0
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// `provider/id`, the form handed to child processes.
    pub fn qualified_id(&self) -> String {
        format!("{}/{}", self.provider, self.id)
    }
}

/// The host's model registry.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Providers the host knows about.
    async fn list_providers(&self) -> Vec<String>;

    /// Models offered by a provider.
    async fn list_models(&self, provider: &str) -> Vec<ModelInfo>;

    /// Credential for a model, if one is configured.
    async fn api_key_for(&self, provider: &str, model_id: &str) -> Option<String>;
}

/// In-memory registry, for embedding hosts, tests, and the CLI.
#[derive(Debug, Clone, Default)]
pub struct StaticModelRegistry {
    models: Vec<ModelInfo>,
    keys: HashMap<String, String>,
    env_keys: bool,
}

#[derive(Deserialize)]
struct RegistryFile {
    models: Vec<ModelInfo>,
}

impl StaticModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model.
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.models.push(model);
        self
    }

    /// Set the credential for every model of a provider.
    pub fn with_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.keys.insert(provider.into(), key.into());
        self
    }

    /// Also look credentials up in `<PROVIDER>_API_KEY` environment variables.
    pub fn with_env_keys(mut self) -> Self {
        self.env_keys = true;
        self
    }

    /// Load `{"models": [...]}` from a JSON file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading model list {}", path.display()))?;
        let file: RegistryFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing model list {}", path.display()))?;
        Ok(Self {
            models: file.models,
            ..Self::default()
        })
    }
}

/// Environment variable consulted for a provider's credential.
pub fn provider_key_env_var(provider: &str) -> String {
    let normalized: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_API_KEY", normalized)
}

#[async_trait]
impl ModelRegistry for StaticModelRegistry {
    async fn list_providers(&self) -> Vec<String> {
        let providers: BTreeSet<_> = self.models.iter().map(|m| m.provider.clone()).collect();
        providers.into_iter().collect()
    }

    async fn list_models(&self, provider: &str) -> Vec<ModelInfo> {
        self.models
            .iter()
            .filter(|m| m.provider == provider)
            .cloned()
            .collect()
    }

    async fn api_key_for(&self, provider: &str, _model_id: &str) -> Option<String> {
        if let Some(key) = self.keys.get(provider) {
            return Some(key.clone());
        }
        if self.env_keys {
            return std::env::var(provider_key_env_var(provider))
                .ok()
                .filter(|k| !k.is_empty());
        }
        None
    }
}

/// Immutable view of the registry for the duration of one orchestration call.
///
/// Concurrent invocations share a snapshot read-only; the only interior state
/// is the memoised cheapest-available model.
pub struct RegistrySnapshot {
    registry: Arc<dyn ModelRegistry>,
    models: Vec<ModelInfo>,
    cheapest: OnceCell<Option<ModelInfo>>,
}

impl RegistrySnapshot {
    /// Capture every model the registry currently exposes.
    pub async fn capture(registry: Arc<dyn ModelRegistry>) -> Self {
        let providers = registry.list_providers().await;
        let models: Vec<ModelInfo> =
            futures::future::join_all(providers.iter().map(|p| registry.list_models(p)))
                .await
                .into_iter()
                .flatten()
                .collect();
        tracing::debug!(count = models.len(), "captured model registry snapshot");
        Self {
            registry,
            models,
            cheapest: OnceCell::new(),
        }
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    /// Credential for a model, looked up live against the registry.
    pub async fn api_key_for(&self, model: &ModelInfo) -> Option<String> {
        self.registry.api_key_for(&model.provider, &model.id).await
    }

    /// The cheapest model (by mean unit cost) that has a usable credential.
    pub async fn cheapest_available(&self) -> Option<ModelInfo> {
        self.cheapest
            .get_or_init(|| async {
                let mut ranked: Vec<&ModelInfo> = self.models.iter().collect();
                ranked.sort_by(|a, b| a.mean_cost().total_cmp(&b.mean_cost()));
                for model in ranked {
                    if self.api_key_for(model).await.is_some() {
                        return Some(model.clone());
                    }
                }
                None
            })
            .await
            .clone()
    }
}
