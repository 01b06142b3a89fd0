// ABOUTME: Model router - ranks capability-qualified models by cost preference and
// ABOUTME: walks the ranking until a candidate with usable credentials is found.

use std::collections::HashSet;
use std::sync::Arc;

use super::classifier::{ClassificationResult, TaskClassifier};
use super::config::{CostPreference, RoutingConfig, RoutingMode};
use super::signals;
use crate::error::RouteFailure;
use crate::model::{resolve_model_fuzzy, CapabilityMatrix, ModelInfo, RegistrySnapshot, TaskType};

/// Per-call routing adjustments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingOverrides {
    pub cost_preference: Option<CostPreference>,
    pub enabled: Option<bool>,
    pub primary_type: Option<TaskType>,
}

/// What a model hint asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelHint {
    /// Route automatically with the configured policy.
    Auto,
    /// Route automatically with a specific preference.
    Preference(CostPreference),
    /// Route automatically under a routing mode's policy.
    Mode(RoutingMode),
    /// A concrete model query for the fuzzy resolver.
    Explicit(String),
}

impl ModelHint {
    /// Recognise shorthand keywords; anything else is an explicit model query.
    pub fn parse(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => ModelHint::Auto,
            "auto-cheap" | "cheap" | "eco" | "auto-eco" => {
                ModelHint::Preference(CostPreference::Eco)
            }
            "auto-balanced" | "balanced" => ModelHint::Preference(CostPreference::Balanced),
            "premium" | "auto-premium" | "quality" | "auto-quality" => {
                ModelHint::Mode(RoutingMode::Quality)
            }
            _ => ModelHint::Explicit(hint.trim().to_string()),
        }
    }

    /// True when the hint pins a concrete model rather than asking for routing.
    pub fn is_explicit(&self) -> bool {
        matches!(self, ModelHint::Explicit(_))
    }
}

/// How a routed model was chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteVia {
    /// Resolved from an explicit hint.
    Hint,
    /// Picked from the ranked candidates at this position.
    Ranked { rank: usize },
}

/// A successful routing decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedModel {
    pub model: ModelInfo,
    pub via: RouteVia,
    pub preference: Option<CostPreference>,
    pub classification: Option<ClassificationResult>,
}

/// Filter to models rated at least `complexity` for the task type, then rank.
///
/// - `Eco`: ascending cost.
/// - `Premium`: descending cost.
/// - `Balanced`: models rated exactly `complexity` first, then the rest;
///   ascending cost within each group.
pub fn select_models(
    classification: &ClassificationResult,
    preference: CostPreference,
    models: &[ModelInfo],
    matrix: &CapabilityMatrix,
) -> Vec<ModelInfo> {
    let mut qualified: Vec<(ModelInfo, u8)> = models
        .iter()
        .filter_map(|m| {
            matrix
                .rating(&m.id, classification.task_type)
                .filter(|r| *r >= classification.complexity)
                .map(|r| (m.clone(), r))
        })
        .collect();

    match preference {
        CostPreference::Eco => {
            qualified.sort_by(|(a, _), (b, _)| a.mean_cost().total_cmp(&b.mean_cost()));
        }
        CostPreference::Premium => {
            qualified.sort_by(|(a, _), (b, _)| b.mean_cost().total_cmp(&a.mean_cost()));
        }
        CostPreference::Balanced => {
            let wanted = classification.complexity;
            qualified.sort_by(|(a, ra), (b, rb)| {
                (*ra != wanted)
                    .cmp(&(*rb != wanted))
                    .then_with(|| a.mean_cost().total_cmp(&b.mean_cost()))
            });
        }
    }

    qualified.into_iter().map(|(m, _)| m).collect()
}

/// Routes tasks to models for one orchestration call.
pub struct ModelRouter {
    snapshot: Arc<RegistrySnapshot>,
    matrix: CapabilityMatrix,
    config: RoutingConfig,
    classifier: TaskClassifier,
    blocked_providers: HashSet<String>,
}

impl ModelRouter {
    /// Build a router; loads matrix overrides and provider signals named by the config.
    pub fn new(
        snapshot: Arc<RegistrySnapshot>,
        config: RoutingConfig,
        classifier: TaskClassifier,
    ) -> Self {
        let matrix = match &config.matrix_overrides_path {
            Some(path) => CapabilityMatrix::builtin().with_overrides_file(path),
            None => CapabilityMatrix::builtin(),
        };
        let blocked_providers = signals::blocked_providers(&config);
        Self {
            snapshot,
            matrix,
            config,
            classifier,
            blocked_providers,
        }
    }

    /// Replace the capability matrix.
    pub fn with_matrix(mut self, matrix: CapabilityMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    /// Pick a model for a task.
    ///
    /// Preference precedence: per-call override, then a shorthand keyword in the
    /// hint, then the configured mode, then the configured cost preference.
    pub async fn route_model(
        &self,
        task: &str,
        hint: Option<&str>,
        overrides: Option<&RoutingOverrides>,
    ) -> Result<RoutedModel, RouteFailure> {
        let hint = hint.map(ModelHint::parse).unwrap_or(ModelHint::Auto);
        let defaults = RoutingOverrides::default();
        let overrides = overrides.unwrap_or(&defaults);

        if let ModelHint::Explicit(query) = &hint {
            return self.resolve_explicit(query).await;
        }

        if !overrides.enabled.unwrap_or(self.config.enabled) {
            return Err(RouteFailure::Disabled);
        }

        let preference = overrides.cost_preference.unwrap_or(match hint {
            ModelHint::Preference(p) => p,
            ModelHint::Mode(mode) => self.config.preference_for_mode(mode),
            _ => self.config.configured_preference(),
        });
        let primary = overrides.primary_type.unwrap_or(self.config.primary_type);

        let classification = self.classifier.classify(task, primary, &self.snapshot).await;
        let ranked = select_models(
            &classification,
            preference,
            self.snapshot.models(),
            &self.matrix,
        );
        if ranked.is_empty() {
            return Err(RouteFailure::NoQualifyingModel {
                task_type: classification.task_type,
                complexity: classification.complexity,
            });
        }

        let mut tried = Vec::new();
        for (rank, candidate) in ranked.into_iter().enumerate() {
            if self.blocked_providers.contains(&candidate.provider) {
                tracing::debug!(model = %candidate.qualified_id(), "skipping unhealthy provider");
                tried.push(candidate.qualified_id());
                continue;
            }
            if self.snapshot.api_key_for(&candidate).await.is_some() {
                tracing::info!(
                    model = %candidate.qualified_id(),
                    ?preference,
                    task_type = %classification.task_type,
                    complexity = classification.complexity,
                    rank,
                    "routed task"
                );
                return Ok(RoutedModel {
                    model: candidate,
                    via: RouteVia::Ranked { rank },
                    preference: Some(preference),
                    classification: Some(classification),
                });
            }
            tried.push(candidate.qualified_id());
        }

        Err(RouteFailure::NoCredentials { tried })
    }

    async fn resolve_explicit(&self, query: &str) -> Result<RoutedModel, RouteFailure> {
        let model = resolve_model_fuzzy(query, self.snapshot.models()).ok_or_else(|| {
            RouteFailure::UnresolvedHint {
                hint: query.to_string(),
            }
        })?;
        if self.snapshot.api_key_for(model).await.is_none() {
            return Err(RouteFailure::NoCredentials {
                tried: vec![model.qualified_id()],
            });
        }
        tracing::debug!(hint = query, model = %model.qualified_id(), "resolved model hint");
        Ok(RoutedModel {
            model: model.clone(),
            via: RouteVia::Hint,
            preference: None,
            classification: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlock, LlmClient, Request, Response, StopReason, Usage};
    use crate::model::StaticModelRegistry;
    use async_trait::async_trait;

    struct FixedClassification(&'static str);

    #[async_trait]
    impl LlmClient for FixedClassification {
        async fn create_message(
            &self,
            req: &Request,
        ) -> Result<Response, crate::error::LlmError> {
            Ok(Response {
                id: "1".into(),
                content: vec![ContentBlock::text(self.0)],
                stop_reason: StopReason::EndTurn,
                model: req.model.clone(),
                usage: Usage::default(),
            })
        }
    }

    fn registry() -> StaticModelRegistry {
        StaticModelRegistry::new()
            .with_model(ModelInfo::new("openai", "gpt-5-nano").with_cost(0.05, 0.4))
            .with_model(ModelInfo::new("openai", "gpt-5-mini").with_cost(0.25, 2.0))
            .with_model(ModelInfo::new("openai", "gpt-5").with_cost(1.25, 10.0))
            .with_model(ModelInfo::new("anthropic", "claude-opus-4-5").with_cost(5.0, 25.0))
            .with_key("openai", "sk-openai")
    }

    async fn router(reply: &'static str, config: RoutingConfig) -> ModelRouter {
        let snapshot = Arc::new(RegistrySnapshot::capture(Arc::new(registry())).await);
        let client: Arc<dyn LlmClient> = Arc::new(FixedClassification(reply));
        let classifier = TaskClassifier::new(Arc::new(move |_| Some(client.clone())));
        ModelRouter::new(snapshot, config, classifier)
    }

    #[test]
    fn test_hint_keywords() {
        assert_eq!(ModelHint::parse("auto"), ModelHint::Auto);
        assert_eq!(
            ModelHint::parse("auto-cheap"),
            ModelHint::Preference(CostPreference::Eco)
        );
        assert_eq!(
            ModelHint::parse("Premium"),
            ModelHint::Mode(RoutingMode::Quality)
        );
        assert!(ModelHint::parse("sonnet").is_explicit());
    }

    #[tokio::test]
    async fn test_balanced_routes_to_exact_fit() {
        let router = router(r#"{"type": "code", "complexity": 3}"#, RoutingConfig::default()).await;
        let routed = router.route_model("add a flag", None, None).await.unwrap();
        assert_eq!(routed.model.id, "gpt-5-mini");
        assert_eq!(routed.via, RouteVia::Ranked { rank: 0 });
    }

    #[tokio::test]
    async fn test_premium_keyword_skips_models_without_keys() {
        let router = router(r#"{"type": "code", "complexity": 4}"#, RoutingConfig::default()).await;
        let routed = router
            .route_model("redesign the scheduler", Some("premium"), None)
            .await
            .unwrap();
        // opus ranks first but has no credentials
        assert_eq!(routed.model.id, "gpt-5");
        assert_eq!(routed.via, RouteVia::Ranked { rank: 1 });
        assert_eq!(routed.preference, Some(CostPreference::Premium));
    }

    #[tokio::test]
    async fn test_override_beats_keyword() {
        let router = router(r#"{"type": "code", "complexity": 2}"#, RoutingConfig::default()).await;
        let overrides = RoutingOverrides {
            cost_preference: Some(CostPreference::Eco),
            ..RoutingOverrides::default()
        };
        let routed = router
            .route_model("fix typo", Some("premium"), Some(&overrides))
            .await
            .unwrap();
        assert_eq!(routed.model.id, "gpt-5-nano");
    }

    #[tokio::test]
    async fn test_no_credentials_failure_lists_tried_models() {
        // only opus rates 5 for vision, and anthropic has no key
        let router = router(r#"{"type": "vision", "complexity": 5}"#, RoutingConfig::default()).await;
        let err = router.route_model("inspect screenshot", None, None).await.unwrap_err();
        assert_eq!(
            err,
            RouteFailure::NoCredentials {
                tried: vec!["anthropic/claude-opus-4-5".into()]
            }
        );
    }

    #[tokio::test]
    async fn test_no_qualifying_model() {
        let router = router(r#"{"type": "text", "complexity": 2}"#, RoutingConfig::default())
            .await
            .with_matrix(CapabilityMatrix::new());
        let err = router.route_model("summarise notes", None, None).await.unwrap_err();
        assert_eq!(
            err,
            RouteFailure::NoQualifyingModel {
                task_type: TaskType::Text,
                complexity: 2
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_routing() {
        let config = RoutingConfig {
            enabled: false,
            ..RoutingConfig::default()
        };
        let router = router(r#"{"type": "code", "complexity": 1}"#, config).await;
        assert_eq!(
            router.route_model("x", None, None).await.unwrap_err(),
            RouteFailure::Disabled
        );
        // explicit hints still resolve
        let routed = router.route_model("x", Some("gpt5mini"), None).await.unwrap();
        assert_eq!(routed.model.id, "gpt-5-mini");
        assert_eq!(routed.via, RouteVia::Hint);
    }

    #[tokio::test]
    async fn test_explicit_hint_failures() {
        let router = router(r#"{"type": "code", "complexity": 1}"#, RoutingConfig::default()).await;
        assert_eq!(
            router.route_model("x", Some("llama"), None).await.unwrap_err(),
            RouteFailure::UnresolvedHint {
                hint: "llama".into()
            }
        );
        assert_eq!(
            router.route_model("x", Some("opus"), None).await.unwrap_err(),
            RouteFailure::NoCredentials {
                tried: vec!["anthropic/claude-opus-4-5".into()]
            }
        );
    }
}
