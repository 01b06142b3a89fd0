// ABOUTME: Routing module - settings, health signals, task classification, and the
// ABOUTME: router that turns a task plus hint into a concrete model.

mod classifier;
mod config;
mod router;
mod signals;

pub use classifier::{
    parse_classification, ClassificationResult, TaskClassifier, CLASSIFY_TIMEOUT,
    FALLBACK_COMPLEXITY,
};
pub use config::{
    load_routing_config, load_routing_config_from, CostPreference, RoutingConfig, RoutingMode,
    SETTINGS_DIR, SETTINGS_FILE,
};
pub use router::{
    select_models, ModelHint, ModelRouter, RouteVia, RoutedModel, RoutingOverrides,
};
pub use signals::{blocked_providers, ProviderStatus, SignalsSnapshot};

#[cfg(test)]
mod select_test;
