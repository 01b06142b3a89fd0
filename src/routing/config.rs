// ABOUTME: Routing configuration - layered global/project JSON settings decoded
// ABOUTME: field by field so one bad value never discards the rest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::TaskType;

/// Settings directory name, under the home directory and the project root.
pub const SETTINGS_DIR: &str = ".fleet";

/// Settings file name inside [`SETTINGS_DIR`].
pub const SETTINGS_FILE: &str = "settings.json";

/// Routing dial: cheapest, best-fit, or most capable first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostPreference {
    Eco,
    #[default]
    Balanced,
    Premium,
}

/// Named routing policy that maps onto a cost preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    Eco,
    Balanced,
    Quality,
}

impl RoutingMode {
    /// Preference a mode maps to when no policy override exists.
    pub fn default_preference(self) -> CostPreference {
        match self {
            RoutingMode::Eco => CostPreference::Eco,
            RoutingMode::Balanced => CostPreference::Balanced,
            RoutingMode::Quality => CostPreference::Premium,
        }
    }
}

/// Effective routing configuration for one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub primary_type: TaskType,
    pub cost_preference: CostPreference,
    pub mode: Option<RoutingMode>,
    pub signals_max_age_ms: u64,
    pub matrix_overrides_path: Option<PathBuf>,
    pub signals_snapshot_path: Option<PathBuf>,
    pub mode_policy_overrides: HashMap<RoutingMode, CostPreference>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            primary_type: TaskType::Code,
            cost_preference: CostPreference::Balanced,
            mode: None,
            signals_max_age_ms: 300_000,
            matrix_overrides_path: None,
            signals_snapshot_path: None,
            mode_policy_overrides: HashMap::new(),
        }
    }
}

impl RoutingConfig {
    /// Cost preference for a routing mode, honouring policy overrides.
    pub fn preference_for_mode(&self, mode: RoutingMode) -> CostPreference {
        self.mode_policy_overrides
            .get(&mode)
            .copied()
            .unwrap_or_else(|| mode.default_preference())
    }

    /// Preference from configuration alone: `mode` when set, else `costPreference`.
    pub fn configured_preference(&self) -> CostPreference {
        match self.mode {
            Some(mode) => self.preference_for_mode(mode),
            None => self.cost_preference,
        }
    }
}

/// Load routing config for a working directory: global settings, then the
/// project's settings on top. Never fails; problems are logged.
pub fn load_routing_config(cwd: &Path) -> RoutingConfig {
    let mut layers = Vec::new();
    if let Some(home) = dirs::home_dir() {
        layers.push(home.join(SETTINGS_DIR).join(SETTINGS_FILE));
    }
    layers.push(cwd.join(SETTINGS_DIR).join(SETTINGS_FILE));
    load_routing_config_from(&layers)
}

/// Load routing config from explicit settings files, later files winning per field.
pub fn load_routing_config_from(layers: &[PathBuf]) -> RoutingConfig {
    let mut config = RoutingConfig::default();
    for path in layers {
        if let Some(routing) = read_routing_section(path) {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            apply_layer(&mut config, &routing, base, path);
        }
    }
    config
}

fn read_routing_section(path: &Path) -> Option<Map<String, Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read settings: {}", e);
            return None;
        }
    };
    let doc: Value = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring malformed settings: {}", e);
            return None;
        }
    };
    match doc.get("routing") {
        Some(Value::Object(routing)) => Some(routing.clone()),
        Some(_) => {
            tracing::warn!(path = %path.display(), "'routing' must be an object; ignoring");
            None
        }
        None => None,
    }
}

/// Decode one field; an invalid value is logged and treated as absent.
fn field<T: DeserializeOwned>(routing: &Map<String, Value>, key: &str, source: &Path) -> Option<T> {
    let value = routing.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(
                path = %source.display(),
                field = key,
                "invalid routing value {}: {}; using fallback",
                value,
                e
            );
            None
        }
    }
}

fn apply_layer(config: &mut RoutingConfig, routing: &Map<String, Value>, base: &Path, source: &Path) {
    if let Some(v) = field(routing, "enabled", source) {
        config.enabled = v;
    }
    if let Some(v) = field(routing, "primaryType", source) {
        config.primary_type = v;
    }
    if let Some(v) = field(routing, "costPreference", source) {
        config.cost_preference = v;
    }
    if let Some(v) = field(routing, "mode", source) {
        config.mode = Some(v);
    }
    if let Some(v) = field(routing, "signalsMaxAgeMs", source) {
        config.signals_max_age_ms = v;
    }
    if let Some(v) = field::<String>(routing, "matrixOverridesPath", source) {
        config.matrix_overrides_path = Some(resolve_path(base, &v));
    }
    if let Some(v) = field::<String>(routing, "signalsSnapshotPath", source) {
        config.signals_snapshot_path = Some(resolve_path(base, &v));
    }
    if let Some(v) = field(routing, "modePolicyOverrides", source) {
        config.mode_policy_overrides = v;
    }
}

/// Expand `~/` and anchor relative paths at the settings file's directory.
fn resolve_path(base: &Path, raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
