// ABOUTME: Static capability matrix - per model family quality ratings by task type.
// ABOUTME: Lookup is longest-prefix over the bare model id so dated ids still match.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of work a task mostly is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Code,
    Vision,
    Text,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [TaskType::Code, TaskType::Vision, TaskType::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Code => "code",
            TaskType::Vision => "vision",
            TaskType::Text => "text",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(TaskType::Code),
            "vision" => Ok(TaskType::Vision),
            "text" => Ok(TaskType::Text),
            other => Err(format!("unknown task type '{}'", other)),
        }
    }
}

/// Ratings 1-5 per supported task type. Absent type means unsupported.
pub type Ratings = HashMap<TaskType, u8>;

const C: TaskType = TaskType::Code;
const V: TaskType = TaskType::Vision;
const T: TaskType = TaskType::Text;

static BUILTIN: &[(&str, &[(TaskType, u8)])] = &[
    ("claude-opus-4", &[(C, 5), (V, 4), (T, 5)]),
    ("claude-opus-4-5", &[(C, 5), (V, 5), (T, 5)]),
    ("claude-sonnet-4", &[(C, 4), (V, 4), (T, 4)]),
    ("claude-sonnet-4-5", &[(C, 5), (V, 4), (T, 5)]),
    ("claude-3-7-sonnet", &[(C, 4), (V, 3), (T, 4)]),
    ("claude-haiku-4-5", &[(C, 3), (V, 3), (T, 3)]),
    ("claude-3-5-haiku", &[(C, 2), (T, 2)]),
    ("gpt-5", &[(C, 5), (V, 4), (T, 5)]),
    ("gpt-5-mini", &[(C, 3), (V, 3), (T, 4)]),
    ("gpt-5-nano", &[(C, 2), (V, 2), (T, 2)]),
    ("gpt-5-codex", &[(C, 5), (T, 3)]),
    ("gpt-5.1", &[(C, 5), (V, 4), (T, 5)]),
    ("gpt-5.1-codex", &[(C, 5), (T, 3)]),
    ("gpt-5.1-codex-mini", &[(C, 4), (T, 2)]),
    ("gpt-4.1", &[(C, 4), (V, 4), (T, 4)]),
    ("gpt-4.1-mini", &[(C, 3), (V, 3), (T, 3)]),
    ("gpt-4.1-nano", &[(C, 1), (T, 2)]),
    ("gpt-4o", &[(C, 3), (V, 4), (T, 4)]),
    ("gpt-4o-mini", &[(C, 2), (V, 3), (T, 3)]),
    ("o3", &[(C, 5), (V, 4), (T, 5)]),
    ("o4-mini", &[(C, 4), (V, 3), (T, 4)]),
    ("gemini-2.5-pro", &[(C, 4), (V, 5), (T, 5)]),
    ("gemini-2.5-flash", &[(C, 3), (V, 4), (T, 4)]),
    ("gemini-2.5-flash-lite", &[(C, 2), (V, 3), (T, 3)]),
    ("grok-4", &[(C, 4), (T, 4)]),
    ("grok-code-fast-1", &[(C, 3)]),
    ("deepseek-chat", &[(C, 3), (T, 4)]),
    ("deepseek-reasoner", &[(C, 4), (T, 4)]),
    ("qwen3-coder", &[(C, 4), (T, 2)]),
];

/// Model family key to ratings, with longest-prefix lookup.
#[derive(Debug, Clone, Default)]
pub struct CapabilityMatrix {
    entries: HashMap<String, Ratings>,
    /// Keys sorted longest first so specific families shadow short ones.
    keys: Vec<String>,
}

impl CapabilityMatrix {
    /// An empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in ratings table.
    pub fn builtin() -> Self {
        let mut matrix = Self::new();
        for (key, ratings) in BUILTIN {
            matrix.insert(*key, ratings.iter().copied().collect());
        }
        matrix
    }

    /// Insert or replace a family. Ratings outside 1..=5 are dropped.
    pub fn insert(&mut self, key: impl Into<String>, ratings: Ratings) {
        let key = key.into().to_ascii_lowercase();
        let ratings: Ratings = ratings
            .into_iter()
            .filter(|(_, r)| (1..=5).contains(r))
            .collect();
        if self.entries.insert(key.clone(), ratings).is_none() {
            self.keys.push(key);
            self.keys
                .sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        }
    }

    /// Merge `{"family": {"code": 4, ...}}` over this matrix, replacing whole families.
    pub fn merge_overrides(&mut self, overrides: HashMap<String, HashMap<String, u8>>) {
        for (key, raw) in overrides {
            let mut ratings = Ratings::new();
            for (task_type, rating) in raw {
                match task_type.parse::<TaskType>() {
                    Ok(t) => {
                        ratings.insert(t, rating);
                    }
                    Err(e) => tracing::warn!(family = %key, "ignoring matrix override: {}", e),
                }
            }
            self.insert(key, ratings);
        }
    }

    /// Built-in matrix plus overrides read from a JSON file. Failures are logged
    /// and leave the built-in table in place.
    pub fn with_overrides_file(mut self, path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<HashMap<String, HashMap<String, u8>>>(&raw)
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(overrides) => {
                tracing::debug!(path = %path.display(), families = overrides.len(), "loaded matrix overrides");
                self.merge_overrides(overrides);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring matrix overrides: {}", e);
            }
        }
        self
    }

    /// Ratings for a model id, matched by the longest family-key prefix.
    pub fn ratings_for(&self, model_id: &str) -> Option<&Ratings> {
        let bare = bare_model_id(model_id);
        self.keys
            .iter()
            .find(|key| bare.starts_with(key.as_str()))
            .and_then(|key| self.entries.get(key))
    }

    /// Rating of a model for a task type; `None` when unrated or unsupported.
    pub fn rating(&self, model_id: &str, task_type: TaskType) -> Option<u8> {
        self.ratings_for(model_id)
            .and_then(|r| r.get(&task_type).copied())
    }
}

/// Lowercased model id with any `provider/` prefix stripped.
fn bare_model_id(model_id: &str) -> String {
    model_id
        .rsplit('/')
        .next()
        .unwrap_or(model_id)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_parse_and_display() {
        assert_eq!("Code".parse::<TaskType>().unwrap(), TaskType::Code);
        assert_eq!(TaskType::Vision.to_string(), "vision");
        assert!("audio".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_dated_id_matches_family() {
        let matrix = CapabilityMatrix::builtin();
        assert_eq!(
            matrix.rating("claude-sonnet-4-5-20250929", TaskType::Code),
            Some(5)
        );
        assert_eq!(
            matrix.rating("claude-sonnet-4-20250514", TaskType::Code),
            Some(4)
        );
    }

    #[test]
    fn test_longest_prefix_wins() {
        let matrix = CapabilityMatrix::builtin();
        assert_eq!(matrix.rating("gpt-5-nano", TaskType::Code), Some(2));
        assert_eq!(matrix.rating("gpt-5.1-codex-mini", TaskType::Code), Some(4));
        assert_eq!(matrix.rating("gpt-5", TaskType::Code), Some(5));
    }

    #[test]
    fn test_provider_prefix_is_stripped() {
        let matrix = CapabilityMatrix::builtin();
        assert_eq!(
            matrix.rating("openrouter/gpt-4o-mini", TaskType::Vision),
            Some(3)
        );
    }

    #[test]
    fn test_unsupported_type_and_unknown_model() {
        let matrix = CapabilityMatrix::builtin();
        assert_eq!(matrix.rating("grok-code-fast-1", TaskType::Text), None);
        assert_eq!(matrix.rating("llama-3-8b", TaskType::Code), None);
    }

    #[test]
    fn test_insert_drops_out_of_range_ratings() {
        let mut matrix = CapabilityMatrix::new();
        matrix.insert(
            "local-coder",
            [(TaskType::Code, 9), (TaskType::Text, 2)].into_iter().collect(),
        );
        assert_eq!(matrix.rating("local-coder-7b", TaskType::Code), None);
        assert_eq!(matrix.rating("local-coder-7b", TaskType::Text), Some(2));
    }

    #[test]
    fn test_overrides_file_replaces_family() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        std::fs::write(&path, r#"{"gpt-5-nano": {"code": 3}, "my-model": {"text": 4}}"#)
            .unwrap();

        let matrix = CapabilityMatrix::builtin().with_overrides_file(&path);
        assert_eq!(matrix.rating("gpt-5-nano", TaskType::Code), Some(3));
        // whole family replaced: vision no longer rated
        assert_eq!(matrix.rating("gpt-5-nano", TaskType::Vision), None);
        assert_eq!(matrix.rating("my-model-v2", TaskType::Text), Some(4));
    }

    #[test]
    fn test_invalid_overrides_file_keeps_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        std::fs::write(&path, "not json").unwrap();

        let matrix = CapabilityMatrix::builtin().with_overrides_file(&path);
        assert_eq!(matrix.rating("gpt-5-nano", TaskType::Code), Some(2));
    }
}
