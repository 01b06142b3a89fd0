// ABOUTME: Task classifier - asks the cheapest available model for a {type, complexity}
// ABOUTME: judgment and falls back deterministically on any failure or timeout.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm::{ClientFactory, Message, Request};
use crate::model::{RegistrySnapshot, TaskType};

/// Ceiling on the classification probe.
pub const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasoning string carried by the fallback result.
pub const FALLBACK_REASONING: &str = "fallback";

/// Complexity assumed when classification fails.
pub const FALLBACK_COMPLEXITY: u8 = 3;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("static regex")
});

/// The classifier's judgment about a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Minimum capability rating a model needs for this task (1-5).
    pub complexity: u8,
    #[serde(default)]
    pub reasoning: String,
}

impl ClassificationResult {
    /// The deterministic result used whenever classification fails.
    pub fn fallback(primary: TaskType) -> Self {
        Self {
            task_type: primary,
            complexity: FALLBACK_COMPLEXITY,
            reasoning: FALLBACK_REASONING.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.reasoning == FALLBACK_REASONING
    }
}

/// Classifies tasks with one cheap LLM probe.
#[derive(Clone)]
pub struct TaskClassifier {
    client_factory: Option<ClientFactory>,
    timeout: Duration,
}

impl TaskClassifier {
    /// Classifier that builds clients through the given factory.
    pub fn new(client_factory: ClientFactory) -> Self {
        Self {
            client_factory: Some(client_factory),
            timeout: CLASSIFY_TIMEOUT,
        }
    }

    /// Classifier with no model access; always returns the fallback.
    pub fn disabled() -> Self {
        Self {
            client_factory: None,
            timeout: CLASSIFY_TIMEOUT,
        }
    }

    /// Override the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify a task. Never fails and never waits longer than the timeout.
    pub async fn classify(
        &self,
        task: &str,
        primary: TaskType,
        snapshot: &RegistrySnapshot,
    ) -> ClassificationResult {
        match tokio::time::timeout(self.timeout, self.probe(task, primary, snapshot)).await {
            Ok(Ok(result)) => {
                tracing::debug!(
                    task_type = %result.task_type,
                    complexity = result.complexity,
                    "classified task"
                );
                result
            }
            Ok(Err(reason)) => {
                tracing::debug!("classification fell back: {}", reason);
                ClassificationResult::fallback(primary)
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.timeout, "classification timed out");
                ClassificationResult::fallback(primary)
            }
        }
    }

    async fn probe(
        &self,
        task: &str,
        primary: TaskType,
        snapshot: &RegistrySnapshot,
    ) -> Result<ClassificationResult, String> {
        let factory = self
            .client_factory
            .as_ref()
            .ok_or("no classifier client configured")?;
        let model = snapshot
            .cheapest_available()
            .await
            .ok_or("no model with credentials available")?;
        let client = factory(&model).ok_or_else(|| format!("no client for {}", model.qualified_id()))?;

        let request = Request::new(&model.id)
            .system(CLASSIFIER_SYSTEM_PROMPT)
            .message(Message::user(build_prompt(task, primary)))
            .max_tokens(200)
            .temperature(0.0);

        let response = client
            .create_message(&request)
            .await
            .map_err(|e| e.to_string())?;
        parse_classification(&response.text()).ok_or_else(|| "unparseable classification".to_string())
    }
}

const CLASSIFIER_SYSTEM_PROMPT: &str =
    "You classify software agent tasks. Reply with compact JSON only.";

fn build_prompt(task: &str, primary: TaskType) -> String {
    format!(
        r#"Classify the task below on two axes.

type - what kind of work dominates:
- "code": reading, writing, refactoring or debugging code
- "vision": understanding images, screenshots or diagrams
- "text": prose, analysis, planning or summarising without code changes

complexity - the minimum model capability required, 1 to 5:
1 = trivial: a rename, a one-line fix, a lookup
2 = simple: a small self-contained change in one place
3 = moderate: multi-step work within one component
4 = complex: cross-cutting changes, subtle debugging, design trade-offs
5 = expert: novel architecture, deep reasoning across many systems

This agent usually handles "{primary}" work; use that type unless the task clearly is another.

Task:
{task}

Answer as JSON: {{"type": "code|vision|text", "complexity": 1-5, "reasoning": "one short sentence"}}"#
    )
}

/// Extract and validate a classification from model output.
///
/// A fenced JSON block is tried first, then every `{` in the text in order;
/// the first JSON object that validates wins.
pub fn parse_classification(text: &str) -> Option<ClassificationResult> {
    let fenced = FENCED_JSON
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| serde_json::from_str::<serde_json::Value>(m.as_str()).ok())
        .and_then(|value| validate_classification(&value));
    if fenced.is_some() {
        return fenced;
    }

    text.match_indices('{').find_map(|(start, _)| {
        let value = serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<serde_json::Value>()
            .next()?
            .ok()?;
        validate_classification(&value)
    })
}

fn validate_classification(value: &serde_json::Value) -> Option<ClassificationResult> {
    let task_type = value.get("type")?.as_str()?.parse::<TaskType>().ok()?;
    let complexity = value.get("complexity")?.as_u64()?;
    if !(1..=5).contains(&complexity) {
        return None;
    }
    let reasoning = value
        .get("reasoning")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();

    Some(ClassificationResult {
        task_type,
        complexity: complexity as u8,
        reasoning,
    })
}
