// ABOUTME: Tests for candidate selection across cost preferences.
// ABOUTME: Covers capability filtering, ordering, and unrated models.

use super::classifier::ClassificationResult;
use super::config::CostPreference;
use super::router::select_models;
use crate::model::{CapabilityMatrix, ModelInfo, TaskType};

fn catalog() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("anthropic", "claude-opus-4-5").with_cost(5.0, 25.0),
        ModelInfo::new("anthropic", "claude-haiku-4-5").with_cost(1.0, 5.0),
        ModelInfo::new("openai", "gpt-5").with_cost(1.25, 10.0),
        ModelInfo::new("openai", "gpt-5-mini").with_cost(0.25, 2.0),
        ModelInfo::new("openai", "gpt-5-nano").with_cost(0.05, 0.4),
        ModelInfo::new("local", "my-finetune").with_cost(0.0, 0.0),
    ]
}

fn classification(task_type: TaskType, complexity: u8) -> ClassificationResult {
    ClassificationResult {
        task_type,
        complexity,
        reasoning: String::new(),
    }
}

fn ids(models: &[ModelInfo]) -> Vec<&str> {
    models.iter().map(|m| m.id.as_str()).collect()
}

#[test]
fn test_eco_orders_by_ascending_cost() {
    let matrix = CapabilityMatrix::builtin();
    let picked = select_models(
        &classification(TaskType::Code, 3),
        CostPreference::Eco,
        &catalog(),
        &matrix,
    );
    assert_eq!(
        ids(&picked),
        vec!["gpt-5-mini", "claude-haiku-4-5", "gpt-5", "claude-opus-4-5"]
    );
}

#[test]
fn test_premium_orders_by_descending_cost() {
    let matrix = CapabilityMatrix::builtin();
    let picked = select_models(
        &classification(TaskType::Code, 3),
        CostPreference::Premium,
        &catalog(),
        &matrix,
    );
    assert_eq!(
        ids(&picked),
        vec!["claude-opus-4-5", "gpt-5", "claude-haiku-4-5", "gpt-5-mini"]
    );
}

#[test]
fn test_balanced_prefers_exact_rating_then_cost() {
    let matrix = CapabilityMatrix::builtin();
    let picked = select_models(
        &classification(TaskType::Code, 3),
        CostPreference::Balanced,
        &catalog(),
        &matrix,
    );
    // haiku and mini rate exactly 3; the 5-rated models follow, cheapest first
    assert_eq!(
        ids(&picked),
        vec!["gpt-5-mini", "claude-haiku-4-5", "gpt-5", "claude-opus-4-5"]
    );

    let picked = select_models(
        &classification(TaskType::Code, 2),
        CostPreference::Balanced,
        &catalog(),
        &matrix,
    );
    assert_eq!(picked[0].id, "gpt-5-nano");
    assert_eq!(picked[1].id, "gpt-5-mini");
}

#[test]
fn test_every_candidate_meets_complexity() {
    let matrix = CapabilityMatrix::builtin();
    for preference in [
        CostPreference::Eco,
        CostPreference::Balanced,
        CostPreference::Premium,
    ] {
        for complexity in 1..=5 {
            let c = classification(TaskType::Vision, complexity);
            for m in select_models(&c, preference, &catalog(), &matrix) {
                let rating = matrix.rating(&m.id, TaskType::Vision).unwrap();
                assert!(rating >= complexity, "{} rated {} < {}", m.id, rating, complexity);
            }
        }
    }
}

#[test]
fn test_unrated_models_never_qualify() {
    let matrix = CapabilityMatrix::builtin();
    let picked = select_models(
        &classification(TaskType::Text, 1),
        CostPreference::Eco,
        &catalog(),
        &matrix,
    );
    assert!(!ids(&picked).contains(&"my-finetune"));
    assert_eq!(picked.len(), 5);
}

#[test]
fn test_empty_when_nothing_qualifies() {
    let matrix = CapabilityMatrix::builtin();
    let models = vec![ModelInfo::new("openai", "gpt-5-nano").with_cost(0.05, 0.4)];
    let picked = select_models(
        &classification(TaskType::Code, 4),
        CostPreference::Balanced,
        &models,
        &matrix,
    );
    assert!(picked.is_empty());
}
