// ABOUTME: Fuzzy model resolution - maps a free-form model query onto a registry
// ABOUTME: model through a cascade of exact, normalized, provider, token and substring tiers.

use std::collections::HashSet;

use super::ModelInfo;

/// Resolve a free-form query to a model, trying each tier in order.
///
/// Returns `None` when no tier matches; callers treat that as "this hint
/// cannot be routed", not as an error.
pub fn resolve_model_fuzzy<'a>(query: &str, models: &'a [ModelInfo]) -> Option<&'a ModelInfo> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }

    if let Some(m) = models.iter().find(|m| m.id == query) {
        return Some(m);
    }

    if let Some(m) = models.iter().find(|m| m.id.eq_ignore_ascii_case(query)) {
        return Some(m);
    }

    let normalized = normalize(query);
    if !normalized.is_empty() {
        if let Some(m) = models.iter().find(|m| normalize(&m.id) == normalized) {
            return Some(m);
        }
    }

    if let Some(m) = resolve_provider_qualified(query, models) {
        return Some(m);
    }

    if let Some(m) = best_token_overlap(query, models) {
        return Some(m);
    }

    let needle = query.to_lowercase();
    models.iter().find(|m| {
        m.id.to_lowercase().contains(&needle) || m.display_name().to_lowercase().contains(&needle)
    })
}

/// Lowercase and strip every non-alphanumeric separator.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `provider/id` form, where the provider must be one the registry exposes.
fn resolve_provider_qualified<'a>(query: &str, models: &'a [ModelInfo]) -> Option<&'a ModelInfo> {
    let (provider, id) = query.split_once('/')?;
    let known = models
        .iter()
        .any(|m| m.provider.eq_ignore_ascii_case(provider));
    if !known {
        return None;
    }
    let under_provider = || {
        models
            .iter()
            .filter(move |m| m.provider.eq_ignore_ascii_case(provider))
    };
    under_provider()
        .find(|m| m.id.eq_ignore_ascii_case(id))
        .or_else(|| {
            let normalized = normalize(id);
            under_provider().find(|m| !normalized.is_empty() && normalize(&m.id) == normalized)
        })
}

fn tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Most query tokens shared with a display name; ties go to the shorter id.
fn best_token_overlap<'a>(query: &str, models: &'a [ModelInfo]) -> Option<&'a ModelInfo> {
    let wanted = tokens(query);
    if wanted.is_empty() {
        return None;
    }

    let mut best: Option<(&ModelInfo, usize)> = None;
    for model in models {
        let overlap = tokens(model.display_name()).intersection(&wanted).count();
        if overlap == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((current, score)) => {
                overlap > score || (overlap == score && model.id.len() < current.id.len())
            }
        };
        if better {
            best = Some((model, overlap));
        }
    }
    best.map(|(m, _)| m)
}
