// ABOUTME: Tool-call denial detection over a subagent's message stream.
// ABOUTME: An explicit denial flag wins; otherwise error results are matched by phrase.

use serde::Serialize;

use crate::llm::{ContentBlock, Message};

/// Phrases that mark an error tool result as a policy or user veto.
pub const DENIAL_PHRASES: &[&str] = &[
    "permission denied",
    "user denied",
    "user declined",
    "request denied",
    "denied by policy",
    "blocked by policy",
];

/// A tool call that was vetoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDenial {
    pub tool_use_id: String,
    pub reason: String,
}

/// Find the first denied tool call, preferring explicitly flagged results.
pub fn detect_denial(messages: &[Message]) -> Option<ToolDenial> {
    let errors = || {
        messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                    denied,
                } if *is_error || *denied => Some((tool_use_id, content, *denied)),
                _ => None,
            })
    };

    let to_denial = |(id, content, _): (&String, &String, bool)| ToolDenial {
        tool_use_id: id.clone(),
        reason: content.clone(),
    };

    if let Some(flagged) = errors().find(|(_, _, denied)| *denied) {
        return Some(to_denial(flagged));
    }
    errors()
        .find(|(_, content, _)| matches_denial_phrase(content))
        .map(to_denial)
}

fn matches_denial_phrase(text: &str) -> bool {
    let text = text.to_lowercase();
    DENIAL_PHRASES.iter().any(|phrase| text.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_flag_wins() {
        let messages = vec![
            Message::tool_results(vec![ContentBlock::tool_error("t1", "Permission denied: /etc")]),
            Message::tool_results(vec![ContentBlock::tool_denied("t2", "not allowed here")]),
        ];
        let denial = detect_denial(&messages).unwrap();
        assert_eq!(denial.tool_use_id, "t2");
        assert_eq!(denial.reason, "not allowed here");
    }

    #[test]
    fn test_phrase_match_is_case_insensitive() {
        let messages = vec![
            Message::assistant("running bash"),
            Message::tool_results(vec![ContentBlock::tool_error("t1", "The USER DECLINED this call")]),
        ];
        assert_eq!(detect_denial(&messages).unwrap().tool_use_id, "t1");
    }

    #[test]
    fn test_ordinary_failure_is_not_a_denial() {
        let messages = vec![Message::tool_results(vec![ContentBlock::tool_error(
            "t1",
            "command exited with status 1",
        )])];
        assert!(detect_denial(&messages).is_none());
    }

    #[test]
    fn test_successful_results_are_not_scanned() {
        let messages = vec![Message::tool_results(vec![ContentBlock::tool_result(
            "t1",
            "grep found: 'permission denied' in logs",
        )])];
        assert!(detect_denial(&messages).is_none());
        assert!(detect_denial(&[]).is_none());
    }
}
