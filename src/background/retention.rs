// ABOUTME: Retention policy for finished background subagents - keeps a short
// ABOUTME: history tail and always the final assistant output.

use crate::llm::{final_assistant_text, Message};

/// Set to `1` to keep full background histories.
pub const KEEP_HISTORY_ENV: &str = "FLEET_KEEP_BACKGROUND_HISTORY";

/// Number of trailing messages kept after compaction.
pub const RETAIN_ENV: &str = "FLEET_BACKGROUND_RETAIN";

pub const DEFAULT_RETAINED_MESSAGES: usize = 4;

/// How much of a finished background subagent's history to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep_full_history: bool,
    /// Tail length kept; never below 1.
    pub retained_messages: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_full_history: false,
            retained_messages: DEFAULT_RETAINED_MESSAGES,
        }
    }
}

impl RetentionPolicy {
    /// Policy from the environment, falling back to defaults on bad values.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var(KEEP_HISTORY_ENV).ok().as_deref(),
            std::env::var(RETAIN_ENV).ok().as_deref(),
        )
    }

    fn from_vars(keep: Option<&str>, retain: Option<&str>) -> Self {
        let keep_full_history = matches!(keep.map(str::trim), Some("1") | Some("true"));
        let retained_messages = match retain.map(str::trim) {
            None | Some("") => DEFAULT_RETAINED_MESSAGES,
            Some(raw) => raw.parse::<usize>().unwrap_or_else(|_| {
                tracing::warn!(value = raw, "invalid {}; using {}", RETAIN_ENV, DEFAULT_RETAINED_MESSAGES);
                DEFAULT_RETAINED_MESSAGES
            }),
        };
        Self {
            keep_full_history,
            retained_messages: retained_messages.max(1),
        }
    }

    pub fn retain(mut self, messages: usize) -> Self {
        self.retained_messages = messages.max(1);
        self
    }

    pub fn keep_full_history(mut self, keep: bool) -> Self {
        self.keep_full_history = keep;
        self
    }
}

/// What compaction did to a history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    pub compacted: bool,
    pub original_message_count: usize,
    pub retained_message_count: usize,
    pub final_output: Option<String>,
}

/// Trim `history` in place under `policy`, returning what was kept.
///
/// The final assistant output is captured before trimming, so it survives
/// even when the tail no longer contains it.
pub fn compact_history(history: &mut Vec<Message>, policy: RetentionPolicy) -> Compaction {
    let original = history.len();
    let final_output = final_assistant_text(history);

    if policy.keep_full_history || original <= policy.retained_messages {
        return Compaction {
            compacted: false,
            original_message_count: original,
            retained_message_count: original,
            final_output,
        };
    }

    history.drain(..original - policy.retained_messages);
    Compaction {
        compacted: true,
        original_message_count: original,
        retained_message_count: history.len(),
        final_output,
    }
}
