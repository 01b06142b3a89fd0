// ABOUTME: Background lifecycle for detached subagents - status tracking,
// ABOUTME: stall detection and history compaction after completion.

mod manager;
mod retention;

pub use manager::{BackgroundManager, BackgroundStatus, BackgroundSubagent};
pub use retention::{
    compact_history, Compaction, RetentionPolicy, DEFAULT_RETAINED_MESSAGES, KEEP_HISTORY_ENV,
    RETAIN_ENV,
};
