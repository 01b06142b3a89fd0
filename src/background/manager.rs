// ABOUTME: Background lifecycle manager - tracks detached subagents, their status
// ABOUTME: and history, and compacts that history once they finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::retention::{compact_history, RetentionPolicy};
use crate::llm::Message;
use crate::orchestrator::InvocationResult;

/// Lifecycle state of a background subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundStatus {
    Running,
    Completed,
    Failed,
    /// Running, but silent for longer than the stall threshold.
    Stalled,
}

impl BackgroundStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, BackgroundStatus::Completed | BackgroundStatus::Failed)
    }
}

impl std::fmt::Display for BackgroundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackgroundStatus::Running => write!(f, "running"),
            BackgroundStatus::Completed => write!(f, "completed"),
            BackgroundStatus::Failed => write!(f, "failed"),
            BackgroundStatus::Stalled => write!(f, "stalled"),
        }
    }
}

/// Snapshot of one background subagent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSubagent {
    pub id: String,
    pub agent: String,
    pub task: String,
    pub pid: Option<u32>,
    pub status: BackgroundStatus,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    /// Final invocation result; its messages live in `history`.
    pub result: Option<InvocationResult>,
    pub error: Option<String>,
    pub history: Vec<Message>,
    pub history_compacted: bool,
    pub history_original_message_count: usize,
    pub history_retained_message_count: usize,
    pub retained_final_output: Option<String>,
}

impl BackgroundSubagent {
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// What the subagent concluded, if it said anything.
    pub fn final_output(&self) -> Option<&str> {
        self.retained_final_output.as_deref()
    }
}

struct Tracked {
    info: BackgroundSubagent,
    cancel: CancellationToken,
    done: Arc<Notify>,
    last_activity: Instant,
}

/// Tracks background subagents for one host session.
pub struct BackgroundManager {
    entries: Arc<Mutex<HashMap<String, Tracked>>>,
    policy: RetentionPolicy,
}

impl BackgroundManager {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            policy,
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Tracked>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a subagent. `cancel` is what [`cancel`](Self::cancel) trips.
    pub fn register(&self, agent: &str, task: &str, cancel: CancellationToken) -> String {
        let id = format!("bg-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let info = BackgroundSubagent {
            id: id.clone(),
            agent: agent.to_string(),
            task: task.to_string(),
            pid: None,
            status: BackgroundStatus::Running,
            started_at_ms: now_ms(),
            finished_at_ms: None,
            result: None,
            error: None,
            history: Vec::new(),
            history_compacted: false,
            history_original_message_count: 0,
            history_retained_message_count: 0,
            retained_final_output: None,
        };
        self.lock().insert(
            id.clone(),
            Tracked {
                info,
                cancel,
                done: Arc::new(Notify::new()),
                last_activity: Instant::now(),
            },
        );
        tracing::info!(%id, agent, "registered background subagent");
        id
    }

    pub fn set_pid(&self, id: &str, pid: u32) {
        if let Some(tracked) = self.lock().get_mut(id) {
            tracked.info.pid = Some(pid);
        }
    }

    /// Append a message from a running subagent; clears a stall.
    pub fn record_message(&self, id: &str, message: Message) {
        let mut entries = self.lock();
        let Some(tracked) = entries.get_mut(id) else {
            return;
        };
        if tracked.info.is_finished() {
            return;
        }
        tracked.info.history.push(message);
        tracked.last_activity = Instant::now();
        if tracked.info.status == BackgroundStatus::Stalled {
            tracing::info!(id, "background subagent resumed activity");
            tracked.info.status = BackgroundStatus::Running;
        }
    }

    /// Record the final result and compact the history.
    pub fn complete(&self, id: &str, mut result: InvocationResult) {
        let mut entries = self.lock();
        let Some(tracked) = entries.get_mut(id) else {
            tracing::debug!(id, "dropping result for untracked background subagent");
            return;
        };

        let info = &mut tracked.info;
        if !result.messages.is_empty() {
            info.history = std::mem::take(&mut result.messages);
        }
        info.pid = None;
        info.status = if result.is_success() {
            BackgroundStatus::Completed
        } else {
            BackgroundStatus::Failed
        };
        info.error = result.outcome.error();
        info.finished_at_ms = Some(now_ms());

        let compaction = compact_history(&mut info.history, self.policy);
        info.history_compacted = compaction.compacted;
        info.history_original_message_count = compaction.original_message_count;
        info.history_retained_message_count = compaction.retained_message_count;
        info.retained_final_output = compaction
            .final_output
            .or_else(|| (!result.final_output.is_empty()).then(|| result.final_output.clone()));
        info.result = Some(result);

        tracing::info!(
            id,
            status = %info.status,
            original = compaction.original_message_count,
            retained = compaction.retained_message_count,
            "background subagent finished"
        );
        tracked.done.notify_waiters();
    }

    /// Mark a subagent failed without a result.
    pub fn fail(&self, id: &str, error: impl Into<String>) {
        let mut entries = self.lock();
        let Some(tracked) = entries.get_mut(id) else {
            return;
        };
        let info = &mut tracked.info;
        info.pid = None;
        info.status = BackgroundStatus::Failed;
        info.error = Some(error.into());
        info.finished_at_ms = Some(now_ms());

        let compaction = compact_history(&mut info.history, self.policy);
        info.history_compacted = compaction.compacted;
        info.history_original_message_count = compaction.original_message_count;
        info.history_retained_message_count = compaction.retained_message_count;
        info.retained_final_output = compaction.final_output;
        tracked.done.notify_waiters();
    }

    /// Mark running subagents silent for longer than `threshold` as stalled.
    /// Returns the ids newly marked.
    pub fn check_stalls(&self, threshold: Duration) -> Vec<String> {
        let mut stalled = Vec::new();
        for (id, tracked) in self.lock().iter_mut() {
            if tracked.info.status == BackgroundStatus::Running
                && tracked.last_activity.elapsed() >= threshold
            {
                tracked.info.status = BackgroundStatus::Stalled;
                tracing::warn!(%id, agent = %tracked.info.agent, "background subagent stalled");
                stalled.push(id.clone());
            }
        }
        stalled.sort();
        stalled
    }

    pub fn get(&self, id: &str) -> Option<BackgroundSubagent> {
        self.lock().get(id).map(|t| t.info.clone())
    }

    /// All tracked subagents, oldest first.
    pub fn list(&self) -> Vec<BackgroundSubagent> {
        let mut all: Vec<_> = self.lock().values().map(|t| t.info.clone()).collect();
        all.sort_by(|a, b| a.started_at_ms.cmp(&b.started_at_ms).then(a.id.cmp(&b.id)));
        all
    }

    /// Wait up to `timeout` for a subagent to finish, returning its latest state.
    pub async fn wait(&self, id: &str, timeout: Duration) -> Option<BackgroundSubagent> {
        let done = {
            let entries = self.lock();
            let tracked = entries.get(id)?;
            if tracked.info.is_finished() {
                return Some(tracked.info.clone());
            }
            tracked.done.clone()
        };

        let notified = done.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        // It may have finished between the check and enabling the waiter.
        if self.get(id)?.is_finished() {
            return self.get(id);
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.get(id)
    }

    /// Ask a running subagent to stop. Returns false if it already finished.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().get(id) {
            Some(tracked) if !tracked.info.is_finished() => {
                tracing::info!(id, "cancelling background subagent");
                tracked.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Remove a finished subagent and hand back its final state.
    ///
    /// Running subagents are left in place and `None` is returned.
    pub fn consume(&self, id: &str) -> Option<BackgroundSubagent> {
        let mut entries = self.lock();
        if !entries.get(id)?.info.is_finished() {
            return None;
        }
        entries.remove(id).map(|t| t.info)
    }

    /// Cancel everything still running and drop all tracking.
    /// Returns how many subagents were still running.
    pub fn shutdown(&self) -> usize {
        let mut entries = self.lock();
        let mut running = 0;
        for tracked in entries.values() {
            if !tracked.info.is_finished() {
                tracked.cancel.cancel();
                running += 1;
            }
            tracked.done.notify_waiters();
        }
        entries.clear();
        if running > 0 {
            tracing::info!(running, "background subagents cancelled at shutdown");
        }
        running
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for BackgroundManager {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl Clone for BackgroundManager {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            policy: self.policy,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{IsolationMode, Resolution};
    use crate::llm::{ContentBlock, Usage};
    use crate::orchestrator::Outcome;

    fn finished(messages: Vec<Message>, outcome: Outcome) -> InvocationResult {
        let final_output = crate::llm::final_assistant_text(&messages).unwrap_or_default();
        InvocationResult {
            id: "inv-1".into(),
            agent: "scout".into(),
            requested_agent: "scout".into(),
            resolution: Resolution::Exact,
            task: "map the repo".into(),
            model: None,
            isolation: IsolationMode::None,
            outcome,
            exit_code: Some(0),
            stderr: String::new(),
            messages,
            final_output,
            usage: Usage::default(),
            turns: 1,
            duration_ms: 1,
        }
    }

    fn long_history() -> Vec<Message> {
        let mut messages = vec![Message::user("Task: map the repo")];
        for i in 0..6 {
            messages.push(Message::assistant(format!("looking at dir {i}")));
            messages.push(Message::tool_results(vec![ContentBlock::tool_result(
                format!("t{i}"),
                "listing",
            )]));
        }
        messages.push(Message::assistant("The repo has three crates."));
        messages
    }

    #[tokio::test]
    async fn test_complete_compacts_and_keeps_final_output() {
        let manager = BackgroundManager::new(RetentionPolicy::default().retain(2));
        let id = manager.register("scout", "map the repo", CancellationToken::new());

        manager.complete(&id, finished(long_history(), Outcome::Completed));

        let entry = manager.get(&id).unwrap();
        assert_eq!(entry.status, BackgroundStatus::Completed);
        assert!(entry.history_compacted);
        assert_eq!(entry.history_original_message_count, 14);
        assert_eq!(entry.history_retained_message_count, 2);
        assert_eq!(entry.history.len(), 2);
        assert_eq!(entry.final_output(), Some("The repo has three crates."));
        assert!(entry.result.as_ref().unwrap().messages.is_empty());
        assert!(entry.finished_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_failed_result_marks_failed_with_error() {
        let manager = BackgroundManager::default();
        let id = manager.register("scout", "t", CancellationToken::new());
        manager.complete(
            &id,
            finished(vec![], Outcome::ProcessFailed { exit_code: Some(1) }),
        );
        let entry = manager.get(&id).unwrap();
        assert_eq!(entry.status, BackgroundStatus::Failed);
        assert_eq!(entry.error.as_deref(), Some("process exited with status 1"));
        assert_eq!(entry.final_output(), None);
    }

    #[tokio::test]
    async fn test_recorded_messages_used_when_result_has_none() {
        let manager = BackgroundManager::default();
        let id = manager.register("scout", "t", CancellationToken::new());
        manager.record_message(&id, Message::assistant("partial"));
        manager.fail(&id, "child vanished");

        let entry = manager.get(&id).unwrap();
        assert_eq!(entry.status, BackgroundStatus::Failed);
        assert_eq!(entry.history.len(), 1);
        assert_eq!(entry.final_output(), Some("partial"));
    }

    #[tokio::test]
    async fn test_stall_and_recovery() {
        let manager = BackgroundManager::default();
        let id = manager.register("scout", "t", CancellationToken::new());

        assert_eq!(manager.check_stalls(Duration::ZERO), vec![id.clone()]);
        assert_eq!(manager.get(&id).unwrap().status, BackgroundStatus::Stalled);
        // Already stalled entries are not reported twice.
        assert!(manager.check_stalls(Duration::ZERO).is_empty());

        manager.record_message(&id, Message::assistant("still here"));
        assert_eq!(manager.get(&id).unwrap().status, BackgroundStatus::Running);
        assert!(manager.check_stalls(Duration::from_secs(3600)).is_empty());
    }

    #[tokio::test]
    async fn test_wait_returns_when_completed() {
        let manager = BackgroundManager::default();
        let id = manager.register("scout", "t", CancellationToken::new());

        let waiter = {
            let manager = manager.clone();
            let id = id.clone();
            tokio::spawn(async move { manager.wait(&id, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        manager.complete(&id, finished(vec![Message::assistant("done")], Outcome::Completed));

        let entry = waiter.await.unwrap().unwrap();
        assert_eq!(entry.status, BackgroundStatus::Completed);
    }

    #[tokio::test]
    async fn test_wait_times_out_while_running() {
        let manager = BackgroundManager::default();
        let id = manager.register("scout", "t", CancellationToken::new());
        let entry = manager.wait(&id, Duration::from_millis(10)).await.unwrap();
        assert_eq!(entry.status, BackgroundStatus::Running);
        assert!(manager.wait("bg-missing", Duration::from_millis(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_and_consume() {
        let manager = BackgroundManager::default();
        let token = CancellationToken::new();
        let id = manager.register("scout", "t", token.clone());

        assert!(manager.consume(&id).is_none());
        assert!(manager.cancel(&id));
        assert!(token.is_cancelled());

        manager.complete(&id, finished(vec![], Outcome::Cancelled));
        assert!(!manager.cancel(&id));
        let consumed = manager.consume(&id).unwrap();
        assert_eq!(consumed.status, BackgroundStatus::Failed);
        assert!(manager.get(&id).is_none());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_entries() {
        let manager = BackgroundManager::default();
        let running = CancellationToken::new();
        let done = CancellationToken::new();
        manager.register("a", "t", running.clone());
        let finished_id = manager.register("b", "t", done.clone());
        manager.complete(&finished_id, finished(vec![], Outcome::Completed));

        assert_eq!(manager.list().len(), 2);
        assert_eq!(manager.shutdown(), 1);
        assert!(running.is_cancelled());
        assert!(!done.is_cancelled());
        assert_eq!(manager.len(), 0);
    }
}
