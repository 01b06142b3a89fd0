// ABOUTME: Hook system for observing the subagent lifecycle.
// ABOUTME: Provides events, actions, and a registry for hook management.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Events that can trigger hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    /// Fired before a subagent is spawned. Hooks may block it.
    SubagentStart {
        invocation_id: String,
        /// Resolved agent name.
        agent: String,
        /// The name the caller asked for.
        requested_agent: String,
        task: String,
        model: Option<String>,
    },

    /// Fired when a subagent invocation finishes, whatever the outcome.
    SubagentStop {
        invocation_id: String,
        agent: String,
        /// Short outcome label, e.g. `completed` or `tool_denied`.
        outcome: String,
        /// Error message if the subagent did not complete.
        error: Option<String>,
    },

    /// Fired when a policy layer vetoed a tool call inside a subagent.
    ToolDenied {
        invocation_id: String,
        agent: String,
        tool_use_id: String,
        reason: String,
    },
}

impl HookEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HookEvent::SubagentStart { .. } => "SubagentStart",
            HookEvent::SubagentStop { .. } => "SubagentStop",
            HookEvent::ToolDenied { .. } => "ToolDenied",
        }
    }
}

/// Actions a hook can return to control execution flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HookAction {
    /// Continue with normal execution.
    #[default]
    Continue,

    /// Block the action with a message (only honoured for SubagentStart).
    Block(String),
}

/// Trait for implementing hooks.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Called when an event occurs.
    ///
    /// Return `Err` to signal a hook failure (treated as Block for SubagentStart).
    async fn on_event(&self, event: &HookEvent) -> Result<HookAction, anyhow::Error>;

    /// Optional: Filter which events this hook cares about.
    fn accepts(&self, event: &HookEvent) -> bool {
        let _ = event;
        true
    }
}

/// Registry for managing and firing hooks.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn Hook>>>,
}

impl HookRegistry {
    /// Create a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook.
    pub async fn register(&self, hook: impl Hook + 'static) {
        self.hooks.write().await.push(Arc::new(hook));
    }

    /// Register a hook wrapped in Arc.
    pub async fn register_arc(&self, hook: Arc<dyn Hook>) {
        self.hooks.write().await.push(hook);
    }

    /// Fire an event to all registered hooks.
    ///
    /// If any hook blocks, returns Block immediately.
    pub async fn fire(&self, event: &HookEvent) -> Result<HookAction, anyhow::Error> {
        let hooks = self.hooks.read().await;
        for hook in hooks.iter() {
            if !hook.accepts(event) {
                continue;
            }
            if let HookAction::Block(msg) = hook.on_event(event).await? {
                return Ok(HookAction::Block(msg));
            }
        }
        Ok(HookAction::Continue)
    }

    /// Fire an observational event; failures and blocks are logged and ignored.
    pub async fn notify(&self, event: &HookEvent) {
        match self.fire(event).await {
            Ok(HookAction::Continue) => {}
            Ok(HookAction::Block(msg)) => {
                tracing::debug!(event = event.name(), "ignoring block from hook: {}", msg);
            }
            Err(e) => tracing::warn!(event = event.name(), "hook failed: {:#}", e),
        }
    }

    /// Get the number of registered hooks.
    pub async fn len(&self) -> usize {
        self.hooks.read().await.len()
    }

    /// Check if the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.hooks.read().await.is_empty()
    }

    /// Register a hook that only handles SubagentStart events.
    ///
    /// The callback receives (invocation_id, agent, task).
    pub async fn on_subagent_start<F>(&self, f: F)
    where
        F: Fn(&str, &str, &str) -> HookAction + Send + Sync + 'static,
    {
        self.register(SubagentStartHook { callback: f }).await;
    }

    /// Register a hook that only handles SubagentStop events.
    ///
    /// The callback receives (invocation_id, agent, outcome, error).
    pub async fn on_subagent_stop<F>(&self, f: F)
    where
        F: Fn(&str, &str, &str, Option<&str>) + Send + Sync + 'static,
    {
        self.register(SubagentStopHook { callback: f }).await;
    }

    /// Register a hook that only handles ToolDenied events.
    ///
    /// The callback receives (invocation_id, agent, reason).
    pub async fn on_tool_denied<F>(&self, f: F)
    where
        F: Fn(&str, &str, &str) + Send + Sync + 'static,
    {
        self.register(ToolDeniedHook { callback: f }).await;
    }
}

/// Hook wrapper for SubagentStart events.
struct SubagentStartHook<F> {
    callback: F,
}

#[async_trait]
impl<F> Hook for SubagentStartHook<F>
where
    F: Fn(&str, &str, &str) -> HookAction + Send + Sync,
{
    fn accepts(&self, event: &HookEvent) -> bool {
        matches!(event, HookEvent::SubagentStart { .. })
    }

    async fn on_event(&self, event: &HookEvent) -> Result<HookAction, anyhow::Error> {
        if let HookEvent::SubagentStart {
            invocation_id,
            agent,
            task,
            ..
        } = event
        {
            Ok((self.callback)(invocation_id, agent, task))
        } else {
            Ok(HookAction::Continue)
        }
    }
}

/// Hook wrapper for SubagentStop events.
struct SubagentStopHook<F> {
    callback: F,
}

#[async_trait]
impl<F> Hook for SubagentStopHook<F>
where
    F: Fn(&str, &str, &str, Option<&str>) + Send + Sync,
{
    fn accepts(&self, event: &HookEvent) -> bool {
        matches!(event, HookEvent::SubagentStop { .. })
    }

    async fn on_event(&self, event: &HookEvent) -> Result<HookAction, anyhow::Error> {
        if let HookEvent::SubagentStop {
            invocation_id,
            agent,
            outcome,
            error,
        } = event
        {
            (self.callback)(invocation_id, agent, outcome, error.as_deref());
        }
        Ok(HookAction::Continue)
    }
}

/// Hook wrapper for ToolDenied events.
struct ToolDeniedHook<F> {
    callback: F,
}

#[async_trait]
impl<F> Hook for ToolDeniedHook<F>
where
    F: Fn(&str, &str, &str) + Send + Sync,
{
    fn accepts(&self, event: &HookEvent) -> bool {
        matches!(event, HookEvent::ToolDenied { .. })
    }

    async fn on_event(&self, event: &HookEvent) -> Result<HookAction, anyhow::Error> {
        if let HookEvent::ToolDenied {
            invocation_id,
            agent,
            reason,
            ..
        } = event
        {
            (self.callback)(invocation_id, agent, reason);
        }
        Ok(HookAction::Continue)
    }
}
