// ABOUTME: Process registry seam - records spawned child PIDs for session cleanup.
// ABOUTME: Registration is best-effort; failures are logged, never propagated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

/// Host-provided PID tracking.
#[async_trait]
pub trait ProcessRegistry: Send + Sync {
    async fn register(&self, pid: u32, command: &str) -> anyhow::Result<()>;
    async fn unregister(&self, pid: u32) -> anyhow::Result<()>;
}

/// Registry that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcessRegistry;

#[async_trait]
impl ProcessRegistry for NoopProcessRegistry {
    async fn register(&self, _pid: u32, _command: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unregister(&self, _pid: u32) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory registry, mainly for tests and embedding hosts without a PID file.
#[derive(Debug, Clone, Default)]
pub struct MemoryProcessRegistry {
    entries: Arc<Mutex<HashMap<u32, String>>>,
}

impl MemoryProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently registered PIDs with their commands.
    pub fn entries(&self) -> HashMap<u32, String> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessRegistry for MemoryProcessRegistry {
    async fn register(&self, pid: u32, command: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("process registry lock poisoned"))?;
        entries.insert(pid, command.to_string());
        Ok(())
    }

    async fn unregister(&self, pid: u32) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("process registry lock poisoned"))?;
        entries.remove(&pid);
        Ok(())
    }
}

pub(crate) async fn register_best_effort(registry: &dyn ProcessRegistry, pid: u32, command: &str) {
    if let Err(e) = registry.register(pid, command).await {
        tracing::warn!(pid, "failed to register child process: {:#}", e);
    }
}

pub(crate) async fn unregister_best_effort(registry: &dyn ProcessRegistry, pid: u32) {
    if let Err(e) = registry.unregister(pid).await {
        tracing::warn!(pid, "failed to unregister child process: {:#}", e);
    }
}
