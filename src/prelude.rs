// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use fleet::prelude::*;` to get started quickly.

pub use crate::agent::{
    AgentCatalog, AgentConfig, AgentDefaults, AgentDirectories, AgentScope, IsolationMode,
    Resolution, ResolvedAgent,
};
pub use crate::background::{BackgroundManager, BackgroundStatus, BackgroundSubagent, RetentionPolicy};
pub use crate::error::{AgentError, FleetError, LlmError, RequestError, RouteFailure, SupervisorError};
pub use crate::hook::{Hook, HookAction, HookEvent, HookRegistry};
pub use crate::llm::{ClientFactory, ContentBlock, LlmClient, Message, Request, Response, Role, Usage};
pub use crate::model::{
    CapabilityMatrix, ModelInfo, ModelRegistry, RegistrySnapshot, StaticModelRegistry, TaskType,
};
pub use crate::orchestrator::{
    InvocationResult, OrchestrationOutcome, OrchestrationRequest, Orchestrator,
    OrchestratorOptions, Outcome, TaskSpec,
};
pub use crate::routing::{
    load_routing_config, CostPreference, ModelRouter, RoutingConfig, RoutingOverrides,
    TaskClassifier,
};
pub use crate::supervisor::{ProcessSupervisor, SpawnRequest, Supervisor};
