// ABOUTME: Orchestrator - resolves agents and models, then runs subagents in single,
// ABOUTME: parallel or chain mode, or hands a single run to the background manager.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::denial::detect_denial;
use super::request::{substitute_previous, Mode, OrchestrationRequest, TaskSpec};
use super::result::{InvocationResult, OrchestrationOutcome, Outcome};
use crate::agent::{
    effective_tools, resolve_isolation, AgentCatalog, IsolationMode, ResolvedAgent, BUILTIN_TOOLS,
};
use crate::background::BackgroundManager;
use crate::coordinator::ConcurrencyLimiter;
use crate::error::{AgentError, FleetError, RequestError, RouteFailure};
use crate::hook::{HookAction, HookEvent, HookRegistry};
use crate::llm::{final_assistant_text, Role, Usage};
use crate::model::{CapabilityMatrix, ModelRegistry, RegistrySnapshot};
use crate::routing::{ModelRouter, RoutingConfig, RoutingOverrides, TaskClassifier};
use crate::supervisor::{SpawnRequest, Supervisor, Worktree};

/// Most tasks a parallel call may carry.
pub const MAX_PARALLEL_TASKS: usize = 8;

/// Most invocations a parallel call runs at once.
pub const MAX_CONCURRENCY: usize = 4;

/// Tunables for an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub max_tasks: usize,
    pub max_concurrency: usize,
    /// Tools handed to agents that declare no allowlist.
    pub builtin_tools: Vec<String>,
    /// Model the calling agent runs on; used when routing cannot pick one.
    pub parent_model: Option<String>,
    /// Agents the caller itself may spawn. `None` means any.
    pub allowed_agent_types: Option<Vec<String>>,
    /// Working directory for requests that name none.
    pub cwd: PathBuf,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_tasks: MAX_PARALLEL_TASKS,
            max_concurrency: MAX_CONCURRENCY,
            builtin_tools: BUILTIN_TOOLS.iter().map(|t| t.to_string()).collect(),
            parent_model: None,
            allowed_agent_types: None,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl OrchestratorOptions {
    pub fn parent_model(mut self, model: impl Into<String>) -> Self {
        self.parent_model = Some(model.into());
        self
    }

    pub fn allowed_agent_types(mut self, names: Vec<String>) -> Self {
        self.allowed_agent_types = Some(names);
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn builtin_tools(mut self, tools: Vec<String>) -> Self {
        self.builtin_tools = tools;
        self
    }
}

/// A task whose agent, isolation and directory are settled, ready to spawn.
#[derive(Debug, Clone)]
struct Prepared {
    agent: ResolvedAgent,
    task: String,
    cwd: PathBuf,
    model_hint: Option<String>,
    isolation: IsolationMode,
}

/// Runs subagents on behalf of a calling agent.
///
/// Cloning is cheap; clones share the supervisor, hooks and background state.
#[derive(Clone)]
pub struct Orchestrator {
    catalog: Arc<AgentCatalog>,
    registry: Arc<dyn ModelRegistry>,
    supervisor: Arc<dyn Supervisor>,
    routing: RoutingConfig,
    classifier: TaskClassifier,
    matrix: Option<CapabilityMatrix>,
    hooks: Arc<HookRegistry>,
    background: BackgroundManager,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Create an orchestrator with routing defaults and a fallback-only classifier.
    pub fn new(
        catalog: AgentCatalog,
        registry: Arc<dyn ModelRegistry>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            registry,
            supervisor,
            routing: RoutingConfig::default(),
            classifier: TaskClassifier::disabled(),
            matrix: None,
            hooks: Arc::new(HookRegistry::new()),
            background: BackgroundManager::new(crate::background::RetentionPolicy::from_env()),
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_routing_config(mut self, config: RoutingConfig) -> Self {
        self.routing = config;
        self
    }

    pub fn with_classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the capability matrix used for routing.
    pub fn with_matrix(mut self, matrix: CapabilityMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_background(mut self, background: BackgroundManager) -> Self {
        self.background = background;
        self
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn background(&self) -> &BackgroundManager {
        &self.background
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Run one orchestration call.
    ///
    /// Every agent is resolved before anything is spawned, so resolution
    /// errors fail the whole call. Per-invocation failures are reported in
    /// the outcome rather than as errors.
    pub async fn run(
        &self,
        request: OrchestrationRequest,
        cancel: CancellationToken,
    ) -> Result<OrchestrationOutcome, FleetError> {
        let mode = request.validate(self.options.max_tasks)?;
        tracing::info!(mode = mode.name(), "starting orchestration");

        let specs = match &mode {
            Mode::Single(spec) => std::slice::from_ref(spec),
            Mode::Parallel(specs) | Mode::Chain(specs) => specs.as_slice(),
        };
        let prepared = specs
            .iter()
            .map(|spec| self.prepare(spec, &request))
            .collect::<Result<Vec<_>, _>>()?;

        let router = Arc::new(self.router().await);
        let overrides = request.routing.clone();

        let outcome = match mode {
            Mode::Single(_) => {
                let Some(task) = prepared.into_iter().next() else {
                    return Err(RequestError::IncompleteSingle.into());
                };
                if request.background {
                    self.start_background(task, router, overrides)
                } else {
                    let result = self.invoke(task, &router, overrides.as_ref(), &cancel, None).await;
                    OrchestrationOutcome::Single { result }
                }
            }
            Mode::Parallel(_) => self.run_parallel(prepared, router, overrides, cancel).await,
            Mode::Chain(_) => self.run_chain(prepared, &router, overrides.as_ref(), &cancel).await,
        };

        tracing::info!(
            mode = outcome.mode(),
            success = outcome.is_success(),
            "orchestration finished"
        );
        Ok(outcome)
    }

    /// Build a router over a fresh registry snapshot.
    async fn router(&self) -> ModelRouter {
        let snapshot = Arc::new(RegistrySnapshot::capture(self.registry.clone()).await);
        let router = ModelRouter::new(snapshot, self.routing.clone(), self.classifier.clone());
        match &self.matrix {
            Some(matrix) => router.with_matrix(matrix.clone()),
            None => router,
        }
    }

    fn prepare(&self, spec: &TaskSpec, request: &OrchestrationRequest) -> Result<Prepared, AgentError> {
        let agent = self.catalog.resolve(&spec.agent)?;

        if let Some(allowed) = &self.options.allowed_agent_types {
            if !allowed.iter().any(|name| name == &agent.config.name) {
                return Err(AgentError::NotAllowed {
                    name: agent.config.name.clone(),
                    allowed: allowed.clone(),
                });
            }
        }

        let isolation =
            resolve_isolation(request.isolation, &agent.config, self.catalog.defaults());
        let cwd = spec
            .cwd
            .clone()
            .or_else(|| request.cwd.clone())
            .unwrap_or_else(|| self.options.cwd.clone());
        let model_hint = spec.model.clone().or_else(|| request.model.clone());

        Ok(Prepared {
            agent,
            task: spec.task.clone(),
            cwd,
            model_hint,
            isolation,
        })
    }

    async fn run_parallel(
        &self,
        prepared: Vec<Prepared>,
        router: Arc<ModelRouter>,
        overrides: Option<RoutingOverrides>,
        cancel: CancellationToken,
    ) -> OrchestrationOutcome {
        let limiter = ConcurrencyLimiter::new(self.options.max_concurrency.max(1));
        let placeholders: Vec<InvocationResult> =
            prepared.iter().map(|p| self.pending_result(p)).collect();

        let mut set = JoinSet::new();
        for (index, task) in prepared.into_iter().enumerate() {
            let this = self.clone();
            let limiter = limiter.clone();
            let router = router.clone();
            let overrides = overrides.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = match limiter.acquire(cancel.cancelled()).await {
                    Ok(permit) => {
                        let result = this
                            .invoke(task, &router, overrides.as_ref(), &cancel, None)
                            .await;
                        drop(permit);
                        result
                    }
                    Err(_) => this.finish(this.pending_result(&task), Outcome::Cancelled, Instant::now()),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<InvocationResult>> = vec![None; placeholders.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!("parallel invocation task failed: {}", e),
            }
        }

        let results = slots
            .into_iter()
            .zip(placeholders)
            .map(|(slot, placeholder)| {
                slot.unwrap_or_else(|| {
                    self.finish(
                        placeholder,
                        Outcome::SpawnFailed {
                            message: "invocation task aborted".to_string(),
                        },
                        Instant::now(),
                    )
                })
            })
            .collect();
        OrchestrationOutcome::Parallel { results }
    }

    async fn run_chain(
        &self,
        prepared: Vec<Prepared>,
        router: &ModelRouter,
        overrides: Option<&RoutingOverrides>,
        cancel: &CancellationToken,
    ) -> OrchestrationOutcome {
        let mut steps = Vec::with_capacity(prepared.len());
        let mut previous = String::new();
        let mut stopped_at = None;

        for (index, mut step) in prepared.into_iter().enumerate() {
            step.task = substitute_previous(&step.task, &previous);
            let result = self.invoke(step, router, overrides, cancel, None).await;
            let ok = result.is_success();
            previous = result.final_output.clone();
            steps.push(result);
            if !ok {
                tracing::info!(step = index, "chain stopped");
                stopped_at = Some(index);
                break;
            }
        }

        OrchestrationOutcome::Chain { steps, stopped_at }
    }

    fn start_background(
        &self,
        task: Prepared,
        router: Arc<ModelRouter>,
        overrides: Option<RoutingOverrides>,
    ) -> OrchestrationOutcome {
        let token = CancellationToken::new();
        let agent = task.agent.config.name.clone();
        let id = self.background.register(&agent, &task.task, token.clone());

        let this = self.clone();
        let bg_id = id.clone();
        tokio::spawn(async move {
            let result = this
                .invoke(task, &router, overrides.as_ref(), &token, Some(bg_id.as_str()))
                .await;
            this.background.complete(&bg_id, result);
        });

        OrchestrationOutcome::Background { id, agent }
    }

    /// Pick the model string handed to the child.
    ///
    /// An explicit hint wins; otherwise routing decides. When routing cannot
    /// pick, the parent model is inherited if there is one.
    async fn choose_model(
        &self,
        router: &ModelRouter,
        task: &Prepared,
        overrides: Option<&RoutingOverrides>,
    ) -> Result<Option<String>, RouteFailure> {
        let hint = task
            .model_hint
            .as_deref()
            .or(task.agent.config.model.as_deref());

        match router.route_model(&task.task, hint, overrides).await {
            Ok(routed) => Ok(Some(routed.model.qualified_id())),
            Err(RouteFailure::UnresolvedHint { hint }) => {
                tracing::warn!(%hint, "model hint matched nothing; passing it through");
                Ok(Some(hint))
            }
            Err(RouteFailure::Disabled) => Ok(self.options.parent_model.clone()),
            Err(failure) => match &self.options.parent_model {
                Some(parent) => {
                    tracing::warn!(%failure, model = %parent, "routing failed; inheriting parent model");
                    Ok(Some(parent.clone()))
                }
                None => Err(failure),
            },
        }
    }

    /// Run one prepared task to completion. Never fails; failures are outcomes.
    async fn invoke(
        &self,
        task: Prepared,
        router: &ModelRouter,
        overrides: Option<&RoutingOverrides>,
        cancel: &CancellationToken,
        background_id: Option<&str>,
    ) -> InvocationResult {
        let started = Instant::now();
        let mut result = self.pending_result(&task);

        if cancel.is_cancelled() {
            return self.finish(result, Outcome::Cancelled, started);
        }

        match self.choose_model(router, &task, overrides).await {
            Ok(model) => result.model = model,
            Err(failure) => {
                tracing::warn!(agent = %result.agent, %failure, "no usable model");
                let outcome = Outcome::Unroutable {
                    reason: failure.to_string(),
                };
                return self.finish(result, outcome, started);
            }
        }

        let start = HookEvent::SubagentStart {
            invocation_id: result.id.clone(),
            agent: result.agent.clone(),
            requested_agent: result.requested_agent.clone(),
            task: result.task.clone(),
            model: result.model.clone(),
        };
        let outcome = match self.hooks.fire(&start).await {
            Ok(HookAction::Continue) => self.execute(&task, &mut result, cancel, background_id).await,
            Ok(HookAction::Block(reason)) => Outcome::Blocked { reason },
            Err(e) => Outcome::Blocked {
                reason: e.to_string(),
            },
        };

        self.hooks
            .notify(&HookEvent::SubagentStop {
                invocation_id: result.id.clone(),
                agent: result.agent.clone(),
                outcome: outcome.label().to_string(),
                error: outcome.error(),
            })
            .await;
        self.finish(result, outcome, started)
    }

    /// Spawn the child, stream its messages and classify how it ended.
    async fn execute(
        &self,
        task: &Prepared,
        result: &mut InvocationResult,
        cancel: &CancellationToken,
        background_id: Option<&str>,
    ) -> Outcome {
        let agent = &task.agent.config;

        let worktree = match task.isolation {
            IsolationMode::Worktree => match Worktree::create(&task.cwd).await {
                Ok(worktree) => Some(worktree),
                Err(e) => {
                    return Outcome::SpawnFailed {
                        message: e.to_string(),
                    };
                }
            },
            IsolationMode::None => None,
        };
        let cwd = worktree
            .as_ref()
            .map(|w| w.path().to_path_buf())
            .unwrap_or_else(|| task.cwd.clone());

        let mut request = SpawnRequest::new(&agent.name, &task.task, cwd)
            .tools(effective_tools(agent, &self.options.builtin_tools))
            .max_turns(agent.max_turns)
            .system_prompt(&agent.system_prompt)
            .allowed_agent_types(agent.allowed_agent_types.clone());
        if let Some(model) = &result.model {
            request = request.model(model);
        }

        let outcome = self.supervise(request, result, cancel, background_id).await;

        if let Some(worktree) = worktree {
            worktree.remove().await;
        }
        outcome
    }

    async fn supervise(
        &self,
        request: SpawnRequest,
        result: &mut InvocationResult,
        cancel: &CancellationToken,
        background_id: Option<&str>,
    ) -> Outcome {
        let mut child = match self.supervisor.spawn(request).await {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(agent = %result.agent, "spawn failed: {}", e);
                return Outcome::SpawnFailed {
                    message: e.to_string(),
                };
            }
        };
        if let (Some(id), Some(pid)) = (background_id, child.pid()) {
            self.background.set_pid(id, pid);
        }

        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    tracing::info!(agent = %result.agent, "cancelling subagent");
                    if let Err(e) = child.signal().await {
                        tracing::warn!(agent = %result.agent, "failed to signal child: {}", e);
                    }
                }
                message = child.next_message() => match message {
                    Some(message) => {
                        if message.role == Role::Assistant {
                            result.turns += 1;
                        }
                        if let Some(id) = background_id {
                            self.background.record_message(id, message.clone());
                        }
                        result.messages.push(message);
                    }
                    None => break,
                },
            }
        }

        let exit = match child.wait().await {
            Ok(exit) => exit,
            Err(e) => {
                result.stderr = e.to_string();
                return if cancelled {
                    Outcome::Cancelled
                } else {
                    Outcome::ProcessFailed { exit_code: None }
                };
            }
        };
        result.exit_code = exit.exit_code;
        result.stderr = exit.stderr;
        result.usage.accumulate(&exit.usage);

        if cancelled {
            return Outcome::Cancelled;
        }
        if let Some(denial) = detect_denial(&result.messages) {
            tracing::warn!(agent = %result.agent, reason = %denial.reason, "tool call denied");
            self.hooks
                .notify(&HookEvent::ToolDenied {
                    invocation_id: result.id.clone(),
                    agent: result.agent.clone(),
                    tool_use_id: denial.tool_use_id.clone(),
                    reason: denial.reason.clone(),
                })
                .await;
            return Outcome::ToolDenied {
                tool_use_id: denial.tool_use_id,
                reason: denial.reason,
            };
        }
        if exit.exit_code == Some(0) {
            Outcome::Completed
        } else {
            Outcome::ProcessFailed {
                exit_code: exit.exit_code,
            }
        }
    }

    /// A result with identity filled in and nothing run yet.
    fn pending_result(&self, task: &Prepared) -> InvocationResult {
        InvocationResult {
            id: format!("inv-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            agent: task.agent.config.name.clone(),
            requested_agent: task.agent.requested_name.clone(),
            resolution: task.agent.resolution,
            task: task.task.clone(),
            model: None,
            isolation: task.isolation,
            outcome: Outcome::Cancelled,
            exit_code: None,
            stderr: String::new(),
            messages: Vec::new(),
            final_output: String::new(),
            usage: Usage::default(),
            turns: 0,
            duration_ms: 0,
        }
    }

    fn finish(&self, mut result: InvocationResult, outcome: Outcome, started: Instant) -> InvocationResult {
        result.final_output = final_assistant_text(&result.messages).unwrap_or_default();
        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            agent = %result.agent,
            model = result.model.as_deref().unwrap_or("default"),
            outcome = outcome.label(),
            turns = result.turns,
            duration_ms = result.duration_ms,
            "subagent finished"
        );
        result.outcome = outcome;
        result
    }
}
