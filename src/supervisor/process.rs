// ABOUTME: ProcessSupervisor - runs subagents as OS child processes speaking
// ABOUTME: JSON lines on stdout, with stderr captured and PIDs registered.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::pid::{register_best_effort, unregister_best_effort};
use super::{ChildExit, ChildHandle, NoopProcessRegistry, ProcessRegistry, SpawnRequest, Supervisor};
use crate::error::SupervisorError;
use crate::llm::{ContentBlock, Message, Role, Usage};

/// Command used when none is configured.
pub const DEFAULT_AGENT_COMMAND: &str = "pi";

/// Environment variable carrying the child's own spawn restriction.
pub const ALLOWED_AGENTS_ENV: &str = "FLEET_ALLOWED_AGENTS";

/// Spawns subagents with `tokio::process`.
pub struct ProcessSupervisor {
    program: String,
    base_args: Vec<String>,
    registry: Arc<dyn ProcessRegistry>,
}

impl ProcessSupervisor {
    /// Supervisor running `program` for every subagent.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            registry: Arc::new(NoopProcessRegistry),
        }
    }

    /// Arguments placed before the generated ones.
    pub fn base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    /// Track spawned PIDs in a host registry.
    pub fn with_registry(mut self, registry: Arc<dyn ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }

    fn build_args(&self, request: &SpawnRequest, prompt_file: Option<&std::path::Path>) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.extend(["--mode", "json", "--print", "--no-session"].map(String::from));
        if let Some(model) = &request.model {
            args.push("--model".into());
            args.push(model.clone());
        }
        args.push("--tools".into());
        args.push(request.tools.join(","));
        if let Some(max_turns) = request.max_turns {
            args.push("--max-turns".into());
            args.push(max_turns.to_string());
        }
        if let Some(path) = prompt_file {
            args.push("--append-system-prompt".into());
            args.push(path.to_string_lossy().into_owned());
        }
        args.push(format!("Task: {}", request.task));
        args
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_COMMAND)
    }
}

fn write_prompt_file(prompt: &str) -> Result<tempfile::TempPath, SupervisorError> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("fleet-prompt-")
        .suffix(".md")
        .tempfile()?;
    file.write_all(prompt.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

#[async_trait]
impl Supervisor for ProcessSupervisor {
    async fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn ChildHandle>, SupervisorError> {
        let prompt_file = if request.system_prompt.trim().is_empty() {
            None
        } else {
            Some(write_prompt_file(&request.system_prompt)?)
        };
        let args = self.build_args(&request, prompt_file.as_deref());

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .current_dir(&request.cwd)
            .envs(request.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(allowed) = &request.allowed_agent_types {
            cmd.env(ALLOWED_AGENTS_ENV, allowed.join(","));
        }

        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::Io(std::io::Error::other("child stdout unavailable")))?;
        let stderr = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut captured = String::new();
                let _ = stderr.read_to_string(&mut captured).await;
                captured
            })
        });

        let pid = child.id();
        if let Some(pid) = pid {
            let command = format!("{} (agent {})", self.program, request.agent);
            register_best_effort(self.registry.as_ref(), pid, &command).await;
        }
        tracing::info!(agent = %request.agent, ?pid, cwd = %request.cwd.display(), "spawned subagent");

        Ok(Box::new(ProcessChild {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            usage: Usage::default(),
            pid,
            registry: self.registry.clone(),
            _prompt_file: prompt_file,
        }))
    }
}

struct ProcessChild {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    usage: Usage,
    pid: Option<u32>,
    registry: Arc<dyn ProcessRegistry>,
    _prompt_file: Option<tempfile::TempPath>,
}

#[async_trait]
impl ChildHandle for ProcessChild {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn next_message(&mut self) -> Option<Message> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    tracing::debug!(pid = ?self.pid, "child stdout closed: {}", e);
                    return None;
                }
            };
            if let Some(message) = decode_event(&line, &mut self.usage) {
                return Some(message);
            }
        }
    }

    async fn signal(&mut self) -> Result<(), SupervisorError> {
        tracing::info!(pid = ?self.pid, "terminating subagent");
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already exited.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn wait(mut self: Box<Self>) -> Result<ChildExit, SupervisorError> {
        // Drain remaining output so late usage is counted and the pipe never blocks.
        while self.next_message().await.is_some() {}

        let status = self.child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        if let Some(pid) = self.pid {
            unregister_best_effort(self.registry.as_ref(), pid).await;
        }
        tracing::info!(pid = ?self.pid, code = ?status.code(), "subagent exited");

        Ok(ChildExit {
            exit_code: status.code(),
            stderr,
            usage: self.usage.clone(),
        })
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageEnd { message: WireMessage },
    ToolResultEnd { message: WireMessage },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireMessage {
    role: Role,
    #[serde(default)]
    content: WireContent,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

impl Default for WireContent {
    fn default() -> Self {
        WireContent::Blocks(Vec::new())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default, alias = "input", alias = "input_tokens")]
    input_tokens: u32,
    #[serde(default, alias = "output", alias = "output_tokens")]
    output_tokens: u32,
    #[serde(default)]
    cost: WireCost,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireCost {
    Total(f64),
    Breakdown { total: f64 },
}

impl Default for WireCost {
    fn default() -> Self {
        WireCost::Total(0.0)
    }
}

/// Decode one stdout line; non-message events and junk yield `None`.
fn decode_event(line: &str, usage: &mut Usage) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let event: WireEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::trace!("ignoring child output line: {}", e);
            return None;
        }
    };
    let wire = match event {
        WireEvent::MessageEnd { message } | WireEvent::ToolResultEnd { message } => message,
        WireEvent::Other => return None,
    };

    if let Some(reported) = &wire.usage {
        usage.accumulate(&Usage {
            input_tokens: reported.input_tokens,
            output_tokens: reported.output_tokens,
            cost: match reported.cost {
                WireCost::Total(total) | WireCost::Breakdown { total } => total,
            },
        });
    }

    let content = match wire.content {
        WireContent::Text(text) => vec![ContentBlock::text(text)],
        WireContent::Blocks(blocks) => blocks
            .into_iter()
            .filter_map(|b| serde_json::from_value::<ContentBlock>(b).ok())
            .collect(),
    };
    Some(Message {
        role: wire.role,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::MemoryProcessRegistry;

    #[test]
    fn test_build_args() {
        let supervisor = ProcessSupervisor::new("agent").base_args(vec!["--quiet".into()]);
        let request = SpawnRequest::new("scout", "map the repo", "/tmp")
            .model("anthropic/claude-haiku-4-5")
            .tools(vec!["read".into(), "grep".into()])
            .max_turns(Some(6));
        let args = supervisor.build_args(&request, Some(std::path::Path::new("/tmp/p.md")));
        assert_eq!(
            args,
            vec![
                "--quiet",
                "--mode",
                "json",
                "--print",
                "--no-session",
                "--model",
                "anthropic/claude-haiku-4-5",
                "--tools",
                "read,grep",
                "--max-turns",
                "6",
                "--append-system-prompt",
                "/tmp/p.md",
                "Task: map the repo",
            ]
        );
    }

    #[test]
    fn test_decode_events() {
        let mut usage = Usage::default();
        let msg = decode_event(
            r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"done"},{"type":"thinking","thinking":"x"}],"usage":{"input":10,"output":5,"cost":{"total":0.5}}}}"#,
            &mut usage,
        )
        .unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), "done");
        assert_eq!(msg.content.len(), 1);

        let msg = decode_event(
            r#"{"type":"tool_result_end","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"Permission denied","is_error":true}]}}"#,
            &mut usage,
        )
        .unwrap();
        assert!(matches!(
            &msg.content[0],
            ContentBlock::ToolResult { is_error: true, .. }
        ));

        decode_event(
            r#"{"type":"message_end","message":{"role":"assistant","content":"more","usage":{"input_tokens":1,"output_tokens":2,"cost":0.25}}}"#,
            &mut usage,
        )
        .unwrap();

        assert!(decode_event(r#"{"type":"turn_start"}"#, &mut usage).is_none());
        assert!(decode_event("not json", &mut usage).is_none());
        assert_eq!(usage.input_tokens, 11);
        assert_eq!(usage.output_tokens, 7);
        assert!((usage.cost - 0.75).abs() < 1e-9);
    }

    #[cfg(unix)]
    fn sh(script: &str) -> ProcessSupervisor {
        ProcessSupervisor::new("sh").base_args(vec!["-c".into(), script.into(), "agent".into()])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_reads_messages_and_exit() {
        let script = r#"
printf '%s\n' '{"type":"message_start"}'
printf '%s\n' '{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"hello"}],"usage":{"input":3,"output":4}}}'
echo "allowed=$FLEET_ALLOWED_AGENTS label=$FLEET_LABEL" >&2
exit 3
"#;
        let registry = MemoryProcessRegistry::new();
        let supervisor = sh(script).with_registry(Arc::new(registry.clone()));
        let dir = tempfile::tempdir().unwrap();
        let request = SpawnRequest::new("scout", "x", dir.path())
            .system_prompt("Be brief.")
            .allowed_agent_types(Some(vec!["a".into(), "b".into()]))
            .env("FLEET_LABEL", "nightly");

        let mut child = supervisor.spawn(request).await.unwrap();
        let pid = child.pid().unwrap();
        assert!(registry.entries().contains_key(&pid));

        let message = child.next_message().await.unwrap();
        assert_eq!(message.text(), "hello");
        assert!(child.next_message().await.is_none());

        let exit = child.wait().await.unwrap();
        assert_eq!(exit.exit_code, Some(3));
        assert!(!exit.success());
        assert_eq!(exit.stderr.trim(), "allowed=a,b label=nightly");
        assert_eq!(exit.usage.input_tokens, 3);
        assert_eq!(exit.usage.output_tokens, 4);
        assert!(registry.entries().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_terminates_child() {
        let supervisor = sh("exec sleep 30");
        let dir = tempfile::tempdir().unwrap();
        let mut child = supervisor
            .spawn(SpawnRequest::new("sleeper", "x", dir.path()))
            .await
            .unwrap();
        child.signal().await.unwrap();
        let exit = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .expect("killed child should exit promptly")
            .unwrap();
        assert_eq!(exit.exit_code, None);
    }

    #[tokio::test]
    async fn test_spawn_failure_names_program() {
        let supervisor = ProcessSupervisor::new("/nonexistent/fleet-agent-binary");
        let dir = tempfile::tempdir().unwrap();
        let err = match supervisor.spawn(SpawnRequest::new("a", "x", dir.path())).await {
            Err(e) => e,
            Ok(_) => panic!("spawn should fail"),
        };
        assert!(matches!(err, SupervisorError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/fleet-agent-binary"));
    }
}
