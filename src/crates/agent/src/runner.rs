//! The agent runner: spawn, stream, absorb
//!
//! A sub-agent is an isolated OS process speaking the stream-JSON protocol
//! on stdout. The runner prepares its scratch directory (system prompt and
//! tool config files), spawns it with a strict tool configuration and the
//! role's disallow-list, parses its output into stream events, and
//! resolves with whatever was accumulated. Failures of any kind resolve to
//! an empty outcome; the user's chat must never hard-fail because an
//! auxiliary agent died.

use crate::abort::AbortHandle;
use crate::parser::{EventParser, RecordedToolCall};
use serde_json::json;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use willow_stream::EventEmitter;

/// Constraints appended to every sub-agent's system prompt
const PROMPT_CONSTRAINTS: &str = "\n\n\
    Use only the MCP tools you have been given; no built-in tools.\n\
    Prefer issuing independent tool calls in parallel.";

/// Default cap on agent turns
pub const DEFAULT_MAX_TURNS: u32 = 12;

/// The executable a sub-agent runs as
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    /// Base arguments before the per-spawn ones
    pub args: Vec<String>,
}

impl Default for AgentCommand {
    fn default() -> AgentCommand {
        AgentCommand {
            program: "claude".to_string(),
            args: vec![
                "-p".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
            ],
        }
    }
}

/// Everything one spawn needs
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Short name used as the tool-call id prefix ("chat", "search", ...)
    pub name: String,
    pub system_prompt: String,
    /// The task handed to the agent as its user prompt
    pub prompt: String,
    pub max_turns: u32,
    /// Tool names this agent must not call, per its role policy
    pub disallowed_tools: Vec<String>,
    /// URL of the parent's graph tool endpoint
    pub tool_endpoint: String,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> AgentSpec {
        AgentSpec {
            name: name.into(),
            system_prompt: String::new(),
            prompt: prompt.into(),
            max_turns: DEFAULT_MAX_TURNS,
            disallowed_tools: Vec::new(),
            tool_endpoint: String::new(),
        }
    }
}

/// What a finished (or failed) agent resolves with
#[derive(Debug, Clone, Default)]
pub struct AgentOutcome {
    pub text: String,
    pub tool_calls: Vec<RecordedToolCall>,
}

/// Spawns sub-agent processes and streams their events
#[derive(Debug, Clone, Default)]
pub struct AgentRunner {
    command: AgentCommand,
}

impl AgentRunner {
    pub fn new(command: AgentCommand) -> AgentRunner {
        AgentRunner { command }
    }

    /// Run one sub-agent to completion. Events are re-emitted on `emitter`
    /// with tool-call ids prefixed by the agent name. On abort the child
    /// is killed and the partial outcome is returned.
    pub async fn run(
        &self,
        spec: &AgentSpec,
        emitter: &EventEmitter,
        abort: &AbortHandle,
    ) -> AgentOutcome {
        let scratch = match tempfile::Builder::new().prefix("willow-agent-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!(agent = %spec.name, error = %e, "Scratch dir creation failed");
                return AgentOutcome::default();
            }
        };
        if let Err(e) = self.write_scratch(spec, scratch.path()) {
            tracing::warn!(agent = %spec.name, error = %e, "Scratch setup failed");
            return AgentOutcome::default();
        }

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .arg("--max-turns")
            .arg(spec.max_turns.to_string())
            .arg("--mcp-config")
            .arg(scratch.path().join("mcp.json"))
            .arg("--strict-mcp-config")
            .arg("--append-system-prompt")
            .arg(format!("{}{}", spec.system_prompt, PROMPT_CONSTRAINTS));
        if !spec.disallowed_tools.is_empty() {
            command
                .arg("--disallowed-tools")
                .arg(spec.disallowed_tools.join(","));
        }
        command
            .arg(&spec.prompt)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(agent = %spec.name, program = %self.command.program, error = %e, "Agent spawn failed");
                return AgentOutcome::default();
            }
        };
        tracing::info!(agent = %spec.name, pid = ?child.id(), "Agent spawned");

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill().await;
                return AgentOutcome::default();
            }
        };
        let mut lines = BufReader::new(stdout).lines();
        let mut parser = EventParser::new(&spec.name);

        loop {
            tokio::select! {
                _ = abort.aborted() => {
                    tracing::info!(agent = %spec.name, "Agent aborted; killing child");
                    let _ = child.start_kill();
                    break;
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            for event in parser.feed_line(&line) {
                                emitter.emit(event);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(agent = %spec.name, error = %e, "Agent pipe error");
                            break;
                        }
                    }
                }
            }
        }

        match child.wait().await {
            Ok(status) if !status.success() => {
                tracing::warn!(agent = %spec.name, status = %status, "Agent exited nonzero");
            }
            Err(e) => {
                tracing::warn!(agent = %spec.name, error = %e, "Agent wait failed");
            }
            _ => {}
        }

        let (text, tool_calls) = parser.finish();
        tracing::info!(
            agent = %spec.name,
            chars = text.len(),
            tool_calls = tool_calls.len(),
            "Agent finished"
        );
        AgentOutcome { text, tool_calls }
    }

    /// Write the system prompt and the strict MCP tool config naming the
    /// parent's graph endpoint.
    fn write_scratch(&self, spec: &AgentSpec, dir: &std::path::Path) -> std::io::Result<()> {
        std::fs::write(
            dir.join("system_prompt.md"),
            format!("{}{}", spec.system_prompt, PROMPT_CONSTRAINTS),
        )?;
        let config = json!({
            "mcpServers": {
                "willow": {
                    "type": "http",
                    "url": spec.tool_endpoint,
                }
            }
        });
        std::fs::write(dir.join("mcp.json"), config.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use willow_stream::StreamEvent;

    fn shell_agent(script: &str) -> AgentRunner {
        AgentRunner::new(AgentCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    // The shell stands in for the agent CLI: the extra flags the runner
    // appends land in $0 and positional args and are ignored by the script.
    #[tokio::test]
    async fn test_events_and_outcome_from_scripted_child() {
        let script = concat!(
            r#"echo '{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}'; "#,
            r#"echo '{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"done"}}'; "#,
            r#"echo '{"type":"content_block_stop","index":0}'"#,
        );
        let runner = shell_agent(script);
        let (emitter, mut rx) = EventEmitter::channel();
        let outcome = runner
            .run(
                &AgentSpec::new("chat", "say done"),
                &emitter,
                &AbortHandle::new(),
            )
            .await;

        assert_eq!(outcome.text, "done");
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Content {
                text: "done".into()
            })
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_absorbed() {
        let runner = AgentRunner::new(AgentCommand {
            program: "/nonexistent/agent-binary".to_string(),
            args: vec![],
        });
        let (emitter, _rx) = EventEmitter::channel();
        let outcome = runner
            .run(
                &AgentSpec::new("search", "find things"),
                &emitter,
                &AbortHandle::new(),
            )
            .await;
        assert!(outcome.text.is_empty());
        assert!(outcome.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_partial_output() {
        let script = concat!(
            r#"echo '{"type":"content_block_start","index":0,"content_block":{"type":"text","text":"partial"}}'; "#,
            "exit 3",
        );
        let runner = shell_agent(script);
        let (emitter, _rx) = EventEmitter::channel();
        let outcome = runner
            .run(
                &AgentSpec::new("indexer", "index"),
                &emitter,
                &AbortHandle::new(),
            )
            .await;
        assert_eq!(outcome.text, "partial");
    }

    #[tokio::test]
    async fn test_abort_kills_child() {
        // The child would run for a minute; abort must end it promptly.
        let runner = shell_agent("sleep 60");
        let (emitter, _rx) = EventEmitter::channel();
        let abort = AbortHandle::new();
        let killer = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            killer.abort();
        });

        let started = std::time::Instant::now();
        let outcome = runner
            .run(&AgentSpec::new("chat", "wait"), &emitter, &abort)
            .await;
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(outcome.text.is_empty());
    }
}
