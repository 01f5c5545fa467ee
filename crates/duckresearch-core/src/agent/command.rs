use super::{Agent, AgentStep, StepObserver};
use crate::error::AgentError;
use crate::proxy::NetworkSettings;
use crate::text;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

const STDERR_TAIL_CHARS: usize = 500;

/// Agent backed by an external program.
///
/// The prompt is written to the child's stdin and the answer is read from its
/// stdout. Each stderr line that parses as a JSON [`AgentStep`] is forwarded
/// to the observer; other stderr lines are kept for error reporting.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    name: String,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    max_steps: u32,
    timeout: Duration,
}

impl CommandAgent {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            max_steps: 20,
            timeout: Duration::from_secs(900),
        }
    }

    /// Build from a POSIX shell-style command line. Quotes and backslash
    /// escapes group words; no expansion or piping is performed.
    ///
    /// `None` when the line is empty or its quotes are unbalanced.
    pub fn from_command_line(name: impl Into<String>, command_line: &str) -> Option<Self> {
        let mut parts = shlex::split(command_line)?.into_iter();
        let program = parts.next()?;
        Some(Self::new(name, program).with_args(parts))
    }

    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.args.extend(args);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Hand the selected proxy (if any) to the child's network stack.
    pub fn with_network(mut self, network: &NetworkSettings) -> Self {
        self.env.extend(network.proxy_env());
        self
    }

    async fn run_child(
        &self,
        prompt: &str,
        observer: &dyn StepObserver,
    ) -> Result<String, AgentError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("DUCKRESEARCH_AGENT_NAME", &self.name)
            .env("DUCKRESEARCH_MAX_STEPS", self.max_steps.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|err| self.error(format!("failed to spawn {}: {err}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.error("child stdin unavailable"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.error("child stdout unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.error("child stderr unavailable"))?;

        let write_prompt = async move {
            if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                debug!(agent = %self.name, error = %err, "child closed stdin early");
            }
        };
        let read_answer = async move {
            let mut answer = String::new();
            stdout.read_to_string(&mut answer).await.map(|_| answer)
        };
        let read_steps = async move {
            let mut diagnostics = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<AgentStep>(&line) {
                    Ok(step) => observer.on_step(&step),
                    Err(_) => diagnostics.push(line),
                }
            }
            diagnostics
        };

        let ((), answer, diagnostics) = tokio::join!(write_prompt, read_answer, read_steps);
        let answer = answer.map_err(|err| self.error(format!("failed to read stdout: {err}")))?;
        let status = child
            .wait()
            .await
            .map_err(|err| self.error(format!("failed to wait for child: {err}")))?;

        if !status.success() {
            let tail = diagnostics.join("\n");
            let tail = text::strip_ansi(tail.trim());
            return Err(self.error(format!(
                "exited with {status}: {}",
                last_chars(&tail, STDERR_TAIL_CHARS)
            )));
        }

        Ok(answer.trim().to_string())
    }

    fn error(&self, reason: impl Into<String>) -> AgentError {
        AgentError::new(self.name.clone(), reason)
    }
}

fn last_chars(input: &str, max_chars: usize) -> &str {
    let count = input.chars().count();
    if count <= max_chars {
        return input;
    }
    match input.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &input[idx..],
        None => input,
    }
}

#[async_trait]
impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip(self, prompt, observer), fields(agent = %self.name))]
    async fn run(&self, prompt: &str, observer: &dyn StepObserver) -> Result<String, AgentError> {
        match tokio::time::timeout(self.timeout, self.run_child(prompt, observer)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "agent run timed out");
                Err(self.error(format!("timed out after {:?}", self.timeout)))
            }
        }
    }
}
