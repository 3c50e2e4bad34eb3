//! Answer generation through an external model process.
//!
//! Every attempt launches the configured executable, writes the prompt to its
//! standard input and reads the answer from standard output. A clean nonzero
//! exit is a soft failure and is retried after a fixed backoff until the
//! attempt budget runs out; the last attempt's output is then used as a
//! best-effort answer. Timeouts and launch failures end the request at once.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};

/// Answer used when the model produced no output
pub const FALLBACK_ANSWER: &str = "Sorry, couldn't find an answer.";

/// What a finished model process left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// One run of the model process per call
#[async_trait]
pub trait ModelProcess: Send + Sync {
    /// Run the model on `prompt`.
    ///
    /// Returns `Err` only if the process could not be launched or talked to;
    /// a process that ran and exited nonzero is an `Ok` with that status.
    async fn run(&self, prompt: &str) -> Result<ProcessOutput>;
}

/// Model process launched as a child process for every attempt
#[derive(Debug, Clone)]
pub struct CommandProcess {
    program: String,
    args: Vec<String>,
}

impl CommandProcess {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

#[async_trait]
impl ModelProcess for CommandProcess {
    async fn run(&self, prompt: &str) -> Result<ProcessOutput> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::generation_launch(format!("failed to launch '{}': {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::generation_launch("model process has no stdin"))?;

        // Feed stdin while collecting output so neither pipe can fill up and stall
        let write = async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        let output = output
            .map_err(|e| Error::generation_launch(format!("model process failed: {}", e)))?;

        if let Err(e) = written {
            // A model that exits without reading all of stdin is judged by its exit status
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(Error::generation_launch(format!(
                    "failed to write prompt to model process: {}",
                    e
                )));
            }
        }

        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// How a generation request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// An attempt exited cleanly
    Succeeded,
    /// Every attempt exited nonzero
    Exhausted,
}

/// Result of a generation request that did not time out or fail to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub outcome: GenerationOutcome,
    /// Raw standard output of the last attempt
    pub output: String,
    /// Number of attempts made
    pub attempts: u32,
}

impl Generation {
    /// Trimmed output, or [`FALLBACK_ANSWER`] if there is none
    pub fn answer(&self) -> String {
        let trimmed = self.output.trim();
        if trimmed.is_empty() {
            FALLBACK_ANSWER.to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Record of a single attempt, kept only long enough to decide on a retry
#[derive(Debug)]
struct GenerationAttempt {
    number: u32,
    output: ProcessOutput,
    elapsed: Duration,
}

/// Runs the model process with bounded retries and a per-attempt timeout
pub struct GenerationInvoker {
    process: Arc<dyn ModelProcess>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl GenerationInvoker {
    pub fn new(process: Arc<dyn ModelProcess>, config: &GenerationConfig) -> Self {
        Self {
            process,
            timeout: config.timeout,
            max_retries: config.max_retries.max(1),
            retry_backoff: config.retry_backoff,
        }
    }

    /// Generate an answer for `prompt`
    pub async fn generate(&self, prompt: &str) -> Result<Generation> {
        let mut number = 0;

        loop {
            number += 1;
            let started = Instant::now();

            let output = match tokio::time::timeout(self.timeout, self.process.run(prompt)).await {
                Err(_) => {
                    tracing::warn!(attempt = number, timeout_secs = self.timeout.as_secs(), "model timed out");
                    return Err(Error::GenerationTimeout(self.timeout));
                }
                Ok(Err(e)) => {
                    tracing::error!(attempt = number, error = %e, "model invocation failed");
                    return Err(match e {
                        Error::GenerationLaunch(_) => e,
                        other => Error::generation_launch(other.to_string()),
                    });
                }
                Ok(Ok(output)) => output,
            };

            let attempt = GenerationAttempt {
                number,
                output,
                elapsed: started.elapsed(),
            };

            if attempt.output.success() {
                tracing::info!(
                    attempt = attempt.number,
                    elapsed_ms = attempt.elapsed.as_millis() as u64,
                    "model answered"
                );
                return Ok(Generation {
                    outcome: GenerationOutcome::Succeeded,
                    output: attempt.output.stdout,
                    attempts: attempt.number,
                });
            }

            tracing::warn!(
                attempt = attempt.number,
                status = ?attempt.output.status,
                elapsed_ms = attempt.elapsed.as_millis() as u64,
                stderr = %attempt.output.stderr.trim(),
                "model failed"
            );

            if attempt.number >= self.max_retries {
                return Ok(Generation {
                    outcome: GenerationOutcome::Exhausted,
                    output: attempt.output.stdout,
                    attempts: attempt.number,
                });
            }

            tokio::time::sleep(self.retry_backoff).await;
        }
    }
}
