//! External converter process supervision.
//!
//! Runs one external command with captured diagnostics and a wall-clock
//! timeout. On timer fire the process is force-terminated. A zero exit
//! code without the expected output file is a `PartialOutput` failure,
//! not success — real tools have been observed to exit 0 on inputs they
//! silently could not handle.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

use crate::error::PreviewError;

/// Stderr is kept for diagnostics but bounded.
const MAX_CAPTURED_STDERR: usize = 2000;

/// One external converter invocation.
#[derive(Debug, Clone)]
pub struct ToolJob {
    /// The command to execute.
    pub tool: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Wall-clock budget.
    pub timeout: Duration,
    /// Output file that must exist after a successful exit.
    pub expected_output: Option<PathBuf>,
}

/// Captured diagnostics from a completed invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Runtime in milliseconds.
    pub duration_ms: u64,
}

/// Supervises external converter processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor;

impl ProcessSupervisor {
    /// Create a new supervisor.
    pub fn new() -> Self {
        Self
    }

    /// Run one job to completion, timeout, or failure.
    pub async fn run(&self, job: &ToolJob) -> Result<ToolOutput, PreviewError> {
        debug!(
            tool = %job.tool,
            args = ?job.args,
            timeout_s = job.timeout.as_secs(),
            "Spawning converter process"
        );

        if let Some(expected) = &job.expected_output {
            if let Some(parent) = expected.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut cmd = Command::new(&job.tool);
        cmd.args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PreviewError::ToolMissing {
                    tool: job.tool.clone(),
                    hint: format!("'{}' was not found on this host", job.tool),
                }
            } else {
                PreviewError::Io(e)
            }
        })?;

        // Drain pipes concurrently so a chatty tool cannot block on a full
        // pipe buffer while we wait for exit.
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        tokio::select! {
            result = child.wait() => {
                let status = result?;
                let duration_ms = start.elapsed().as_millis() as u64;
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();

                if !status.success() {
                    let code = status.code().unwrap_or(-1);
                    error!(
                        tool = %job.tool,
                        code,
                        stderr = %stderr.chars().take(500).collect::<String>(),
                        "Converter failed"
                    );
                    return Err(PreviewError::ToolFailed {
                        tool: job.tool.clone(),
                        code,
                        stderr: stderr.chars().take(MAX_CAPTURED_STDERR).collect(),
                    });
                }

                if let Some(expected) = &job.expected_output {
                    if !tokio::fs::try_exists(expected).await.unwrap_or(false) {
                        error!(
                            tool = %job.tool,
                            expected = %expected.display(),
                            "Converter exited 0 but produced no output"
                        );
                        return Err(PreviewError::PartialOutput {
                            tool: job.tool.clone(),
                            path: expected.clone(),
                        });
                    }
                }

                info!(tool = %job.tool, duration_ms, "Converter completed");
                Ok(ToolOutput { stdout, stderr, duration_ms })
            }
            _ = tokio::time::sleep(job.timeout) => {
                error!(
                    tool = %job.tool,
                    timeout_s = job.timeout.as_secs(),
                    "Converter timed out, killing"
                );
                kill_quietly(&mut child).await;
                Err(PreviewError::Timeout {
                    tool: job.tool.clone(),
                    seconds: job.timeout.as_secs(),
                })
            }
        }
    }
}

/// Read a child pipe to EOF in the background.
fn drain<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return String::new();
        };
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).to_string()
    })
}

async fn kill_quietly(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Kill after timeout failed (process likely already exited)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration, expected: Option<PathBuf>) -> ToolJob {
        ToolJob {
            tool: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout,
            expected_output: expected,
        }
    }

    #[tokio::test]
    async fn success_with_output_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("out.txt");
        let job = sh(
            &format!("echo diag >&2; printf data > '{}'", out.display()),
            Duration::from_secs(5),
            Some(out.clone()),
        );

        let result = ProcessSupervisor::new().run(&job).await.expect("run");
        assert!(result.stderr.contains("diag"));
        assert!(out.exists());
    }

    #[tokio::test]
    async fn nonzero_exit_is_tool_failure_with_stderr() {
        let job = sh("echo broken >&2; exit 3", Duration::from_secs(5), None);
        let err = ProcessSupervisor::new().run(&job).await.unwrap_err();
        match err {
            PreviewError::ToolFailed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert!(stderr.contains("broken"));
            }
            other => panic!("expected ToolFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_exit_without_output_is_partial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("never_written.jpg");
        let job = sh("exit 0", Duration::from_secs(5), Some(out));
        let err = ProcessSupervisor::new().run(&job).await.unwrap_err();
        assert!(matches!(err, PreviewError::PartialOutput { .. }));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let job = sh("sleep 30", Duration::from_millis(200), None);
        let start = Instant::now();
        let err = ProcessSupervisor::new().run(&job).await.unwrap_err();
        assert!(matches!(err, PreviewError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_command_is_tool_missing() {
        let job = ToolJob {
            tool: "previewd-no-such-converter".to_string(),
            args: vec![],
            timeout: Duration::from_secs(1),
            expected_output: None,
        };
        let err = ProcessSupervisor::new().run(&job).await.unwrap_err();
        assert!(matches!(err, PreviewError::ToolMissing { .. }));
    }
}
