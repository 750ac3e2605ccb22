//! Supervision of a co-located trainer subprocess.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crucible_abstraction::{DeployError, DeployResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

const PROVIDER_NAME: &str = "local-agent";

/// Outcome of a non-blocking status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Still running.
    Running,
    /// Exited cleanly.
    Succeeded,
    /// Exited with a nonzero code (`None` when killed by a signal).
    Failed(Option<i32>),
}

/// A spawned trainer process with its captured output.
///
/// Stdout and stderr are streamed into an in-memory log buffer by
/// background tasks, so log lines survive the process and can be served
/// while it runs.
#[derive(Debug)]
pub struct TrainerProcess {
    child: Child,
    logs: Arc<Mutex<Vec<String>>>,
}

impl TrainerProcess {
    /// Spawns `program` with `args`, capturing both output streams.
    ///
    /// # Errors
    ///
    /// Returns a backend error when the program cannot be started.
    pub fn spawn(program: &str, args: &[String], job_id: &str) -> DeployResult<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DeployError::backend(PROVIDER_NAME, format!("failed to start trainer: {e}"))
            })?;

        info!(job_id = %job_id, program = %program, "spawned trainer process");

        let logs = Arc::new(Mutex::new(Vec::new()));
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, Arc::clone(&logs));
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, Arc::clone(&logs));
        }

        Ok(Self { child, logs })
    }

    /// Non-blocking check of whether the process is still running.
    pub fn try_status(&mut self) -> ProcessStatus {
        match self.child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            Ok(Some(exit)) if exit.success() => ProcessStatus::Succeeded,
            Ok(Some(exit)) => ProcessStatus::Failed(exit.code()),
            Err(error) => {
                warn!(error = %error, "could not query trainer process");
                ProcessStatus::Failed(None)
            }
        }
    }

    /// A snapshot of the captured log lines so far.
    #[must_use]
    pub fn logs_snapshot(&self) -> Vec<String> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Terminates the process: graceful signal first, then a bounded wait,
    /// then a forced kill. A process that already exited is a success.
    pub async fn terminate(mut self, grace: Duration) -> DeployResult<()> {
        if let Ok(Some(exit)) = self.child.try_wait() {
            debug!(exit = ?exit.code(), "trainer already exited before termination");
            return Ok(());
        }

        if let Some(pid) = self.child.id() {
            send_graceful_signal(pid);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("trainer ignored graceful termination, killing");
                self.child.kill().await.map_err(|e| {
                    DeployError::backend(PROVIDER_NAME, format!("failed to kill trainer: {e}"))
                })
            }
        }
    }
}

fn spawn_line_reader<R>(stream: R, logs: Arc<Mutex<Vec<String>>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut logs) = logs.lock() {
                logs.push(line);
            }
        }
    });
}

/// Asks the OS to end the process politely. The forced kill in
/// [`TrainerProcess::terminate`] is the fallback, so a failure here is
/// only logged.
fn send_graceful_signal(pid: u32) {
    #[cfg(unix)]
    {
        let result = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .output();
        if let Err(error) = result {
            warn!(pid = pid, error = %error, "failed to send SIGTERM");
        }
    }

    #[cfg(windows)]
    {
        let result =
            std::process::Command::new("taskkill").args(["/PID", &pid.to_string()]).output();
        if let Err(error) = result {
            warn!(pid = pid, error = %error, "failed to request termination");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_captures_output() {
        let mut process =
            TrainerProcess::spawn("echo", &["step 1 loss 2.5".to_string()], "job-1").unwrap();
        // Give the reader task a moment to drain the pipe.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(process.logs_snapshot(), vec!["step 1 loss 2.5".to_string()]);

        // Echo exits immediately and cleanly.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(process.try_status(), ProcessStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_spawn_missing_program_is_backend_error() {
        let err = TrainerProcess::spawn("definitely-not-a-real-trainer", &[], "job-1")
            .unwrap_err();
        assert_eq!(err.code(), "backend");
    }

    #[tokio::test]
    async fn test_terminate_already_exited_process_is_success() {
        let mut process = TrainerProcess::spawn("true", &[], "job-1").unwrap();
        // Wait for exit before terminating.
        let _ = process.child.wait().await;
        assert!(process.terminate(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_terminate_kills_stubborn_process() {
        let process =
            TrainerProcess::spawn("sleep", &["30".to_string()], "job-1").unwrap();
        let started = std::time::Instant::now();
        process.terminate(Duration::from_millis(500)).await.unwrap();
        // Graceful SIGTERM should end sleep well before the forced path.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_failed_exit_code_is_reported() {
        let mut process = TrainerProcess::spawn("false", &[], "job-1").unwrap();
        let _ = process.child.wait().await;
        assert_eq!(process.try_status(), ProcessStatus::Failed(Some(1)));
    }
}
