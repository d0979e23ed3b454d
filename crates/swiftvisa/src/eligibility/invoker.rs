use super::backend::{InferenceBackend, InvocationError};
use super::domain::{EligibilityResult, NormalizedProfile};
use crate::config::WorkerConfig;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Everything one worker run produced.
#[derive(Debug)]
pub struct InvocationResult {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl InvocationResult {
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Folds the raw run into a verdict or the matching failure.
    pub fn into_verdict(self) -> Result<EligibilityResult, InvocationError> {
        if !self.status.success() {
            return Err(InvocationError::NonZeroExit {
                code: self.status.code(),
                stderr: self.stderr_text(),
            });
        }

        serde_json::from_slice(&self.stdout).map_err(|source| InvocationError::MalformedOutput {
            source,
            stderr: self.stderr_text(),
        })
    }
}

/// Runs the reasoning worker as a child process speaking JSON over stdio.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    config: WorkerConfig,
}

impl ProcessInvoker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Spawns the worker, feeds it `request`, and collects both output streams.
    ///
    /// The stdin write and both drains run as independent tasks alongside the
    /// wait for exit, so a worker flooding stderr can never stall on a full
    /// pipe while stdout is being read. The configured deadline covers the
    /// whole cycle, including the stdin write; on expiry the worker and
    /// everything in its process group are killed.
    pub async fn run(&self, request: Vec<u8>) -> Result<InvocationResult, InvocationError> {
        let deadline = Instant::now() + self.config.timeout;
        let mut command = self.command();
        let mut child = command.spawn().map_err(|source| InvocationError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;
        let pid = child.id();

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let mut feeder = tokio::spawn(feed(stdin, request));
        let mut stdout_task = tokio::spawn(drain(stdout));
        let mut stderr_task = tokio::spawn(drain(stderr));

        let status = match timeout_at(deadline, child.wait()).await {
            Ok(status) => status.map_err(|source| InvocationError::Stream {
                stream: "wait",
                source,
            })?,
            Err(_) => {
                terminate(&mut child, pid).await;
                abort_all(&feeder, &stdout_task, &stderr_task);
                return Err(self.timed_out());
            }
        };

        // The worker has exited, but anything it left behind in its process
        // group may still hold one of the pipes open.
        let collected = timeout_at(deadline, async {
            let fed = (&mut feeder).await;
            let stdout = (&mut stdout_task).await;
            let stderr = (&mut stderr_task).await;
            (fed, stdout, stderr)
        })
        .await;

        let (fed, stdout, stderr) = match collected {
            Ok(joined) => joined,
            Err(_) => {
                terminate(&mut child, pid).await;
                abort_all(&feeder, &stdout_task, &stderr_task);
                return Err(self.timed_out());
            }
        };

        match fed {
            Ok(Ok(())) => {}
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("worker closed stdin before reading the full request");
            }
            Ok(Err(err)) => warn!(error = %err, "failed to write worker request"),
            Err(err) => warn!(error = %err, "worker stdin task did not complete"),
        }

        Ok(InvocationResult {
            status,
            stdout: joined("stdout", stdout)?,
            stderr: joined("stderr", stderr)?,
        })
    }

    fn timed_out(&self) -> InvocationError {
        InvocationError::Timeout {
            after: self.config.timeout,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down helpers the worker forked.
        #[cfg(unix)]
        command.process_group(0);

        for name in &self.config.credential_vars {
            match std::env::var_os(name) {
                Some(value) => {
                    command.env(name, value);
                }
                None => debug!(variable = name.as_str(), "credential variable not set"),
            }
        }

        command
    }
}

#[async_trait]
impl InferenceBackend for ProcessInvoker {
    async fn evaluate(
        &self,
        profile: NormalizedProfile,
    ) -> Result<EligibilityResult, InvocationError> {
        let request = serde_json::to_vec(&profile).map_err(InvocationError::Encode)?;
        debug!(
            program = self.config.program.as_str(),
            category = profile.category().as_str(),
            request_bytes = request.len(),
            "invoking eligibility worker"
        );

        let result = self.run(request).await?;
        debug!(
            code = ?result.status.code(),
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "eligibility worker finished"
        );

        result.into_verdict()
    }
}

/// Kills the worker's process group, then the worker itself if it is still
/// running.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_group(pid).await;
    }
    if let Err(err) = child.kill().await {
        debug!(error = %err, "worker could not be killed, it may already have exited");
    }
}

/// The worker leads its own group, so its pid is the group id.
#[cfg(unix)]
async fn kill_group(pid: u32) {
    let group = format!("-{pid}");
    let outcome = Command::new("kill")
        .args(["-9", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match outcome {
        Ok(status) if status.success() => {}
        Ok(status) => debug!(pid, code = ?status.code(), "worker process group already gone"),
        Err(err) => warn!(pid, error = %err, "failed to signal worker process group"),
    }
}

#[cfg(not(unix))]
async fn kill_group(_pid: u32) {}

async fn feed(mut stdin: ChildStdin, request: Vec<u8>) -> std::io::Result<()> {
    stdin.write_all(&request).await?;
    stdin.shutdown().await?;
    // Dropping the handle closes the pipe, which is the worker's end-of-input signal.
    drop(stdin);
    Ok(())
}

async fn drain<R: AsyncRead + Unpin>(mut stream: R) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await?;
    Ok(buffer)
}

fn joined(
    stream: &'static str,
    outcome: Result<std::io::Result<Vec<u8>>, tokio::task::JoinError>,
) -> Result<Vec<u8>, InvocationError> {
    match outcome {
        Ok(Ok(buffer)) => Ok(buffer),
        Ok(Err(source)) => Err(InvocationError::Stream { stream, source }),
        Err(err) => Err(InvocationError::Stream {
            stream,
            source: std::io::Error::new(std::io::ErrorKind::Other, err),
        }),
    }
}

fn missing_pipe(stream: &'static str) -> InvocationError {
    InvocationError::Stream {
        stream,
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe was not captured"),
    }
}

fn abort_all<A, B, C>(feeder: &JoinHandle<A>, stdout: &JoinHandle<B>, stderr: &JoinHandle<C>) {
    feeder.abort();
    stdout.abort();
    stderr.abort();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shell(script: &str) -> ProcessInvoker {
        ProcessInvoker::new(
            WorkerConfig::new("sh")
                .with_args(["-c", script])
                .with_timeout(Duration::from_secs(10)),
        )
    }

    #[tokio::test]
    async fn run_echoes_request_after_stdin_closes() {
        let result = shell("cat")
            .run(br#"{"visa_type":"F1 Student"}"#.to_vec())
            .await
            .expect("worker runs");

        assert!(result.status.success());
        assert_eq!(result.stdout, br#"{"visa_type":"F1 Student"}"#.to_vec());
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn run_reports_missing_program_as_spawn_error() {
        let invoker = ProcessInvoker::new(WorkerConfig::new("/nonexistent/eligibility-worker"));
        match invoker.run(Vec::new()).await {
            Err(InvocationError::Spawn { program, .. }) => {
                assert_eq!(program, "/nonexistent/eligibility-worker")
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn worker_that_ignores_stdin_still_completes() {
        let result = shell("exit 0")
            .run(vec![b'x'; 1 << 20])
            .await
            .expect("broken pipe is not fatal");
        assert!(result.status.success());
    }

    #[tokio::test]
    async fn into_verdict_prefers_exit_status_over_stdout() {
        let result = shell(r#"echo '{"decision":"Likely Eligible","explanation":"ok"}'; exit 3"#)
            .run(Vec::new())
            .await
            .expect("worker runs");

        match result.into_verdict() {
            Err(InvocationError::NonZeroExit { code, .. }) => assert_eq!(code, Some(3)),
            other => panic!("expected non-zero exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_takes_down_helpers_the_worker_forked() {
        let marker = std::env::temp_dir().join(format!("swiftvisa-helper-{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);
        let script = format!("(sleep 1; touch {}) & wait", marker.display());
        let invoker = ProcessInvoker::new(
            WorkerConfig::new("sh")
                .with_args(["-c", script.as_str()])
                .with_timeout(Duration::from_millis(200)),
        );

        assert!(matches!(
            invoker.run(Vec::new()).await,
            Err(InvocationError::Timeout { .. })
        ));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "forked helper outlived the timed out worker");
    }
}
