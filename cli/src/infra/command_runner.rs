//! Infrastructure implementation of the `CommandRunner` port.
//!
//! Every child runs under a deadline. When the deadline fires the child is
//! killed explicitly, not just dropped.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::application::ports::CommandRunner;

/// Default deadline for provider and directory CLI calls.
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(120);

/// Production `CommandRunner` backed by `tokio::process`.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

fn spawn(program: &str, args: &[&str], with_stdin: bool) -> Result<Child> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if with_stdin {
        command.stdin(Stdio::piped());
    }
    command
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))
}

async fn drain(handle: Option<impl AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

/// Wait for `child` and collect its output, killing it once `timeout` elapses.
async fn collect(
    mut child: Child,
    program: &str,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<Output> {
    let stdin_handle = child.stdin.take();
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    let feed = async move {
        if let (Some(mut handle), Some(input)) = (stdin_handle, stdin) {
            let _ = handle.write_all(&input).await;
            // Dropping the handle closes the pipe so the child sees EOF.
        }
    };

    tokio::select! {
        result = async {
            let ((), status, stdout, stderr) =
                tokio::join!(feed, child.wait(), drain(stdout_handle), drain(stderr_handle));
            Ok::<_, anyhow::Error>(Output {
                status: status.with_context(|| format!("waiting for {program}"))?,
                stdout,
                stderr,
            })
        } => result,
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        tracing::debug!(program, ?args, "running");
        let child = spawn(program, args, false)?;
        collect(child, program, None, timeout).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        tracing::debug!(program, ?args, bytes = input.len(), "running with stdin");
        let child = spawn(program, args, true)?;
        collect(child, program, Some(input.to_vec()), self.timeout).await
    }
}
