//! Language-server subprocess supervision.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::error::LspError;
use super::provider::{LspProvider, Transport};
use super::Result;

/// How long [`ServerProcess::stop`] waits at each escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// Wait for a voluntary exit after `exit` was sent.
    pub graceful: Duration,
    /// Wait after SIGTERM before killing.
    pub terminate: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            graceful: Duration::from_secs(2),
            terminate: Duration::from_secs(1),
        }
    }
}

/// How the server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited on its own within the graceful window.
    Exited(ExitStatus),
    /// Exited after SIGTERM.
    Terminated(ExitStatus),
    /// Had to be killed.
    Killed,
}

/// A running language-server process.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    command: &'static str,
    stderr_task: Option<JoinHandle<()>>,
}

impl ServerProcess {
    /// Spawn the server described by `provider` with `workspace` as its
    /// working directory.
    ///
    /// Stdin and stdout are piped for stdio backends; socket backends get
    /// null streams. Stderr is always drained into `trace!` logs so a chatty
    /// server can never block on a full pipe.
    ///
    /// # Errors
    ///
    /// Returns [`LspError::NotFound`] if the executable is missing,
    /// [`LspError::InvalidPath`] if the workspace is not a directory, and
    /// [`LspError::SpawnFailed`] for any other spawn failure.
    pub fn spawn(provider: &dyn LspProvider, workspace: &Path) -> Result<Self> {
        let command = provider.command();
        let args = provider.args();

        if !workspace.is_dir() {
            return Err(LspError::InvalidPath(format!(
                "workspace '{}' is not a directory",
                workspace.display()
            )));
        }

        debug!(
            command,
            args = ?args,
            workspace = %workspace.display(),
            "Starting language server"
        );

        let mut cmd = Command::new(command);
        cmd.args(&args)
            .current_dir(workspace)
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if provider.transport() == Transport::Stdio {
            cmd.stdin(Stdio::piped()).stdout(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null()).stdout(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LspError::not_found(command, provider.install_hint())
            } else {
                LspError::spawn_failed(command, e)
            }
        })?;

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr(command, stderr)));

        Ok(Self {
            child,
            command,
            stderr_task,
        })
    }

    /// OS process id, if the process has not been reaped yet.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Take the piped stdout/stdin handles.
    ///
    /// # Errors
    ///
    /// Returns [`LspError::UnsupportedTransport`] if the streams were not
    /// piped (socket backend) or were already taken.
    pub fn take_stdio(&mut self) -> Result<(ChildStdout, ChildStdin)> {
        match (self.child.stdout.take(), self.child.stdin.take()) {
            (Some(stdout), Some(stdin)) => Ok((stdout, stdin)),
            _ => Err(LspError::UnsupportedTransport(format!(
                "{} was not started with piped stdio",
                self.command
            ))),
        }
    }

    /// Stop the process, escalating from waiting to SIGTERM to kill.
    ///
    /// Each step runs only if the previous one timed out. The process is
    /// always reaped before this returns.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if waiting on or killing the process fails.
    pub async fn stop(&mut self, timeouts: ShutdownTimeouts) -> Result<ExitOutcome> {
        let outcome = self.escalate(timeouts).await;
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        outcome
    }

    async fn escalate(&mut self, timeouts: ShutdownTimeouts) -> Result<ExitOutcome> {
        if let Ok(status) = timeout(timeouts.graceful, self.child.wait()).await {
            let status = status?;
            debug!(command = self.command, ?status, "language server exited");
            return Ok(ExitOutcome::Exited(status));
        }

        debug!(
            command = self.command,
            "language server still running, sending SIGTERM"
        );
        if let Err(e) = self.terminate() {
            warn!(command = self.command, error = %e, "failed to signal language server");
        }

        if let Ok(status) = timeout(timeouts.terminate, self.child.wait()).await {
            let status = status?;
            debug!(command = self.command, ?status, "language server terminated");
            return Ok(ExitOutcome::Terminated(status));
        }

        warn!(
            command = self.command,
            "language server ignored SIGTERM, killing"
        );
        self.child.kill().await?;
        Ok(ExitOutcome::Killed)
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> std::io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(std::io::Error::other)?;
        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(std::io::Error::from)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

async fn drain_stderr(command: &'static str, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => trace!(server = command, "{line}"),
            Ok(None) => break,
            Err(e) => {
                trace!(server = command, error = %e, "stopped reading server stderr");
                break;
            }
        }
    }
}
