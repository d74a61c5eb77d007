/// Input acquisition: either our own stdin, or the stdout of `sh -c <command>`
/// spawned in its own process group, plus the watcher that reports how the
/// child finished.
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// Process group of the monitored child. Set once, read by cleanup and the
/// signal handler.
pub type GroupSlot = Arc<OnceLock<ProcessGroup>>;

/// The process group led by a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pgid: i32,
}

impl ProcessGroup {
    pub fn id(&self) -> i32 {
        self.pgid
    }

    /// Send SIGTERM to every process in the group.
    ///
    /// Returns `Ok(false)` when the group no longer exists.
    pub fn terminate(&self) -> nix::Result<bool> {
        match killpg(Pid::from_raw(self.pgid), Signal::SIGTERM) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Terminate the group in `slot`, if a child was ever spawned.
pub fn terminate_group(slot: &GroupSlot) {
    let Some(group) = slot.get() else {
        return;
    };
    match group.terminate() {
        Ok(true) => tracing::debug!(pgid = group.id(), "sent SIGTERM to process group"),
        Ok(false) => tracing::debug!(pgid = group.id(), "process group already gone"),
        Err(e) => tracing::warn!(pgid = group.id(), error = %e, "failed to signal process group"),
    }
}

/// How the child finished, as reported by its watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exit code 0.
    Succeeded,
    /// Non-zero exit code, or `None` if killed by a signal.
    Failed { code: Option<i32> },
    /// Waiting on the child failed.
    WaitFailed,
}

/// The byte stream being monitored.
pub enum InputSource {
    Stdin(tokio::io::Stdin),
    Child(tokio::process::ChildStdout),
}

impl InputSource {
    pub fn into_reader(self) -> Box<dyn AsyncRead + Unpin + Send> {
        match self {
            InputSource::Stdin(stdin) => Box::new(stdin),
            InputSource::Child(stdout) => Box::new(stdout),
        }
    }
}

/// Errors that can occur while acquiring the input source.
#[derive(Debug)]
pub enum SessionError {
    /// Failed to spawn the command.
    Spawn { source: std::io::Error },
    /// The child was spawned without a captured stdout.
    MissingStdout,
    /// The child has no usable process id.
    MissingPid,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn { source } => {
                write!(f, "failed to spawn command: {}", source)
            }
            SessionError::MissingStdout => write!(f, "child stdout was not captured"),
            SessionError::MissingPid => write!(f, "child process id unavailable"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn { source } => Some(source),
            SessionError::MissingStdout | SessionError::MissingPid => None,
        }
    }
}

/// A spawned command: its output stream, its group and its completion signal.
pub struct Spawned {
    pub input: InputSource,
    pub group: ProcessGroup,
    pub exit: oneshot::Receiver<ChildExit>,
}

/// Acquire the input source for a run.
///
/// Without a command this is our stdin and no child exists. With one, the
/// child's group is published into `slot` as soon as the child exists.
pub fn acquire(
    command: Option<&str>,
    verbose: bool,
    slot: &GroupSlot,
) -> Result<(InputSource, Option<oneshot::Receiver<ChildExit>>), SessionError> {
    let Some(command) = command else {
        tracing::debug!("monitoring stdin");
        return Ok((InputSource::Stdin(tokio::io::stdin()), None));
    };

    let spawned = spawn_command("sh", command, verbose, slot)?;
    Ok((spawned.input, Some(spawned.exit)))
}

/// Spawn `<shell> -c <command>` in a new process group and start its watcher.
///
/// The child's stdin is closed. Its stderr is passed through to ours when
/// `verbose`, discarded otherwise. The group goes into `slot` straight after
/// the spawn, so a signal arriving mid-setup still reaches it.
pub fn spawn_command(
    shell: &str,
    command: &str,
    verbose: bool,
    slot: &GroupSlot,
) -> Result<Spawned, SessionError> {
    tracing::info!(%command, "spawning command");

    let mut child = Command::new(shell)
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(if verbose { Stdio::inherit() } else { Stdio::null() })
        .process_group(0) // New process group for clean kill
        .spawn()
        .map_err(|e| SessionError::Spawn { source: e })?;

    // process_group(0) makes the child its own group leader.
    let pgid = child
        .id()
        .and_then(|pid| i32::try_from(pid).ok())
        .filter(|pid| *pid > 0)
        .ok_or(SessionError::MissingPid)?;
    let group = ProcessGroup { pgid };
    // One spawn per run, so the slot is empty here.
    let _ = slot.set(group);
    tracing::debug!(pid = pgid, "command started");

    let stdout = child.stdout.take().ok_or(SessionError::MissingStdout)?;

    let (tx, rx) = oneshot::channel();
    tokio::spawn(watch_child(child, tx));

    Ok(Spawned {
        input: InputSource::Child(stdout),
        group,
        exit: rx,
    })
}

/// Run the child to completion and report how it went.
async fn watch_child(mut child: Child, tx: oneshot::Sender<ChildExit>) {
    let exit = match child.wait().await {
        Ok(status) if status.success() => {
            tracing::debug!("command exited successfully");
            ChildExit::Succeeded
        }
        Ok(status) => {
            tracing::debug!(exit_code = ?status.code(), "command exited with failure");
            ChildExit::Failed {
                code: status.code(),
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to wait on command");
            ChildExit::WaitFailed
        }
    };
    // The arbiter may already be gone.
    let _ = tx.send(exit);
}
