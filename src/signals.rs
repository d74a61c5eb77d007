/// Signal handling for hard shutdown.
///
/// SIGINT (Ctrl-C) or SIGTERM: terminate the child's process group (if any),
/// log that the run was interrupted, and exit 1. Only the first signal is
/// serviced; the process is gone before a second one matters.
use crate::outcome::Outcome;
use crate::session::{self, GroupSlot};
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, Signal, SignalKind};

pub struct SignalHandler {
    interrupt: Signal,
    terminate: Signal,
}

/// Which signal ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Interrupt,
    Terminate,
}

impl SignalHandler {
    /// Register SIGINT and SIGTERM listeners.
    pub fn install() -> std::io::Result<SignalHandler> {
        Ok(SignalHandler {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first SIGINT or SIGTERM.
    pub async fn recv(&mut self) -> Received {
        tokio::select! {
            _ = self.interrupt.recv() => Received::Interrupt,
            _ = self.terminate.recv() => Received::Terminate,
        }
    }

    /// Spawn the listener. On the first signal it cleans up the child's group
    /// and exits the process without going through the watchdog.
    pub fn spawn(mut self, group: GroupSlot, timeout: Duration, start: Instant) {
        tokio::spawn(async move {
            let received = self.recv().await;
            tracing::debug!(signal = ?received, "shutdown signal received");
            let outcome = interrupt(&group);
            outcome.report(timeout, start.elapsed());
            std::process::exit(outcome.exit_code());
        });
    }
}

/// Terminate the child's group, if there is one.
pub fn interrupt(group: &GroupSlot) -> Outcome {
    session::terminate_group(group);
    Outcome::Interrupted
}
