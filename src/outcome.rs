use crate::duration;
use std::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No line arrived for the full timeout.
    SilenceAchieved,
    /// The command exited with status 0 before the timeout elapsed.
    ChildCompleted,
    /// The command exited non-zero, was killed, or could not be waited on.
    ChildFailed { code: Option<i32> },
    /// SIGINT or SIGTERM was received.
    Interrupted,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::SilenceAchieved | Outcome::ChildCompleted => 0,
            Outcome::ChildFailed { .. } | Outcome::Interrupted => 1,
        }
    }

    /// Human-readable final message.
    pub fn summary(&self, timeout: Duration, elapsed: Duration) -> String {
        let elapsed = duration::format(elapsed);
        match self {
            Outcome::SilenceAchieved => {
                format!("{} silence achieved after {elapsed}", duration::format(timeout))
            }
            Outcome::ChildCompleted => format!("command completed after {elapsed}"),
            Outcome::ChildFailed { code: Some(code) } => {
                format!("command failed with exit code {code} after {elapsed}")
            }
            Outcome::ChildFailed { code: None } => {
                format!("command failed after {elapsed}")
            }
            Outcome::Interrupted => format!("terminated after {elapsed}"),
        }
    }

    /// Log the final message at a level matching the outcome.
    pub fn report(&self, timeout: Duration, elapsed: Duration) {
        let message = self.summary(timeout, elapsed);
        match self {
            Outcome::SilenceAchieved | Outcome::ChildCompleted => tracing::info!("{message}"),
            Outcome::ChildFailed { .. } => tracing::error!("{message}"),
            Outcome::Interrupted => tracing::warn!("{message}"),
        }
    }
}
