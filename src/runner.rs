/// One run: acquire the input, start the reader, wait for silence, clean up.
use crate::config::Settings;
use crate::outcome::Outcome;
use crate::reader;
use crate::session::{self, GroupSlot, SessionError};
use crate::watchdog::Watchdog;
use tokio::sync::mpsc;

/// Monitor the configured input until it settles.
///
/// `group` receives the child's process group as soon as it exists, so the
/// signal handler can reach it. The group is terminated before this returns.
pub async fn run(settings: &Settings, group: &GroupSlot) -> Result<Outcome, SessionError> {
    let (input, completion) =
        session::acquire(settings.command.as_deref(), settings.verbose, group)?;

    // Capacity 1: a line is only read once the previous one has been seen.
    let (tx, rx) = mpsc::channel(1);
    let verbose = settings.verbose;
    tokio::spawn(async move {
        let lines = reader::read_lines(input.into_reader(), tx, verbose).await;
        tracing::debug!(lines, "reader stopped");
    });

    let outcome = Watchdog::new(settings.timeout)
        .monitor(rx, completion)
        .await;

    session::terminate_group(group);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn settings(timeout: Duration, command: &str) -> Settings {
        Settings {
            timeout,
            command: Some(command.to_string()),
            verbose: false,
        }
    }

    #[tokio::test]
    async fn test_command_completion_preempts_timeout() {
        let group = GroupSlot::default();
        let start = Instant::now();
        let outcome = run(&settings(Duration::from_secs(1), "sleep 0.1; echo done"), &group)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::ChildCompleted);
        assert!(start.elapsed() < Duration::from_millis(900));
        assert!(group.get().is_some());
    }

    #[tokio::test]
    async fn test_failing_command_ends_run_early() {
        let group = GroupSlot::default();
        let start = Instant::now();
        let outcome = run(&settings(Duration::from_secs(1), "false"), &group)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::ChildFailed { code: Some(1) });
        assert_eq!(outcome.exit_code(), 1);
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_quiet_command_reaches_silence() {
        let group = GroupSlot::default();
        let outcome = run(
            &settings(Duration::from_millis(200), "echo started; sleep 30"),
            &group,
        )
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::SilenceAchieved);
        assert_eq!(outcome.exit_code(), 0);
    }

    /// Poll until every process in the group has exited and been reaped.
    async fn assert_group_gone(group: &GroupSlot) {
        let group = group.get().unwrap();
        for _ in 0..50 {
            if group.terminate() == Ok(false) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("process group {} still alive", group.id());
    }

    #[tokio::test]
    async fn test_silence_terminates_leftover_group() {
        let group = GroupSlot::default();
        run(&settings(Duration::from_millis(100), "sleep 30"), &group)
            .await
            .unwrap();
        assert_group_gone(&group).await;
    }

    #[tokio::test]
    async fn test_completion_terminates_background_children() {
        // The shell exits 0 right away but leaves a sleeper in its group.
        let group = GroupSlot::default();
        let outcome = run(&settings(Duration::from_secs(5), "sleep 30 & echo done"), &group)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::ChildCompleted);
        assert_group_gone(&group).await;
    }
}
