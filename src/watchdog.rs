/// Inactivity monitor for the input stream.
///
/// Races three events: a line arriving (restart the countdown), the child
/// finishing, and the countdown running out. Whichever of the last two
/// happens first ends the run.
use crate::outcome::Outcome;
use crate::reader::{Activity, StreamEnd};
use crate::session::ChildExit;
use std::future::pending;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

pub struct Watchdog {
    timeout: Duration,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Wait until the input has been silent for the full timeout, or the
    /// child reports that it finished.
    ///
    /// `completion` is `None` when there is no child to wait for.
    pub async fn monitor(
        &self,
        mut activity: mpsc::Receiver<Activity>,
        completion: Option<oneshot::Receiver<ChildExit>>,
    ) -> Outcome {
        let deadline = time::sleep(self.timeout);
        tokio::pin!(deadline);
        let completion = wait_for_child(completion);
        tokio::pin!(completion);
        let mut reader_open = true;

        loop {
            tokio::select! {
                received = activity.recv(), if reader_open => match received {
                    Some(Activity::Line) => {
                        deadline.as_mut().reset(Instant::now() + self.timeout);
                    }
                    Some(Activity::Ended(end)) => {
                        deadline.as_mut().reset(Instant::now() + self.timeout);
                        match end {
                            StreamEnd::Eof => tracing::debug!("input stream finished"),
                            StreamEnd::Error(e) => {
                                tracing::debug!(error = %e, "input stream failed")
                            }
                        }
                    }
                    None => {
                        reader_open = false;
                    }
                },
                exit = &mut completion => {
                    return match exit {
                        ChildExit::Succeeded => Outcome::ChildCompleted,
                        ChildExit::Failed { code } => Outcome::ChildFailed { code },
                        ChildExit::WaitFailed => Outcome::ChildFailed { code: None },
                    };
                }
                () = &mut deadline => {
                    return Outcome::SilenceAchieved;
                }
            }
        }
    }
}

async fn wait_for_child(completion: Option<oneshot::Receiver<ChildExit>>) -> ChildExit {
    match completion {
        // A watcher that vanished without reporting counts as a failure.
        Some(rx) => rx.await.unwrap_or(ChildExit::WaitFailed),
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(elapsed: Duration, millis: u64) {
        let expected = Duration::from_millis(millis);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "expected ~{expected:?}, got {elapsed:?}"
        );
    }

    fn activity_channel() -> (mpsc::Sender<Activity>, mpsc::Receiver<Activity>) {
        mpsc::channel(1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_with_no_input() {
        let (_tx, rx) = activity_channel();
        let start = Instant::now();
        let outcome = Watchdog::new(Duration::from_millis(200)).monitor(rx, None).await;
        assert_eq!(outcome, Outcome::SilenceAchieved);
        assert_near(start.elapsed(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_settles_immediately() {
        let (_tx, rx) = activity_channel();
        let start = Instant::now();
        let outcome = Watchdog::new(Duration::ZERO).monitor(rx, None).await;
        assert_eq!(outcome, Outcome::SilenceAchieved);
        assert_near(start.elapsed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_line_restarts_countdown() {
        let (tx, rx) = activity_channel();
        let start = Instant::now();
        tokio::spawn(async move {
            tx.send(Activity::Line).await.unwrap();
            time::sleep(Duration::from_millis(50)).await;
            tx.send(Activity::Line).await.unwrap();
            // Keep the stream open but quiet.
            time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        let outcome = Watchdog::new(Duration::from_millis(200)).monitor(rx, None).await;
        assert_eq!(outcome, Outcome::SilenceAchieved);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(260), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_lines_keep_run_alive() {
        let (tx, rx) = activity_channel();
        let start = Instant::now();
        tokio::spawn(async move {
            for _ in 0..10 {
                tx.send(Activity::Line).await.unwrap();
                time::sleep(Duration::from_millis(150)).await;
            }
        });

        let outcome = Watchdog::new(Duration::from_millis(200)).monitor(rx, None).await;
        assert_eq!(outcome, Outcome::SilenceAchieved);
        // Last line at 1350ms.
        assert!(start.elapsed() >= Duration::from_millis(1550));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_reader_still_waits_out_timeout() {
        let (tx, rx) = activity_channel();
        let start = Instant::now();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            tx.send(Activity::Ended(StreamEnd::Eof)).await.unwrap();
        });

        let outcome = Watchdog::new(Duration::from_millis(200)).monitor(rx, None).await;
        assert_eq!(outcome, Outcome::SilenceAchieved);
        assert_near(start.elapsed(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_completion_preempts_timer() {
        let (_tx, rx) = activity_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let start = Instant::now();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            done_tx.send(ChildExit::Succeeded).unwrap();
        });

        let outcome = Watchdog::new(Duration::from_secs(1))
            .monitor(rx, Some(done_rx))
            .await;
        assert_eq!(outcome, Outcome::ChildCompleted);
        assert_near(start.elapsed(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_failure_ends_run() {
        let (_tx, rx) = activity_channel();
        let (done_tx, done_rx) = oneshot::channel();
        done_tx.send(ChildExit::Failed { code: Some(1) }).unwrap();

        let outcome = Watchdog::new(Duration::from_secs(1))
            .monitor(rx, Some(done_rx))
            .await;
        assert_eq!(outcome, Outcome::ChildFailed { code: Some(1) });
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_watcher_is_failure() {
        let (_tx, rx) = activity_channel();
        let (done_tx, done_rx) = oneshot::channel::<ChildExit>();
        drop(done_tx);

        let outcome = Watchdog::new(Duration::from_secs(1))
            .monitor(rx, Some(done_rx))
            .await;
        assert_eq!(outcome, Outcome::ChildFailed { code: None });
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_wins_over_slow_child() {
        let (_tx, rx) = activity_channel();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(5)).await;
            let _ = done_tx.send(ChildExit::Succeeded);
        });

        let outcome = Watchdog::new(Duration::from_millis(500))
            .monitor(rx, Some(done_rx))
            .await;
        assert_eq!(outcome, Outcome::SilenceAchieved);
    }
}
