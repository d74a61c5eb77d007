/// Line reader: one `Activity` per line read, content discarded.
use crate::duration;
use crate::metrics::LineMetrics;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Notification sent to the watchdog for every read attempt.
#[derive(Debug)]
pub enum Activity {
    /// A line (possibly unterminated at end of stream) was read.
    Line,
    /// The final read attempt: the stream is finished.
    Ended(StreamEnd),
}

#[derive(Debug)]
pub enum StreamEnd {
    Eof,
    Error(std::io::Error),
}

/// Read lines from `input` until end of stream or the first error.
///
/// Each send waits for channel capacity, so a busy watchdog slows reading
/// down instead of letting notifications pile up. Returns the number of
/// lines read.
pub async fn read_lines<R>(input: R, activity: mpsc::Sender<Activity>, verbose: bool) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut input = BufReader::new(input);
    let mut buf = Vec::new();
    let mut metrics = LineMetrics::new();

    loop {
        buf.clear();
        let end = match input.read_until(b'\n', &mut buf).await {
            Ok(0) => Some(StreamEnd::Eof),
            Ok(_) => None,
            Err(e) => Some(StreamEnd::Error(e)),
        };

        if let Some(end) = end {
            match &end {
                StreamEnd::Eof => tracing::debug!(lines = metrics.lines(), "input closed"),
                StreamEnd::Error(e) => {
                    tracing::debug!(lines = metrics.lines(), error = %e, "input read failed")
                }
            }
            let _ = activity.send(Activity::Ended(end)).await;
            return metrics.lines();
        }

        if activity.send(Activity::Line).await.is_err() {
            // Watchdog finished; nobody is listening.
            return metrics.lines();
        }

        let sample = metrics.record();
        if verbose {
            tracing::info!(
                lines = sample.lines,
                elapsed = %duration::format(sample.gap),
                "progress"
            );
        }
    }
}
