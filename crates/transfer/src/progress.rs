use tokio::sync::{mpsc, watch};

/// Leading characters drawn by the tool's progress bar.
const BAR_MARKER: char = '#';

/// Sink for progress fractions in `[0, 1]`.
///
/// Implemented for closures, for `watch::Sender<f64>` (a single-writer
/// value a UI can observe) and for unbounded mpsc senders.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, fraction: f64);
}

impl<F> ProgressObserver for F
where
    F: Fn(f64) + Send + Sync,
{
    fn on_progress(&self, fraction: f64) {
        self(fraction)
    }
}

impl ProgressObserver for watch::Sender<f64> {
    fn on_progress(&self, fraction: f64) {
        self.send_replace(fraction);
    }
}

impl ProgressObserver for mpsc::UnboundedSender<f64> {
    fn on_progress(&self, fraction: f64) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(fraction);
    }
}

/// Extracts a progress fraction from the tool's diagnostics output.
///
/// Returns `None` when `latest` is identical to `previous`, so unchanged
/// output never produces a redundant update. Otherwise the most recent
/// `%`-bearing frame (frames are separated by `\r` or `\n`) is taken, the
/// text before its first `%` is stripped of the leading `#` run and
/// surrounding whitespace, and the remainder is parsed as a percentage.
///
/// Malformed or out-of-range text yields `None`; it is never an error.
pub fn parse_progress(latest: &str, previous: &str) -> Option<f64> {
    if latest == previous {
        return None;
    }

    let frame = latest
        .split(['\r', '\n'])
        .rev()
        .find(|frame| frame.contains('%'))?;
    let (head, _) = frame.split_once('%')?;
    let number = head.trim().trim_start_matches(BAR_MARKER).trim();

    let percent: f64 = number.parse().ok()?;
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return None;
    }

    Some(percent / 100.0)
}
