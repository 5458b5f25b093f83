//! Progress reporting for transfers and bulk operations.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Progress of a transfer (bytes) or a bulk operation (keys).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub done: u64,
    pub total: u64,
    /// Path or operation being reported
    pub label: String,
}

impl TransferProgress {
    pub fn new(done: u64, total: u64, label: impl Into<String>) -> Self {
        Self {
            done,
            total,
            label: label.into(),
        }
    }

    /// Completion between 0.0 and 100.0. Empty work reports 100.
    pub fn percent(&self) -> f64 {
        match self.total {
            0 => 100.0,
            total => (self.done.min(total) as f64 / total as f64) * 100.0,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.done)
    }

    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

/// Observer for [`TransferProgress`] updates.
///
/// Callbacks may run on worker threads and cannot cancel the operation.
pub type ProgressCallback = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Counter shared by the workers of one fan-out, reporting after each step.
pub(crate) struct ProgressCounter {
    done: AtomicU64,
    total: u64,
    label: String,
    callback: Option<ProgressCallback>,
}

impl ProgressCounter {
    pub(crate) fn new(total: u64, label: impl Into<String>, callback: Option<ProgressCallback>) -> Self {
        Self {
            done: AtomicU64::new(0),
            total,
            label: label.into(),
            callback,
        }
    }

    /// Record `n` finished units and notify the callback.
    pub(crate) fn advance(&self, n: u64) -> u64 {
        let done = self.done.fetch_add(n, Ordering::Relaxed) + n;
        if let Some(cb) = &self.callback {
            cb(&TransferProgress::new(done, self.total, self.label.as_str()));
        }
        done
    }
}

/// Callback drawing a one-line progress bar on stderr.
///
/// # Example
/// ```
/// use objfs::progress::{TransferProgress, make_progress_bar};
///
/// let bar = make_progress_bar();
/// bar(&TransferProgress::new(3, 4, "bucket@ns/file"));
/// ```
pub fn make_progress_bar() -> ProgressCallback {
    const WIDTH: usize = 32;
    Arc::new(|p: &TransferProgress| {
        let filled = (p.percent() / 100.0 * WIDTH as f64).round() as usize;
        let mut err = std::io::stderr().lock();
        let _ = write!(
            err,
            "\r{} [{:<width$}] {:>5.1}% ({}/{})",
            p.label,
            "#".repeat(filled.min(WIDTH)),
            p.percent(),
            p.done,
            p.total,
            width = WIDTH
        );
        if p.is_complete() {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_percent() {
        assert_eq!(TransferProgress::new(0, 0, "x").percent(), 100.0);
        assert_eq!(TransferProgress::new(5, 10, "x").percent(), 50.0);
        assert_eq!(TransferProgress::new(12, 10, "x").percent(), 100.0);
        assert_eq!(TransferProgress::new(3, 10, "x").remaining(), 7);
        assert!(TransferProgress::new(10, 10, "x").is_complete());
    }

    #[test]
    fn test_counter_reports_running_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let counter = ProgressCounter::new(
            5,
            "job",
            Some(Arc::new(move |p: &TransferProgress| {
                sink.lock().push((p.done, p.total, p.label.clone()))
            })),
        );
        counter.advance(2);
        assert_eq!(counter.advance(3), 5);
        assert_eq!(
            *seen.lock(),
            vec![(2, 5, "job".to_string()), (5, 5, "job".to_string())]
        );

        assert_eq!(ProgressCounter::new(1, "quiet", None).advance(1), 1);
    }
}
