//! Progress reporting for payload fetches.

use tracing::info;

/// Receives incremental progress of a long-running fetch.
pub trait ProgressSink: Send + Sync {
    fn start(&self, _title: &str, _total: usize) {}

    /// Called once per processed item.
    fn tick(&self, completed: usize, total: usize, label: &str);

    fn done(&self, _title: &str) {}
}

/// Sink that reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn start(&self, title: &str, total: usize) {
        info!(total, "{title}");
    }

    fn tick(&self, completed: usize, total: usize, label: &str) {
        info!(
            completed,
            total,
            percent = %format!("{:.2}", percent(completed, total)),
            item = label,
            "Sync progress"
        );
    }

    fn done(&self, title: &str) {
        info!("{title} complete");
    }
}

pub(crate) fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        completed as f64 * 100.0 / total as f64
    }
}

/// Counts ticks against a fixed total.
pub(crate) struct ProgressCounter<'a> {
    sink: &'a dyn ProgressSink,
    title: &'a str,
    total: usize,
    completed: usize,
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn start(sink: &'a dyn ProgressSink, title: &'a str, total: usize) -> Self {
        sink.start(title, total);
        Self {
            sink,
            title,
            total,
            completed: 0,
        }
    }

    pub(crate) fn tick(&mut self, label: &str) {
        self.completed += 1;
        self.sink.tick(self.completed, self.total, label);
    }

    pub(crate) fn done(self) {
        self.sink.done(self.title);
    }
}
