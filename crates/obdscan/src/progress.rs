//! Progress reporting for long-running scans

/// Receives coarse progress updates during a scan
///
/// Purely informational; nothing a sink does affects the scan.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, message: &str, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8) + Send + Sync,
{
    fn on_progress(&self, message: &str, percent: u8) {
        self(message, percent)
    }
}

/// Sink that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _message: &str, _percent: u8) {}
}
