use std::time::Instant;

use tracing_appender::non_blocking::WorkerGuard;

/// Keeps the logging pipeline alive. Dropping it flushes the file sink.
#[derive(Default)]
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self { file_guard }
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Flushes buffered file output and stops the background writer.
    pub fn shutdown(mut self) {
        let started = Instant::now();
        tracing::debug!(file_sink = self.has_file_sink(), "logging shutdown");
        drop(self.file_guard.take());
        // The file sink is gone; only the console sees this.
        tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "logging shut down");
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.has_file_sink())
            .finish()
    }
}
