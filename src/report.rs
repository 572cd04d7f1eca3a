//! Operator-facing log lines
//!
//! The presentation layer receives plain text lines through [`LogSink`]. Lines
//! may arrive from the capture thread, the discovery task or the caller of
//! `start()`; sinks marshal to their own thread if they need to.

use std::sync::Arc;

/// Receiver of operator log lines
pub trait LogSink: Send + Sync {
    fn log_line(&self, line: &str);
}

/// Sink that drops every line; diagnostics still reach the `log` facade.
#[derive(Debug, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log_line(&self, _line: &str) {}
}

/// Cloneable handle that mirrors each line to the `log` facade and the sink
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn LogSink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Reporter that only writes to the `log` facade
    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn line(&self, line: impl AsRef<str>) {
        let line = line.as_ref();
        log::info!("{}", line);
        self.sink.log_line(line);
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

/// Sink that keeps every line in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    lines: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemorySink {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

#[cfg(test)]
impl LogSink for MemorySink {
    fn log_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}
