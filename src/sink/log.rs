//! Sink that logs every sample.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::sink::{InletSample, SampleSink};
use crate::SinkError;
use async_trait::async_trait;

/// Logs each sample at `info` level as `name: [v0, v1] (t=timestamp)`.
#[derive(Debug, Default)]
pub struct LogSink {
    written: AtomicU64,
}

impl LogSink {
    /// Creates a log sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples logged so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

/// Formats a sample as one line: `"eeg: [1, -0.5] (t=2.5)"`.
pub(crate) fn format_sample(sample: &InletSample) -> String {
    let mut line = String::with_capacity(sample.source.len() + sample.values.len() * 8 + 16);
    let _ = write!(line, "{}: [", sample.source);
    for (i, value) in sample.values.iter().enumerate() {
        if i > 0 {
            line.push_str(", ");
        }
        let _ = write!(line, "{value}");
    }
    let _ = write!(line, "] (t={})", sample.timestamp);
    line
}

#[async_trait]
impl SampleSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn write(&self, sample: &InletSample) -> Result<(), SinkError> {
        tracing::info!("{}", format_sample(sample));
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
