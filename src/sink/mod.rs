//! Sink trait and implementations for monitor samples.
//!
//! A [`SampleSink`] is any destination for samples pulled by the
//! [`InletMonitor`](crate::InletMonitor). The crate provides two built-in
//! sinks:
//!
//! - [`ChannelSink`]: Sends samples to a tokio mpsc channel
//! - [`LogSink`]: Logs every sample's values through `tracing`
//!
//! You can implement the [`SampleSink`] trait for custom destinations like
//! plotting, recording or network forwarding.

mod channel;
mod log;

pub use channel::ChannelSink;
pub use log::LogSink;

use crate::SinkError;
use async_trait::async_trait;

/// One sample pulled from one inlet.
#[derive(Debug, Clone, PartialEq)]
pub struct InletSample {
    /// Name of the stream the sample came from.
    pub source: String,
    /// Timestamp reported by the transport, in seconds.
    pub timestamp: f64,
    /// One value per channel.
    pub values: Vec<f32>,
}

impl InletSample {
    /// Creates a sample.
    pub fn new(source: impl Into<String>, timestamp: f64, values: Vec<f32>) -> Self {
        Self {
            source: source.into(),
            timestamp,
            values,
        }
    }

    /// Number of channels in this sample.
    pub fn channels(&self) -> usize {
        self.values.len()
    }
}

/// A destination for monitor samples.
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability (`Mutex`, atomics) if needed
/// - All methods are async and run on the tokio runtime
/// - `write` is called for every sink concurrently; ensure thread safety
///
/// # Example
///
/// ```
/// use inlet_bridge::{InletSample, SampleSink, SinkError};
/// use async_trait::async_trait;
///
/// struct PrintSink;
///
/// #[async_trait]
/// impl SampleSink for PrintSink {
///     fn name(&self) -> &str {
///         "print"
///     }
///
///     async fn write(&self, sample: &InletSample) -> Result<(), SinkError> {
///         println!("{}: {:?}", sample.source, sample.values);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SampleSink: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Called once before any sample is written.
    ///
    /// Default implementation does nothing.
    async fn on_start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Write one sample.
    ///
    /// Errors are logged by the monitor; the sample is not retried.
    async fn write(&self, sample: &InletSample) -> Result<(), SinkError>;

    /// Called when the monitor shuts down.
    ///
    /// Default implementation does nothing.
    async fn on_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        count: AtomicUsize,
    }

    #[async_trait]
    impl SampleSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn write(&self, _sample: &InletSample) -> Result<(), SinkError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_lifecycle() {
        let sink = CountingSink {
            count: AtomicUsize::new(0),
        };
        sink.on_start().await.unwrap();

        let sample = InletSample::new("eeg", 1.5, vec![0.1, 0.2]);
        sink.write(&sample).await.unwrap();
        sink.write(&sample).await.unwrap();
        assert_eq!(sink.count.load(Ordering::SeqCst), 2);

        sink.on_stop().await.unwrap();
    }

    #[test]
    fn test_inlet_sample_channels() {
        let sample = InletSample::new("eeg", 0.0, vec![0.0; 8]);
        assert_eq!(sample.channels(), 8);
        assert_eq!(sample.source, "eeg");
    }

    #[test]
    fn test_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn SampleSink>>();
    }
}
