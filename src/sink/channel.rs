//! Sink that forwards monitor samples into a tokio mpsc channel.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::sink::{InletSample, SampleSink};
use crate::SinkError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Forwards monitor samples to a tokio mpsc channel.
///
/// The monitor opens every advertised stream, so a consumer interested in a
/// few of them can restrict the sink with [`only_streams`](Self::only_streams);
/// samples from other streams are skipped without error.
///
/// # Example
///
/// ```
/// use inlet_bridge::{ChannelSink, InletSample};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<InletSample>(100);
/// let sink = ChannelSink::new(tx).only_streams(["eeg"]);
///
/// // Add the sink to an InletMonitor, then receive "eeg" samples:
/// // while let Some(sample) = rx.recv().await { ... }
/// ```
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<InletSample>,
    streams: Option<Vec<String>>,
    forwarded: AtomicU64,
}

impl ChannelSink {
    /// Creates a sink named `"channel"` that forwards every stream.
    pub fn new(sender: mpsc::Sender<InletSample>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a sink with a custom name, used in logs and
    /// [`BridgeEvent::SinkError`](crate::BridgeEvent::SinkError).
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<InletSample>) -> Self {
        Self {
            name: name.into(),
            sender,
            streams: None,
            forwarded: AtomicU64::new(0),
        }
    }

    /// Forwards only samples whose source is one of `names`.
    #[must_use]
    pub fn only_streams<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Whether samples from `source` are forwarded.
    pub fn accepts(&self, source: &str) -> bool {
        self.streams
            .as_ref()
            .map_or(true, |names| names.iter().any(|name| name == source))
    }

    /// Samples sent into the channel so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SampleSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, sample: &InletSample) -> Result<(), SinkError> {
        if !self.accepts(&sample.source) {
            return Ok(());
        }
        self.sender
            .send(sample.clone())
            .await
            .map_err(|_| SinkError::ChannelClosed)?;
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), SinkError> {
        tracing::debug!(
            sink = %self.name,
            forwarded = self.forwarded(),
            "Channel sink stopped"
        );
        Ok(())
    }
}
