//! Runtime events for monitoring stream health.
//!
//! Events are non-fatal notifications about discovery, connection and
//! buffering. The bridge keeps running after any event - they're for
//! logging/metrics, not error handling.

use std::sync::Arc;

use crate::ConnectError;

/// Runtime events emitted by the background tasks.
///
/// These are never emitted from the render path.
///
/// # Example
///
/// ```
/// use inlet_bridge::BridgeEvent;
///
/// fn handle_event(event: BridgeEvent) {
///     match event {
///         BridgeEvent::SourceConnected { name, channels, sample_rate } => {
///             eprintln!("connected to {name}: {channels}ch @ {sample_rate}Hz");
///         }
///         BridgeEvent::SourceLost { name, reason } => {
///             eprintln!("lost {name}: {reason}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A discovery pass found no advertised streams at all.
    NoStreamsFound,

    /// Streams are advertised, but none was accepted this pass.
    NoMatchingStream {
        /// Number of streams that were advertised.
        advertised: usize,
    },

    /// A candidate stream was skipped.
    SourceRejected {
        /// Name of the rejected stream.
        name: String,
        /// Why it was rejected.
        reason: ConnectError,
    },

    /// An inlet was opened and the buffer reset for it.
    SourceConnected {
        /// Name of the connected stream.
        name: String,
        /// Channel count of the stream.
        channels: usize,
        /// Nominal sample rate of the stream.
        sample_rate: f64,
    },

    /// An open inlet reported that its source is gone.
    SourceLost {
        /// Name of the lost stream.
        name: String,
        /// Description of the loss.
        reason: String,
    },

    /// Every inlet of the monitor has been lost.
    AllSourcesLost,

    /// A pull failed without losing the source.
    PullError {
        /// Name of the stream.
        name: String,
        /// Description of the error.
        error: String,
    },

    /// A sample sink failed to accept a monitor sample.
    SinkError {
        /// Name of the sink that failed.
        sink_name: String,
        /// Description of the error.
        error: String,
    },

    /// Periodic buffer occupancy report.
    BufferStatus {
        /// Frames waiting to be rendered.
        available_frames: usize,
        /// Buffer capacity in frames.
        capacity: usize,
    },
}

/// Callback type for receiving runtime events.
///
/// Register an event callback via [`AudioBridgeBuilder::on_event()`].
///
/// [`AudioBridgeBuilder::on_event()`]: crate::AudioBridgeBuilder::on_event
pub type EventCallback = Arc<dyn Fn(BridgeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use inlet_bridge::{event_callback, BridgeEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(BridgeEvent::NoStreamsFound);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(BridgeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Sends an event to an optional callback.
pub(crate) fn emit(callback: Option<&EventCallback>, event: BridgeEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}
