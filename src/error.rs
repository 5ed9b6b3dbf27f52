//! Error types for inlet-bridge.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`BridgeError`]): invalid configuration that prevents a
//!   bridge from being built or started
//! - **Boundary errors** ([`InletError`], [`ConnectError`], [`SinkError`]):
//!   transport and sink failures that are handled where they occur and
//!   surfaced via [`EventCallback`](crate::EventCallback), never propagated
//!   into the render path

use std::time::Duration;

/// Fatal errors that prevent a bridge from being built or started.
///
/// These are returned from [`AudioBridgeBuilder::build()`] and friends. Once a
/// bridge runs there is no fatal error: the worst outcome is silence until a
/// compatible stream is advertised again.
///
/// [`AudioBridgeBuilder::build()`]: crate::AudioBridgeBuilder::build
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The frame buffer capacity is not a power of two (or is smaller than 2).
    #[error("buffer capacity must be a power of two >= 2, got {capacity}")]
    InvalidCapacity {
        /// The rejected capacity in frames.
        capacity: usize,
    },

    /// The maximum channel count is zero.
    #[error("maximum channel count must be at least 1, got {max_channels}")]
    InvalidChannelLimit {
        /// The rejected channel limit.
        max_channels: usize,
    },

    /// The pull batch size is zero.
    #[error("pull batch size must be at least 1 frame")]
    InvalidBatchSize,

    /// The rate tolerance is negative, not finite, or not below 1.
    #[error("rate tolerance must be within [0, 1), got {tolerance}")]
    InvalidRateTolerance {
        /// The rejected tolerance fraction.
        tolerance: f64,
    },

    /// A scheduling period is zero.
    #[error("invalid schedule: {reason}")]
    InvalidSchedule {
        /// Which period is invalid.
        reason: String,
    },

    /// The local audio format is unusable.
    #[error("invalid audio format: {sample_rate}Hz with {block_size}-frame blocks")]
    InvalidAudioFormat {
        /// Local audio clock rate.
        sample_rate: f64,
        /// Frames per render block.
        block_size: usize,
    },

    /// The stream name to match is empty.
    #[error("stream name must not be empty")]
    EmptyStreamName,

    /// No transport was configured before building.
    #[error("no transport configured - call transport() before build()")]
    NoTransport,

    /// No audio format was configured before building.
    #[error("no audio format configured - call audio_format() before build()")]
    NoAudioFormat,

    /// Background work was started outside of a tokio runtime.
    #[error("no tokio runtime available to run background tasks")]
    NoRuntime,

    /// A sample sink failed to start.
    #[error("sink '{sink_name}' failed to start: {reason}")]
    SinkStartFailed {
        /// Name of the sink.
        sink_name: String,
        /// Why it failed.
        reason: String,
    },

    /// The background worker task panicked or was cancelled.
    #[error("background worker failed: {reason}")]
    WorkerFailed {
        /// Description of the failure.
        reason: String,
    },

    /// An error from the audio output backend.
    #[error("audio backend error: {0}")]
    BackendError(String),
}

/// Errors reported by a [`StreamTransport`](crate::StreamTransport) or an
/// [`Inlet`](crate::Inlet).
///
/// [`InletError::Lost`] is distinct from every other variant: it means the
/// source is gone for good and the session must be torn down. Everything else
/// is transient.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InletError {
    /// The source has been lost and will not come back on this connection.
    #[error("stream lost: {reason}")]
    Lost {
        /// Description of the loss.
        reason: String,
    },

    /// Opening the connection failed.
    #[error("open failed: {reason}")]
    OpenFailed {
        /// Why the open call failed.
        reason: String,
    },

    /// Opening the connection did not complete in time.
    #[error("open timed out after {0:?}")]
    Timeout(Duration),

    /// A pull failed without the source being lost.
    #[error("pull failed: {reason}")]
    Pull {
        /// Why the pull failed.
        reason: String,
    },
}

impl InletError {
    /// Creates a loss error with the given reason.
    pub fn lost(reason: impl Into<String>) -> Self {
        Self::Lost {
            reason: reason.into(),
        }
    }

    /// Creates an open failure with the given reason.
    pub fn open_failed(reason: impl Into<String>) -> Self {
        Self::OpenFailed {
            reason: reason.into(),
        }
    }

    /// Creates a transient pull failure with the given reason.
    pub fn pull(reason: impl Into<String>) -> Self {
        Self::Pull {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the source is permanently lost.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost { .. })
    }
}

/// Why a discovered candidate was not connected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectError {
    /// The candidate is advertised under another name.
    #[error("name '{found}' does not match '{expected}'")]
    NameMismatch {
        /// The configured stream name.
        expected: String,
        /// The candidate's name.
        found: String,
    },

    /// The candidate's nominal rate is outside the tolerance of the local clock.
    #[error("sample rate mismatch: {nominal:.1}Hz vs {local:.1}Hz")]
    RateMismatch {
        /// The candidate's nominal rate.
        nominal: f64,
        /// The local audio clock rate.
        local: f64,
    },

    /// The candidate has no channels or more than the buffer supports.
    #[error("invalid channel count: {channels} (max {max})")]
    InvalidChannelCount {
        /// The candidate's channel count.
        channels: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The transport refused to open the connection.
    #[error("failed to open inlet: {0}")]
    Open(#[source] InletError),
}

/// Errors that can occur within a [`SampleSink`](crate::SampleSink).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A write operation failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Custom error for user-implemented sinks.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }
}
