//! Configuration types for the bridge and the inlet monitor.

use std::time::Duration;

use crate::BridgeError;

/// Stream name matched by default, as advertised by the WAV streaming tool.
pub const DEFAULT_STREAM_NAME: &str = "audio";

/// Options passed to the transport when opening an inlet.
#[derive(Debug, Clone, PartialEq)]
pub struct InletOptions {
    /// How much data the transport may buffer on the receiving side.
    ///
    /// Default: 360 seconds
    pub max_buffered: Duration,

    /// Preferred chunk length in samples; `0` keeps the sender's chunking.
    ///
    /// Default: 0
    pub max_chunk_len: usize,

    /// Whether the transport should transparently recover a dropped
    /// connection when the same source reappears.
    ///
    /// Default: true
    pub recover: bool,

    /// How long opening the connection may take.
    ///
    /// Default: 1 second
    pub open_timeout: Duration,
}

impl Default for InletOptions {
    fn default() -> Self {
        Self {
            max_buffered: Duration::from_secs(360),
            max_chunk_len: 0,
            recover: true,
            open_timeout: Duration::from_secs(1),
        }
    }
}

/// Configuration for the single-stream audio bridge.
///
/// Use [`BridgeConfig::default()`] for the values the bridge was tuned with,
/// or customize as needed.
///
/// # Example
///
/// ```
/// use inlet_bridge::BridgeConfig;
///
/// let config = BridgeConfig {
///     stream_name: "synth".to_string(),
///     buffer_frames: 4096,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Name a stream must be advertised under to be connected.
    ///
    /// Default: `"audio"`
    pub stream_name: String,

    /// Frame buffer capacity in frames. Must be a power of two.
    ///
    /// One frame is always kept free, so at most `buffer_frames - 1` frames
    /// are buffered.
    /// Default: 8192
    pub buffer_frames: usize,

    /// Largest channel count a stream may have to be accepted.
    ///
    /// Default: 8
    pub max_channels: usize,

    /// Upper bound on frames pulled per fill invocation.
    ///
    /// Default: 512
    pub pull_batch_frames: usize,

    /// Maximum relative difference between a stream's nominal rate and the
    /// local audio rate.
    ///
    /// Default: 0.001 (0.1%)
    pub rate_tolerance: f64,

    /// Interval between discovery passes while no stream is connected.
    ///
    /// Converted to a whole number of render blocks.
    /// Default: 500ms
    pub discovery_interval: Duration,

    /// Schedule a fill every this many render blocks while connected.
    ///
    /// Default: 8
    pub fill_period_blocks: u32,

    /// Log buffer occupancy every this many productive fills.
    ///
    /// Default: 1000
    pub report_interval: u64,

    /// Consecutive transient pull errors tolerated before the session is
    /// treated as lost.
    ///
    /// Default: 8
    pub max_transient_errors: u32,

    /// Keep playing already buffered frames after the stream is lost.
    ///
    /// When `false` the render path goes silent as soon as the loss is
    /// detected.
    /// Default: false
    pub drain_on_loss: bool,

    /// Options used when opening the inlet.
    pub inlet: InletOptions,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            buffer_frames: 8192,
            max_channels: 8,
            pull_batch_frames: 512,
            rate_tolerance: 0.001,
            discovery_interval: Duration::from_millis(500),
            fill_period_blocks: 8,
            report_interval: 1000,
            max_transient_errors: 8,
            drain_on_loss: false,
            inlet: InletOptions::default(),
        }
    }
}

impl BridgeConfig {
    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.stream_name.is_empty() {
            return Err(BridgeError::EmptyStreamName);
        }
        if self.buffer_frames < 2 || !self.buffer_frames.is_power_of_two() {
            return Err(BridgeError::InvalidCapacity {
                capacity: self.buffer_frames,
            });
        }
        if self.max_channels == 0 {
            return Err(BridgeError::InvalidChannelLimit {
                max_channels: self.max_channels,
            });
        }
        if self.pull_batch_frames == 0 {
            return Err(BridgeError::InvalidBatchSize);
        }
        if !self.rate_tolerance.is_finite() || !(0.0..1.0).contains(&self.rate_tolerance) {
            return Err(BridgeError::InvalidRateTolerance {
                tolerance: self.rate_tolerance,
            });
        }
        if self.discovery_interval.is_zero() {
            return Err(BridgeError::InvalidSchedule {
                reason: "discovery interval is zero".to_string(),
            });
        }
        if self.fill_period_blocks == 0 {
            return Err(BridgeError::InvalidSchedule {
                reason: "fill period is zero blocks".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for the multi-inlet monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Largest channel count a stream may have to be opened.
    ///
    /// Default: 64
    pub max_channels: usize,

    /// Interval between discovery passes while rediscovery is flagged.
    ///
    /// Default: 1 second
    pub discovery_interval: Duration,

    /// Schedule a pull every this many blocks while inlets are open.
    ///
    /// Default: 1
    pub pull_period_blocks: u32,

    /// Options used when opening each inlet.
    pub inlet: InletOptions,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_channels: 64,
            discovery_interval: Duration::from_secs(1),
            pull_period_blocks: 1,
            inlet: InletOptions::default(),
        }
    }
}

impl MonitorConfig {
    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.max_channels == 0 {
            return Err(BridgeError::InvalidChannelLimit {
                max_channels: self.max_channels,
            });
        }
        if self.discovery_interval.is_zero() || self.pull_period_blocks == 0 {
            return Err(BridgeError::InvalidSchedule {
                reason: "monitor periods must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Converts a wall-clock interval into a whole number of render blocks.
///
/// Never returns less than one block.
pub(crate) fn interval_to_blocks(
    interval: Duration,
    sample_rate: f64,
    block_size: usize,
) -> u64 {
    let blocks = interval.as_secs_f64() * sample_rate / block_size as f64;
    (blocks.round() as u64).max(1)
}

/// Wall-clock length of `blocks` render blocks.
pub(crate) fn blocks_to_interval(blocks: u64, sample_rate: f64, block_size: usize) -> Duration {
    Duration::from_secs_f64(blocks as f64 * block_size as f64 / sample_rate)
}
