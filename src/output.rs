//! CPAL output device driving a [`RenderStep`].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig,
    SupportedBufferSize,
};

use crate::pipeline::{InterleavedOutput, RenderStep, TaskScheduler};
use crate::BridgeError;

/// Block size assumed when the device does not report a fixed one.
const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Wrapper around a CPAL audio output device.
///
/// Query [`sample_rate()`](Self::sample_rate) and
/// [`block_size()`](Self::block_size) to configure the bridge, then hand
/// the render step to [`start()`](Self::start).
#[must_use]
pub struct CpalOutput {
    device: Device,
    config: CpalStreamConfig,
}

impl CpalOutput {
    /// Opens the default output device at its default configuration.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if there is no default output device or it
    /// does not play `f32` samples.
    pub fn open_default() -> Result<Self, BridgeError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| BridgeError::BackendError("no default output device".to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| BridgeError::BackendError(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(BridgeError::BackendError(format!(
                "unsupported output sample format: {:?}",
                supported.sample_format()
            )));
        }

        let mut config: CpalStreamConfig = supported.into();
        config.buffer_size = BufferSize::Fixed(DEFAULT_BLOCK_SIZE);
        Ok(Self { device, config })
    }

    /// Requests a fixed callback size in frames.
    pub fn with_block_size(mut self, frames: u32) -> Self {
        self.config.buffer_size = BufferSize::Fixed(frames.max(1));
        self
    }

    /// Returns the device name.
    pub fn name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "unknown".to_string())
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        f64::from(self.config.sample_rate.0)
    }

    /// Output channel count.
    pub fn channels(&self) -> usize {
        usize::from(self.config.channels)
    }

    /// Frames per callback.
    pub fn block_size(&self) -> usize {
        match self.config.buffer_size {
            BufferSize::Fixed(frames) => frames as usize,
            BufferSize::Default => DEFAULT_BLOCK_SIZE as usize,
        }
    }

    /// Starts playback, calling `render` once per device callback.
    ///
    /// If the device cannot honour the fixed block size the device default
    /// is used instead.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the stream cannot be built or started.
    pub fn start<S>(&self, mut render: RenderStep, scheduler: S) -> Result<OutputStream, BridgeError>
    where
        S: TaskScheduler + Send + 'static,
    {
        let channels = self.channels();
        let config = self.playable_config();

        let stream = self
            .device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render.render(&mut InterleavedOutput::new(data, channels), &scheduler);
                },
                |err| {
                    tracing::error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| BridgeError::BackendError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| BridgeError::BackendError(e.to_string()))?;

        tracing::info!(
            device = %self.name(),
            sample_rate = self.sample_rate(),
            channels,
            "Audio output started"
        );
        Ok(OutputStream { _stream: stream })
    }

    /// The configured stream, with the block size dropped if the device
    /// does not list it as supported.
    fn playable_config(&self) -> CpalStreamConfig {
        let BufferSize::Fixed(frames) = self.config.buffer_size else {
            return self.config.clone();
        };

        let supported = self
            .device
            .supported_output_configs()
            .map(|mut ranges| {
                ranges.any(|range| {
                    range.channels() == self.config.channels
                        && matches!(
                            range.buffer_size(),
                            SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&frames)
                        )
                })
            })
            .unwrap_or(false);

        if supported {
            self.config.clone()
        } else {
            tracing::warn!(frames, "Fixed block size not supported, using device default");
            CpalStreamConfig {
                buffer_size: BufferSize::Default,
                ..self.config.clone()
            }
        }
    }
}

/// A running audio output stream.
///
/// Playback continues while this struct is held and stops when it is dropped.
pub struct OutputStream {
    /// The underlying CPAL stream. Dropping this stops playback.
    _stream: Stream,
}
