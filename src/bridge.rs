//! Builder and background worker for the single-stream audio bridge.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{blocks_to_interval, interval_to_blocks};
use crate::pipeline::{
    frame_buffer, spawn_auxiliary, AcceptPolicy, AuxHandle, AuxScheduler, AuxiliaryWork,
    BackgroundTask, Discovery, DiscoveryOutcome, FillOutcome, FillTask, FrameProducer, RenderStep,
};
use crate::session::{SessionState, StreamSession};
use crate::source::StreamTransport;
use crate::state::{BridgeState, BridgeStats};
use crate::{event_callback, BridgeConfig, BridgeError, BridgeEvent, EventCallback};

/// Builder for wiring a transport to a real-time render step.
///
/// Use [`AudioBridge::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use inlet_bridge::{AudioBridge, MockTransport, StreamInfo};
///
/// let transport = MockTransport::new();
/// let mut outlet = transport.advertise(StreamInfo::new("audio", 2, 48000.0), 4096);
/// outlet.push_sine(440.0, 1024);
///
/// let (mut render, mut worker) = AudioBridge::builder()
///     .stream_name("audio")
///     .transport(transport)
///     .audio_format(48000.0, 256)
///     .build()
///     .unwrap();
///
/// worker.resolve_streams();
/// worker.fill_buffer();
/// assert!(render.available_frames() > 0);
/// ```
#[must_use]
pub struct AudioBridgeBuilder {
    config: BridgeConfig,
    transport: Option<Box<dyn StreamTransport>>,
    /// Local sample rate and render block size.
    audio_format: Option<(f64, usize)>,
    event_callback: Option<EventCallback>,
}

impl Default for AudioBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBridgeBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            transport: None,
            audio_format: None,
            event_callback: None,
        }
    }

    /// Sets the stream name to connect to.
    ///
    /// Default: `"audio"`
    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.config.stream_name = name.into();
        self
    }

    /// Replaces the whole configuration, stream name included.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the transport streams are discovered and opened through.
    pub fn transport<T: StreamTransport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Sets the local audio clock rate and the frames per render block.
    ///
    /// Only streams whose nominal rate matches `sample_rate` are connected;
    /// both values turn scheduling intervals into block counts.
    pub fn audio_format(mut self, sample_rate: f64, block_size: usize) -> Self {
        self.audio_format = Some((sample_rate, block_size));
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events cover discovery results, connections, losses and periodic
    /// buffer reports. They are only emitted from background tasks.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the configuration and allocates the bridge.
    ///
    /// Returns the real-time half and the background half. Drive the worker
    /// yourself, or use [`start()`](Self::start) to run it on tokio.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid (see [`BridgeConfig::validate()`])
    /// - No transport or audio format was set
    /// - The audio format has a non-positive rate or zero block size
    pub fn build(self) -> Result<(RenderStep, BridgeWorker), BridgeError> {
        self.config.validate()?;
        let transport = self.transport.ok_or(BridgeError::NoTransport)?;
        let (sample_rate, block_size) = self.audio_format.ok_or(BridgeError::NoAudioFormat)?;
        if !sample_rate.is_finite() || sample_rate <= 0.0 || block_size == 0 {
            return Err(BridgeError::InvalidAudioFormat {
                sample_rate,
                block_size,
            });
        }

        let config = self.config;
        let (producer, consumer) = frame_buffer(config.buffer_frames, config.max_channels)?;
        let state = Arc::new(BridgeState::new());
        let discovery_period = interval_to_blocks(config.discovery_interval, sample_rate, block_size);

        tracing::info!(
            stream = %config.stream_name,
            sample_rate,
            block_size,
            buffer_frames = config.buffer_frames,
            discovery_period_blocks = discovery_period,
            "Audio bridge created"
        );

        let render = RenderStep::new(
            consumer,
            config.max_channels,
            Arc::clone(&state),
            discovery_period,
            u64::from(config.fill_period_blocks),
        );

        let discovery = Discovery::new(
            AcceptPolicy::FirstMatching {
                stream_name: config.stream_name.clone(),
                local_rate: sample_rate,
                tolerance: config.rate_tolerance,
                max_channels: config.max_channels,
            },
            config.inlet.clone(),
            Arc::clone(&state),
            self.event_callback.clone(),
        );
        let fill = FillTask::new(
            config.pull_batch_frames,
            config.max_channels,
            config.report_interval,
            config.max_transient_errors,
            config.drain_on_loss,
            Arc::clone(&state),
            self.event_callback,
        );

        let worker = BridgeWorker {
            transport,
            session: StreamSession::new(),
            producer,
            discovery,
            fill,
            state,
        };
        Ok((render, worker))
    }

    /// Builds the bridge and spawns its worker on the current tokio runtime.
    ///
    /// The first discovery pass is posted immediately. Pass the handle's
    /// [`scheduler()`](BridgeHandle::scheduler) to every
    /// [`RenderStep::render()`] call.
    ///
    /// # Errors
    ///
    /// Everything [`build()`](Self::build) returns, plus
    /// [`BridgeError::NoRuntime`] outside a tokio runtime.
    pub fn start(self) -> Result<(RenderStep, BridgeHandle), BridgeError> {
        let audio_format = self.audio_format;
        let (render, worker) = self.build()?;
        let state = Arc::clone(&worker.state);

        // Poll twice per fill period so a posted fill never waits a full one
        let mut scheduler = AuxScheduler::new();
        if let Some((sample_rate, block_size)) = audio_format {
            let fill_period =
                blocks_to_interval(render.fill_period_blocks(), sample_rate, block_size);
            scheduler = scheduler.with_poll_interval(fill_period / 2);
        }
        let worker = spawn_auxiliary(&scheduler, worker)?;
        Ok((
            render,
            BridgeHandle {
                scheduler,
                worker,
                state,
            },
        ))
    }
}

/// Main entry point for the single-stream bridge.
///
/// Use [`AudioBridge::builder()`] to start configuring a bridge.
pub struct AudioBridge;

impl AudioBridge {
    /// Creates a new builder for configuring a bridge.
    pub fn builder() -> AudioBridgeBuilder {
        AudioBridgeBuilder::new()
    }
}

/// Background half of the bridge: owns the transport, the session and the
/// producer side of the frame buffer.
///
/// Every method may allocate or do I/O and must never run on the render
/// thread.
pub struct BridgeWorker {
    transport: Box<dyn StreamTransport>,
    session: StreamSession,
    producer: FrameProducer,
    discovery: Discovery,
    fill: FillTask,
    state: Arc<BridgeState>,
}

impl BridgeWorker {
    /// Runs one discovery pass.
    pub fn resolve_streams(&mut self) -> DiscoveryOutcome {
        let outcome = self
            .discovery
            .run(&mut *self.transport, &mut self.session, &mut self.producer);
        self.sync_open_inlets();
        outcome
    }

    /// Runs one fill.
    pub fn fill_buffer(&mut self) -> FillOutcome {
        let outcome = self.fill.run(&mut self.session, &mut self.producer);
        if outcome == FillOutcome::Lost {
            self.sync_open_inlets();
        }
        outcome
    }

    /// Runs the given task.
    pub fn run_task(&mut self, task: BackgroundTask) {
        match task {
            BackgroundTask::ResolveStreams => {
                self.resolve_streams();
            }
            BackgroundTask::FillBuffer => {
                self.fill_buffer();
            }
        }
    }

    /// Lifecycle state of the session.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// The session feeding the buffer.
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Snapshot of the bridge statistics.
    pub fn stats(&self) -> BridgeStats {
        self.state.snapshot()
    }

    /// Closes any open inlet and silences the render path.
    pub fn close(&mut self) {
        if self.session.state() != SessionState::Absent {
            tracing::info!(stream = %self.session.name(), "Closing stream");
        }
        self.session.close(&mut self.producer);
        self.sync_open_inlets();
    }

    fn sync_open_inlets(&self) {
        self.state.open_inlets.store(
            usize::from(self.session.is_active()),
            std::sync::atomic::Ordering::Relaxed,
        );
    }
}

#[async_trait]
impl AuxiliaryWork for BridgeWorker {
    async fn run_task(&mut self, task: BackgroundTask) {
        BridgeWorker::run_task(self, task);
    }

    async fn shutdown(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BridgeWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeWorker")
            .field("session", &self.session)
            .field("fill", &self.fill)
            .finish_non_exhaustive()
    }
}

/// Handle to a bridge whose worker runs on tokio.
#[derive(Debug)]
pub struct BridgeHandle {
    scheduler: AuxScheduler,
    worker: AuxHandle<BridgeWorker>,
    state: Arc<BridgeState>,
}

impl BridgeHandle {
    /// The scheduler to pass to [`RenderStep::render()`].
    pub fn scheduler(&self) -> AuxScheduler {
        self.scheduler.clone()
    }

    /// Snapshot of the bridge statistics.
    pub fn stats(&self) -> BridgeStats {
        self.state.snapshot()
    }

    /// Number of open inlets (0 or 1).
    pub fn open_inlets(&self) -> usize {
        self.state
            .open_inlets
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Stops the worker, closes the inlet and returns the final statistics.
    pub async fn stop(self) -> Result<BridgeStats, BridgeError> {
        let worker = self.worker.stop().await?;
        Ok(worker.stats())
    }
}
