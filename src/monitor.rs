//! Multi-inlet monitor.
//!
//! Where the bridge plays one audio stream, the monitor opens an inlet on
//! *every* advertised stream and forwards each pulled sample to a set of
//! [`SampleSink`]s. It is paced the same way: a [`MonitorClock`] ticked once
//! per audio block posts discovery and pull tasks, and the monitor runs them
//! as [`AuxiliaryWork`].

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::interval_to_blocks;
use crate::event::emit;
use crate::pipeline::{AcceptPolicy, AuxiliaryWork, BackgroundTask, TaskScheduler};
use crate::sink::{InletSample, SampleSink};
use crate::source::{Inlet, StreamInfo, StreamTransport};
use crate::state::{BridgeState, BridgeStats};
use crate::{
    event_callback, BridgeError, BridgeEvent, ConnectError, EventCallback, InletOptions,
    MonitorConfig,
};

/// Opens every advertised stream and fans samples out to sinks.
///
/// # Example
///
/// ```
/// use inlet_bridge::{ChannelSink, InletMonitor, MockTransport, MonitorConfig, StreamInfo};
/// use tokio::sync::mpsc;
///
/// # tokio_test_block_on(async {
/// let transport = MockTransport::new();
/// let mut outlet = transport.advertise(StreamInfo::new("eeg", 4, 250.0), 64);
/// outlet.push_frame(&[1.0, 2.0, 3.0, 4.0]);
///
/// let (tx, mut rx) = mpsc::channel(16);
/// let mut monitor = InletMonitor::new(transport, MonitorConfig::default())
///     .unwrap()
///     .add_sink(ChannelSink::new(tx));
///
/// assert_eq!(monitor.resolve_streams(), 1);
/// assert_eq!(monitor.pull_samples().await, 1);
/// assert_eq!(rx.recv().await.unwrap().values, vec![1.0, 2.0, 3.0, 4.0]);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct InletMonitor {
    transport: Box<dyn StreamTransport>,
    inlets: Vec<Box<dyn Inlet>>,
    sinks: Vec<Arc<dyn SampleSink>>,
    policy: AcceptPolicy,
    inlet_options: InletOptions,
    config: MonitorConfig,
    state: Arc<BridgeState>,
    event_callback: Option<EventCallback>,
    /// Scratch for one sample at the maximum channel count.
    values: Box<[f32]>,
}

impl InletMonitor {
    /// Creates a monitor with no sinks.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new<T: StreamTransport + 'static>(
        transport: T,
        config: MonitorConfig,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self {
            transport: Box::new(transport),
            inlets: Vec::new(),
            sinks: Vec::new(),
            policy: AcceptPolicy::All {
                max_channels: config.max_channels,
            },
            inlet_options: config.inlet.clone(),
            values: vec![0.0; config.max_channels].into_boxed_slice(),
            config,
            state: Arc::new(BridgeState::new()),
            event_callback: None,
        })
    }

    /// Add a sink to receive every pulled sample.
    #[must_use]
    pub fn add_sink<S: SampleSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Set a callback to receive runtime events.
    #[must_use]
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Creates the clock that paces this monitor from the audio callback.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidAudioFormat`] for a non-positive rate or
    /// a zero block size.
    pub fn clock(&self, sample_rate: f64, block_size: usize) -> Result<MonitorClock, BridgeError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 || block_size == 0 {
            return Err(BridgeError::InvalidAudioFormat {
                sample_rate,
                block_size,
            });
        }
        Ok(MonitorClock {
            state: Arc::clone(&self.state),
            blocks: 0,
            discovery_period_blocks: interval_to_blocks(
                self.config.discovery_interval,
                sample_rate,
                block_size,
            ),
            pull_period_blocks: u64::from(self.config.pull_period_blocks),
        })
    }

    /// Number of open inlets.
    pub fn open_inlets(&self) -> usize {
        self.inlets.len()
    }

    /// Metadata of every open inlet.
    pub fn streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.inlets.iter().map(|inlet| inlet.info())
    }

    /// Snapshot of the monitor statistics.
    pub fn stats(&self) -> BridgeStats {
        self.state.snapshot()
    }

    /// Starts all sinks.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SinkStartFailed`] for the first sink that fails.
    pub async fn start_sinks(&self) -> Result<(), BridgeError> {
        for sink in &self.sinks {
            sink.on_start()
                .await
                .map_err(|e| BridgeError::SinkStartFailed {
                    sink_name: sink.name().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Opens an inlet on every acceptable stream, if none are open.
    ///
    /// Returns the number of inlets opened. Streams that cannot be opened
    /// are logged and skipped.
    pub fn resolve_streams(&mut self) -> usize {
        if !self.inlets.is_empty() {
            return 0;
        }

        self.state.discovery_cycles.fetch_add(1, Ordering::Relaxed);
        let streams = self.transport.resolve();
        if streams.is_empty() {
            tracing::info!("No streams found");
            emit(self.event_callback.as_ref(), BridgeEvent::NoStreamsFound);
            return 0;
        }

        let advertised = streams.len();
        for info in streams {
            tracing::info!("Found stream: {info}");
            if let Err(reason) = self.policy.check(&info) {
                self.reject(&info, reason);
                continue;
            }
            match self.transport.open(&info, &self.inlet_options) {
                Ok(inlet) => {
                    self.state.connections.fetch_add(1, Ordering::Relaxed);
                    emit(
                        self.event_callback.as_ref(),
                        BridgeEvent::SourceConnected {
                            name: info.name.clone(),
                            channels: info.channel_count,
                            sample_rate: info.nominal_srate,
                        },
                    );
                    self.inlets.push(inlet);
                }
                Err(e) => self.reject(&info, ConnectError::Open(e)),
            }
        }

        let opened = self.inlets.len();
        self.sync_open_inlets();
        if opened > 0 {
            tracing::info!(opened, advertised, "Inlets opened");
            self.state.rediscover.store(false, Ordering::Release);
        } else {
            emit(
                self.event_callback.as_ref(),
                BridgeEvent::NoMatchingStream { advertised },
            );
        }
        opened
    }

    /// Pulls one sample from each open inlet and delivers them to all sinks.
    ///
    /// Lost inlets are closed and removed; once the last one is gone the
    /// monitor flags itself for rediscovery. Returns the number of samples
    /// delivered.
    pub async fn pull_samples(&mut self) -> usize {
        let mut samples = Vec::with_capacity(self.inlets.len());
        let mut lost_any = false;
        let mut timestamp = [0.0f64; 1];

        let mut i = 0;
        while i < self.inlets.len() {
            let channels = self.inlets[i].info().channel_count;
            let values = &mut self.values[..channels];
            match self.inlets[i].pull_chunk(values, &mut timestamp) {
                Ok(0) => i += 1,
                Ok(_) => {
                    let name = self.inlets[i].info().name.clone();
                    samples.push(InletSample::new(name, timestamp[0], values.to_vec()));
                    self.state.frames_pulled.fetch_add(1, Ordering::Relaxed);
                    i += 1;
                }
                Err(e) if e.is_lost() => {
                    let mut inlet = self.inlets.remove(i);
                    inlet.close();
                    lost_any = true;
                    self.state.losses.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(stream = %inlet.info().name, reason = %e, "Stream lost");
                    emit(
                        self.event_callback.as_ref(),
                        BridgeEvent::SourceLost {
                            name: inlet.info().name.clone(),
                            reason: e.to_string(),
                        },
                    );
                }
                Err(e) => {
                    self.state.pull_errors.fetch_add(1, Ordering::Relaxed);
                    let name = &self.inlets[i].info().name;
                    tracing::warn!(stream = %name, error = %e, "Pull failed");
                    emit(
                        self.event_callback.as_ref(),
                        BridgeEvent::PullError {
                            name: name.clone(),
                            error: e.to_string(),
                        },
                    );
                    i += 1;
                }
            }
        }

        if lost_any {
            self.sync_open_inlets();
            self.state.request_rediscovery();
            if self.inlets.is_empty() {
                tracing::info!("All inlets lost, waiting for streams");
                emit(self.event_callback.as_ref(), BridgeEvent::AllSourcesLost);
            }
        }

        for sample in &samples {
            deliver(&self.sinks, self.event_callback.as_ref(), sample).await;
        }
        samples.len()
    }

    /// Closes every inlet and stops all sinks.
    pub async fn close(&mut self) {
        for mut inlet in self.inlets.drain(..) {
            tracing::debug!(stream = %inlet.info().name, "Closing inlet");
            inlet.close();
        }
        self.sync_open_inlets();

        for sink in &self.sinks {
            if let Err(e) = sink.on_stop().await {
                sink_failed(self.event_callback.as_ref(), sink.name(), &e.to_string());
            }
        }
    }

    fn reject(&self, info: &StreamInfo, reason: ConnectError) {
        self.state.rejected_candidates.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(stream = %info.name, %reason, "Skipping stream");
        emit(
            self.event_callback.as_ref(),
            BridgeEvent::SourceRejected {
                name: info.name.clone(),
                reason,
            },
        );
    }

    fn sync_open_inlets(&self) {
        self.state
            .open_inlets
            .store(self.inlets.len(), Ordering::Relaxed);
    }
}

/// Writes a sample to all sinks concurrently.
async fn deliver(
    sinks: &[Arc<dyn SampleSink>],
    callback: Option<&EventCallback>,
    sample: &InletSample,
) {
    let writes = sinks
        .iter()
        .map(|sink| async move { (sink.name(), sink.write(sample).await) });

    for (name, result) in futures::future::join_all(writes).await {
        if let Err(e) = result {
            sink_failed(callback, name, &e.to_string());
        }
    }
}

fn sink_failed(callback: Option<&EventCallback>, sink_name: &str, error: &str) {
    tracing::warn!(sink = sink_name, error, "Sink error");
    emit(
        callback,
        BridgeEvent::SinkError {
            sink_name: sink_name.to_string(),
            error: error.to_string(),
        },
    );
}

#[async_trait]
impl AuxiliaryWork for InletMonitor {
    async fn run_task(&mut self, task: BackgroundTask) {
        match task {
            BackgroundTask::ResolveStreams => {
                self.resolve_streams();
            }
            BackgroundTask::FillBuffer => {
                self.pull_samples().await;
            }
        }
    }

    async fn shutdown(&mut self) {
        self.close().await;
    }
}

impl std::fmt::Debug for InletMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InletMonitor")
            .field("open_inlets", &self.inlets.len())
            .field("sinks", &self.sinks.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Paces an [`InletMonitor`] from the audio callback.
///
/// Tick once per audio block. Discovery is posted every discovery period
/// while rediscovery is flagged, and a pull every pull period while inlets
/// are open.
#[derive(Debug)]
pub struct MonitorClock {
    state: Arc<BridgeState>,
    blocks: u64,
    discovery_period_blocks: u64,
    pull_period_blocks: u64,
}

impl MonitorClock {
    /// Render blocks between discovery requests.
    pub fn discovery_period_blocks(&self) -> u64 {
        self.discovery_period_blocks
    }

    /// Advances one block and posts whatever is due.
    pub fn tick<S: TaskScheduler + ?Sized>(&mut self, scheduler: &S) {
        if self.blocks % self.discovery_period_blocks == 0 && self.state.rediscovery_requested() {
            scheduler.schedule(BackgroundTask::ResolveStreams);
        }
        if self.state.open_inlets.load(Ordering::Relaxed) > 0
            && self.blocks % self.pull_period_blocks == 0
        {
            scheduler.schedule(BackgroundTask::FillBuffer);
        }
        self.blocks = self.blocks.wrapping_add(1);
    }
}
