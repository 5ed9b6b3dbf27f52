//! Fill task - moves frames from the open inlet into the frame buffer.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::event::emit;
use crate::pipeline::FrameProducer;
use crate::session::StreamSession;
use crate::state::BridgeState;
use crate::{BridgeEvent, EventCallback, InletError};

/// Result of one fill invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// No session is active, or the inlet had nothing ready.
    Idle,
    /// The buffer had no room; nothing was pulled.
    BufferFull,
    /// This many frames were pulled and pushed.
    Filled(usize),
    /// The session was lost and rediscovery requested.
    Lost,
    /// A transient pull error; the session stays active.
    Failed,
}

/// Pulls bounded batches from the session's inlet into the frame buffer.
///
/// Scratch storage for one batch at the maximum channel count is allocated
/// up front and reused on every invocation.
pub struct FillTask {
    samples: Box<[f32]>,
    timestamps: Box<[f64]>,
    report_interval: u64,
    max_transient_errors: u32,
    drain_on_loss: bool,
    invocations: u64,
    productive_fills: u64,
    consecutive_errors: u32,
    state: Arc<BridgeState>,
    event_callback: Option<EventCallback>,
}

impl FillTask {
    pub(crate) fn new(
        batch_frames: usize,
        max_channels: usize,
        report_interval: u64,
        max_transient_errors: u32,
        drain_on_loss: bool,
        state: Arc<BridgeState>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        Self {
            samples: vec![0.0; batch_frames * max_channels].into_boxed_slice(),
            timestamps: vec![0.0; batch_frames].into_boxed_slice(),
            report_interval,
            max_transient_errors,
            drain_on_loss,
            invocations: 0,
            productive_fills: 0,
            consecutive_errors: 0,
            state,
            event_callback,
        }
    }

    /// Largest number of frames pulled per invocation.
    pub fn batch_frames(&self) -> usize {
        self.timestamps.len()
    }

    /// Number of times [`run`](Self::run) was called.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Invocations that pushed at least one frame.
    pub fn productive_fills(&self) -> u64 {
        self.productive_fills
    }

    /// Runs one fill: pulls `min(batch, write space)` frames and pushes them.
    pub fn run(&mut self, session: &mut StreamSession, producer: &mut FrameProducer) -> FillOutcome {
        self.invocations += 1;
        if !session.is_active() {
            // A lost session's frames have been drained
            if producer.is_active() && producer.available_frames() == 0 {
                producer.deactivate();
            }
            return FillOutcome::Idle;
        }

        let space = producer.write_space();
        if space == 0 {
            return FillOutcome::BufferFull;
        }

        let channels = session.channels();
        let frames = space.min(self.batch_frames());
        let result = session.pull(
            &mut self.samples[..frames * channels],
            &mut self.timestamps[..frames],
        );

        match result {
            Ok(0) => {
                self.consecutive_errors = 0;
                FillOutcome::Idle
            }
            Ok(pulled) => {
                self.consecutive_errors = 0;
                // Never trust the inlet's count beyond what was asked for
                let pulled = if pulled > frames {
                    tracing::warn!(
                        stream = %session.name(),
                        requested = frames,
                        reported = pulled,
                        "Inlet reported more frames than requested"
                    );
                    frames
                } else {
                    pulled
                };
                for frame in self.samples[..pulled * channels].chunks_exact(channels) {
                    producer.push_frame(frame);
                }
                self.state
                    .frames_pulled
                    .fetch_add(pulled as u64, Ordering::Relaxed);
                self.productive_fills += 1;
                if self.report_interval > 0 && self.productive_fills % self.report_interval == 0 {
                    self.report(producer);
                }
                FillOutcome::Filled(pulled)
            }
            Err(e) if e.is_lost() => {
                self.lose(session, producer, &e);
                FillOutcome::Lost
            }
            Err(e) => {
                self.consecutive_errors += 1;
                self.state.pull_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    stream = %session.name(),
                    error = %e,
                    consecutive = self.consecutive_errors,
                    "Pull failed"
                );
                emit(
                    self.event_callback.as_ref(),
                    BridgeEvent::PullError {
                        name: session.name().to_string(),
                        error: e.to_string(),
                    },
                );

                if self.consecutive_errors >= self.max_transient_errors {
                    let escalated = InletError::lost(format!(
                        "{} consecutive pull errors, last: {e}",
                        self.consecutive_errors
                    ));
                    self.lose(session, producer, &escalated);
                    FillOutcome::Lost
                } else {
                    FillOutcome::Failed
                }
            }
        }
    }

    fn lose(&mut self, session: &mut StreamSession, producer: &mut FrameProducer, error: &InletError) {
        let name = session.name().to_string();
        session.mark_lost(producer, self.drain_on_loss);
        self.consecutive_errors = 0;
        self.state.losses.fetch_add(1, Ordering::Relaxed);
        self.state.request_rediscovery();

        tracing::warn!(stream = %name, reason = %error, "Stream lost");
        emit(
            self.event_callback.as_ref(),
            BridgeEvent::SourceLost {
                name,
                reason: error.to_string(),
            },
        );
    }

    fn report(&self, producer: &FrameProducer) {
        let available_frames = producer.available_frames();
        let capacity = producer.capacity();
        tracing::debug!(
            available_frames,
            capacity,
            fills = self.productive_fills,
            "Buffer status"
        );
        emit(
            self.event_callback.as_ref(),
            BridgeEvent::BufferStatus {
                available_frames,
                capacity,
            },
        );
    }
}

impl std::fmt::Debug for FillTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillTask")
            .field("batch_frames", &self.batch_frames())
            .field("invocations", &self.invocations)
            .field("productive_fills", &self.productive_fills)
            .field("consecutive_errors", &self.consecutive_errors)
            .finish_non_exhaustive()
    }
}
