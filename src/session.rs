//! Stream session lifecycle.
//!
//! A [`StreamSession`] owns the inlet of the one stream currently feeding the
//! frame buffer and tracks where it is in its lifecycle:
//!
//! ```text
//! Absent ──candidate found──▶ Connecting ──opened──▶ Active ──loss──▶ Lost
//!    ▲            │ open failed                                     │
//!    └────────────┴─────────────────next discovery pass─────────────┘
//! ```
//!
//! The session lives entirely on the background context. The render path
//! never sees it; it only observes the frame buffer's active flag, which the
//! session flips through the [`FrameProducer`].

use std::fmt;

use crate::pipeline::FrameProducer;
use crate::source::{Inlet, StreamInfo};
use crate::{ConnectError, InletError};

/// Lifecycle state of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No stream is connected; discovery may open one.
    #[default]
    Absent,
    /// A candidate passed the checks and is being opened.
    Connecting,
    /// An inlet is open and feeding the buffer.
    Active,
    /// The inlet reported a loss and was closed.
    Lost,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Lost => "lost",
        };
        f.write_str(name)
    }
}

/// The connection to the stream currently feeding the frame buffer.
#[derive(Default)]
pub struct StreamSession {
    state: SessionState,
    inlet: Option<Box<dyn Inlet>>,
    info: Option<StreamInfo>,
}

impl StreamSession {
    /// Creates an absent session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` while an inlet is open and feeding the buffer.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Metadata of the connecting or connected stream.
    pub fn info(&self) -> Option<&StreamInfo> {
        self.info.as_ref()
    }

    /// Channel count of the connected stream, 0 if none.
    pub fn channels(&self) -> usize {
        self.info.as_ref().map_or(0, |info| info.channel_count)
    }

    /// Nominal rate of the connected stream, 0 if none.
    pub fn nominal_rate(&self) -> f64 {
        self.info.as_ref().map_or(0.0, |info| info.nominal_srate)
    }

    /// Name of the connecting or connected stream.
    pub fn name(&self) -> &str {
        self.info.as_ref().map_or("", |info| info.name.as_str())
    }

    /// `Lost` becomes `Absent`, clearing the previous stream's fields.
    ///
    /// Called at the start of each discovery pass.
    pub fn settle(&mut self) {
        if self.state == SessionState::Lost {
            self.info = None;
            self.state = SessionState::Absent;
        }
    }

    /// Records the candidate being opened.
    pub(crate) fn begin_connect(&mut self, info: StreamInfo) {
        debug_assert_eq!(self.state, SessionState::Absent);
        self.info = Some(info);
        self.state = SessionState::Connecting;
    }

    /// The candidate could not be opened; back to `Absent`.
    pub(crate) fn abandon_connect(&mut self) {
        self.info = None;
        self.state = SessionState::Absent;
    }

    /// Takes ownership of the opened inlet, resets the buffer for its channel
    /// count, and becomes `Active`.
    ///
    /// If the buffer refuses the channel count the inlet is closed and the
    /// session returns to `Absent`.
    pub(crate) fn activate(
        &mut self,
        mut inlet: Box<dyn Inlet>,
        producer: &mut FrameProducer,
    ) -> Result<(), ConnectError> {
        if let Err(e) = producer.activate(self.channels()) {
            inlet.close();
            self.abandon_connect();
            return Err(e);
        }
        self.inlet = Some(inlet);
        self.state = SessionState::Active;
        Ok(())
    }

    /// Pulls up to `timestamps.len()` frames from the open inlet.
    ///
    /// Returns `Ok(0)` when no session is active.
    pub(crate) fn pull(
        &mut self,
        samples: &mut [f32],
        timestamps: &mut [f64],
    ) -> Result<usize, InletError> {
        match self.inlet.as_mut() {
            Some(inlet) if self.state == SessionState::Active => {
                inlet.pull_chunk(samples, timestamps)
            }
            _ => Ok(0),
        }
    }

    /// Closes and discards the inlet and becomes `Lost`.
    ///
    /// Unless `drain` is set the buffer is deactivated immediately so the
    /// render path goes silent; otherwise buffered frames keep playing until
    /// the next activation resets the buffer.
    pub(crate) fn mark_lost(&mut self, producer: &mut FrameProducer, drain: bool) {
        if let Some(mut inlet) = self.inlet.take() {
            inlet.close();
        }
        if !drain {
            producer.deactivate();
        }
        self.state = SessionState::Lost;
    }

    /// Closes any open inlet and returns to `Absent`.
    pub fn close(&mut self, producer: &mut FrameProducer) {
        if let Some(mut inlet) = self.inlet.take() {
            inlet.close();
        }
        producer.deactivate();
        self.info = None;
        self.state = SessionState::Absent;
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("info", &self.info)
            .field("inlet_open", &self.inlet.is_some())
            .finish()
    }
}
