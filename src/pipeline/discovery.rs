//! Discovery loop - finds a matching stream and opens a session on it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::event::emit;
use crate::pipeline::FrameProducer;
use crate::session::{SessionState, StreamSession};
use crate::source::{StreamInfo, StreamTransport};
use crate::state::BridgeState;
use crate::{BridgeEvent, ConnectError, EventCallback, InletOptions};

/// Which advertised streams are accepted.
///
/// The single-stream bridge and the multi-inlet monitor deliberately use
/// different policies and never share a discovery pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AcceptPolicy {
    /// Accept the first stream with the configured name whose nominal rate is
    /// within `tolerance` of `local_rate` and whose channels fit the buffer.
    FirstMatching {
        /// Name a stream must be advertised under.
        stream_name: String,
        /// Local audio clock rate in Hz.
        local_rate: f64,
        /// Maximum relative rate difference.
        tolerance: f64,
        /// Largest acceptable channel count.
        max_channels: usize,
    },
    /// Accept every stream with a usable channel count.
    All {
        /// Largest acceptable channel count.
        max_channels: usize,
    },
}

impl AcceptPolicy {
    /// Checks one candidate against the policy.
    ///
    /// # Example
    ///
    /// ```
    /// use inlet_bridge::{AcceptPolicy, ConnectError, StreamInfo};
    ///
    /// let policy = AcceptPolicy::FirstMatching {
    ///     stream_name: "audio".into(),
    ///     local_rate: 44100.0,
    ///     tolerance: 0.001,
    ///     max_channels: 8,
    /// };
    /// assert!(policy.check(&StreamInfo::new("audio", 2, 44100.0)).is_ok());
    /// assert!(matches!(
    ///     policy.check(&StreamInfo::new("audio", 2, 48000.0)),
    ///     Err(ConnectError::RateMismatch { .. })
    /// ));
    /// ```
    pub fn check(&self, info: &StreamInfo) -> Result<(), ConnectError> {
        let max_channels = match self {
            Self::FirstMatching {
                stream_name,
                local_rate,
                tolerance,
                max_channels,
            } => {
                if info.name != *stream_name {
                    return Err(ConnectError::NameMismatch {
                        expected: stream_name.clone(),
                        found: info.name.clone(),
                    });
                }
                if !info.rate_matches(*local_rate, *tolerance) {
                    return Err(ConnectError::RateMismatch {
                        nominal: info.nominal_srate,
                        local: *local_rate,
                    });
                }
                *max_channels
            }
            Self::All { max_channels } => *max_channels,
        };

        if info.channel_count == 0 || info.channel_count > max_channels {
            return Err(ConnectError::InvalidChannelCount {
                channels: info.channel_count,
                max: max_channels,
            });
        }
        Ok(())
    }
}

/// Result of one discovery pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryOutcome {
    /// A session is already active or connecting; nothing was queried.
    AlreadyActive,
    /// The resolver returned no streams.
    NoStreams,
    /// Streams were advertised but none could be connected.
    NoMatch,
    /// A session was opened on this stream.
    Connected(StreamInfo),
}

/// Periodic discovery for the single-stream bridge.
///
/// Each pass settles a lost session, queries the transport and opens the
/// first acceptable candidate. Every failure is handled here: rejected
/// candidates are logged and skipped, and the pass simply reports what
/// happened.
pub struct Discovery {
    policy: AcceptPolicy,
    inlet_options: InletOptions,
    state: Arc<BridgeState>,
    event_callback: Option<EventCallback>,
}

impl Discovery {
    /// Creates a discovery loop with the given acceptance policy.
    pub(crate) fn new(
        policy: AcceptPolicy,
        inlet_options: InletOptions,
        state: Arc<BridgeState>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        Self {
            policy,
            inlet_options,
            state,
            event_callback,
        }
    }

    /// The acceptance policy in use.
    pub fn policy(&self) -> &AcceptPolicy {
        &self.policy
    }

    /// Runs one discovery pass.
    pub fn run(
        &mut self,
        transport: &mut dyn StreamTransport,
        session: &mut StreamSession,
        producer: &mut FrameProducer,
    ) -> DiscoveryOutcome {
        session.settle();
        if session.state() != SessionState::Absent {
            return DiscoveryOutcome::AlreadyActive;
        }

        self.state.discovery_cycles.fetch_add(1, Ordering::Relaxed);
        let streams = transport.resolve();
        if streams.is_empty() {
            tracing::info!("No streams found");
            emit(self.event_callback.as_ref(), BridgeEvent::NoStreamsFound);
            return DiscoveryOutcome::NoStreams;
        }

        let advertised = streams.len();
        for info in streams {
            match self.policy.check(&info) {
                Ok(()) => {}
                Err(ConnectError::NameMismatch { .. }) => continue,
                Err(reason) => {
                    self.reject(&info, reason);
                    continue;
                }
            }

            session.begin_connect(info.clone());
            let result = transport
                .open(&info, &self.inlet_options)
                .map_err(ConnectError::Open)
                .and_then(|inlet| session.activate(inlet, producer));

            match result {
                Ok(()) => {
                    self.connected(&info);
                    return DiscoveryOutcome::Connected(info);
                }
                Err(reason) => {
                    if session.state() == SessionState::Connecting {
                        session.abandon_connect();
                    }
                    self.reject(&info, reason);
                }
            }
        }

        tracing::debug!(advertised, "No acceptable stream this pass");
        emit(
            self.event_callback.as_ref(),
            BridgeEvent::NoMatchingStream { advertised },
        );
        DiscoveryOutcome::NoMatch
    }

    fn connected(&self, info: &StreamInfo) {
        self.state.connections.fetch_add(1, Ordering::Relaxed);
        self.state.rediscover.store(false, Ordering::Release);

        tracing::info!(
            stream = %info.name,
            channels = info.channel_count,
            sample_rate = info.nominal_srate,
            "Connected to stream"
        );
        emit(
            self.event_callback.as_ref(),
            BridgeEvent::SourceConnected {
                name: info.name.clone(),
                channels: info.channel_count,
                sample_rate: info.nominal_srate,
            },
        );
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
}
