//! # inlet-bridge
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Bridge a network sample stream into a hard real-time audio callback.
//!
//! `inlet-bridge` discovers a stream advertised on the network under a given
//! name, checks that its nominal rate matches the local audio clock, and plays
//! its frames through your audio callback. The stream may appear, disappear
//! and reappear at any time; the callback never blocks and simply renders
//! silence while nothing is connected.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use inlet_bridge::{AudioBridge, InterleavedOutput};
//!
//! let (mut render, bridge) = AudioBridge::builder()
//!     .stream_name("audio")
//!     .transport(my_transport)
//!     .audio_format(48000.0, 256)
//!     .on_event(|e| tracing::warn!(?e, "bridge event"))
//!     .start()?;
//!
//! let scheduler = bridge.scheduler();
//! // In the audio callback:
//! render.render(&mut InterleavedOutput::new(data, channels), &scheduler);
//!
//! // On shutdown:
//! let stats = bridge.stop().await?;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict boundary between two contexts:
//!
//! - **Render Step**: real-time audio callback that pops frames and posts
//!   background tasks; never blocks, allocates or locks
//! - **Frame Buffer**: lock-free SPSC ring of interleaved frames, the only
//!   data shared between the two contexts
//! - **Background Worker**: tokio task running discovery and the fill task
//!   whenever the render step asks for them
//!
//! Connection failures, stream loss and pull errors are all handled on the
//! background side and surfaced via [`BridgeEvent`]s. The render path only
//! ever sees "frames available or not".
//!
//! An [`InletMonitor`] is also provided for the simpler case of opening every
//! advertised stream and forwarding samples to [`SampleSink`]s.

#![warn(missing_docs)]
// Sample and frame counts are converted between integer and float freely
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod bridge;
mod config;
mod error;
mod event;
mod monitor;
#[cfg(feature = "cpal-output")]
mod output;
pub mod pipeline;
mod session;
mod sink;
pub mod source;
mod state;

pub use bridge::{AudioBridge, AudioBridgeBuilder, BridgeHandle, BridgeWorker};
pub use config::{BridgeConfig, InletOptions, MonitorConfig, DEFAULT_STREAM_NAME};
pub use error::{BridgeError, ConnectError, InletError, SinkError};
pub use event::{event_callback, BridgeEvent, EventCallback};
pub use monitor::{InletMonitor, MonitorClock};
#[cfg(feature = "cpal-output")]
pub use output::{CpalOutput, OutputStream};
pub use pipeline::{
    AcceptPolicy, AudioOutput, AuxScheduler, BackgroundTask, InterleavedOutput, RenderStep,
    TaskScheduler,
};
pub use session::{SessionState, StreamSession};
pub use sink::{ChannelSink, InletSample, LogSink, SampleSink};
pub use source::{Inlet, MockInlet, MockOutlet, MockTransport, StreamInfo, StreamTransport};
pub use state::BridgeStats;
