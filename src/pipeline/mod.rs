//! Bridge pipeline components.
//!
//! The pipeline connects a network stream to the audio output via a
//! lock-free frame buffer:
//!
//! ```text
//! Transport → Discovery → Session ─pull→ Fill Task → Frame Buffer → Render Step → Output
//!                 ▲                          ▲                           │
//!                 └──────── TaskScheduler ───┴───────── schedule ────────┘
//! ```
//!
//! - **Frame Buffer**: SPSC ring of interleaved frames, the only state
//!   shared between the background and real-time contexts
//! - **Discovery**: finds and opens the first acceptable stream
//! - **Fill Task**: moves bounded batches from the inlet into the buffer
//! - **Render Step**: drains one frame per output frame and paces the
//!   background tasks
//!
//! The render step never blocks: it only pops frames and posts tasks.

mod discovery;
mod fill;
mod frame_buffer;
mod render;
mod scheduler;

pub use discovery::{AcceptPolicy, Discovery, DiscoveryOutcome};
pub use fill::{FillOutcome, FillTask};
pub use frame_buffer::{frame_buffer, FrameConsumer, FrameProducer, FrameReader};
pub use render::{AudioOutput, InterleavedOutput, PlanarOutput, RenderStep};
pub use scheduler::{
    spawn_auxiliary, AuxHandle, AuxScheduler, AuxiliaryWork, BackgroundTask, TaskScheduler,
    DEFAULT_POLL_INTERVAL,
};
