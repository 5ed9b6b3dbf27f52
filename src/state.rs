//! Flags and counters shared between the render path and background tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Statistics about a running bridge or monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Frames pulled from inlets.
    pub frames_pulled: u64,
    /// Frames rendered from the buffer.
    pub frames_rendered: u64,
    /// Frames rendered as silence because nothing was buffered.
    pub underrun_frames: u64,
    /// Successful connections.
    pub connections: u64,
    /// Sessions lost after connecting.
    pub losses: u64,
    /// Transient pull errors.
    pub pull_errors: u64,
    /// Candidates skipped during discovery.
    pub rejected_candidates: u64,
    /// Discovery passes that queried the transport.
    pub discovery_cycles: u64,
}

/// Internal state shared between the render step and background work.
///
/// The render path only reads `rediscover` and `open_inlets` and bumps its
/// own counters with relaxed ordering. Everything else is written by the
/// background context.
#[derive(Debug)]
pub(crate) struct BridgeState {
    pub rediscover: AtomicBool,
    pub open_inlets: AtomicUsize,
    pub frames_pulled: AtomicU64,
    pub frames_rendered: AtomicU64,
    pub underrun_frames: AtomicU64,
    pub connections: AtomicU64,
    pub losses: AtomicU64,
    pub pull_errors: AtomicU64,
    pub rejected_candidates: AtomicU64,
    pub discovery_cycles: AtomicU64,
}

impl BridgeState {
    pub fn new() -> Self {
        Self {
            // Nothing is connected yet
            rediscover: AtomicBool::new(true),
            open_inlets: AtomicUsize::new(0),
            frames_pulled: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            underrun_frames: AtomicU64::new(0),
            connections: AtomicU64::new(0),
            losses: AtomicU64::new(0),
            pull_errors: AtomicU64::new(0),
            rejected_candidates: AtomicU64::new(0),
            discovery_cycles: AtomicU64::new(0),
        }
    }

    pub fn request_rediscovery(&self) {
        self.rediscover.store(true, Ordering::Release);
    }

    pub fn rediscovery_requested(&self) -> bool {
        self.rediscover.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            frames_pulled: self.frames_pulled.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            underrun_frames: self.underrun_frames.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            losses: self.losses.load(Ordering::Relaxed),
            pull_errors: self.pull_errors.load(Ordering::Relaxed),
            rejected_candidates: self.rejected_candidates.load(Ordering::Relaxed),
            discovery_cycles: self.discovery_cycles.load(Ordering::Relaxed),
        }
    }
}
