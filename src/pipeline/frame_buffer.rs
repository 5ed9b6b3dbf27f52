//! Lock-free frame buffer between the fill task and the render step.
//!
//! A fixed-capacity SPSC ring of channel-interleaved `f32` frames. Capacity is
//! a power of two so indices wrap with a bitmask, and one slot is always kept
//! free so that `write_pos == read_pos` unambiguously means "empty".
//!
//! ```text
//! FrameProducer (fill task)  ──push_frame──▶  [ ring ]  ──pop_frame──▶  FrameConsumer (render)
//! ```
//!
//! Only the producer advances `write_pos`; only the consumer advances
//! `read_pos`. The producer additionally owns the buffer's `active` flag and
//! channel count, and is the only side allowed to reset the indices. A reset
//! first deactivates the buffer, then waits for a render block that is still
//! reading to finish, so the consumer never observes half-reset indices.
//!
//! Samples are stored as `AtomicU32` bit patterns. Relaxed loads and stores of
//! a 32-bit word compile to plain memory accesses; the release store of
//! `write_pos` (and acquire load on the other side) orders them.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{BridgeError, ConnectError};

struct Shared {
    samples: Box<[AtomicU32]>,
    mask: usize,
    max_channels: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
    channels: AtomicUsize,
    active: AtomicBool,
    /// Set by the consumer for the duration of a [`FrameReader`].
    reading: AtomicBool,
}

impl Shared {
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    fn occupied(&self, write: usize, read: usize) -> usize {
        write.wrapping_sub(read) & self.mask
    }

    fn available_frames(&self) -> usize {
        if !self.active.load(Ordering::Acquire) {
            return 0;
        }
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        self.occupied(write, read)
    }

    fn write_space(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        self.capacity() - 1 - self.occupied(write, read)
    }
}

/// Creates a frame buffer holding up to `capacity - 1` frames of at most
/// `max_channels` channels.
///
/// All storage is allocated here; pushing and popping never allocate.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidCapacity`] unless `capacity` is a power of
/// two of at least 2, and [`BridgeError::InvalidChannelLimit`] if
/// `max_channels` is zero.
///
/// # Example
///
/// ```
/// use inlet_bridge::pipeline::frame_buffer;
///
/// let (mut producer, mut consumer) = frame_buffer(8, 2).unwrap();
/// producer.activate(2).unwrap();
///
/// producer.push_frame(&[0.25, -0.25]);
/// assert_eq!(consumer.available_frames(), 1);
///
/// let mut frame = [0.0; 2];
/// assert_eq!(consumer.pop_frame(&mut frame), Some(2));
/// assert_eq!(frame, [0.25, -0.25]);
/// assert_eq!(consumer.pop_frame(&mut frame), None);
/// ```
pub fn frame_buffer(
    capacity: usize,
    max_channels: usize,
) -> Result<(FrameProducer, FrameConsumer), BridgeError> {
    if capacity < 2 || !capacity.is_power_of_two() {
        return Err(BridgeError::InvalidCapacity { capacity });
    }
    if max_channels == 0 {
        return Err(BridgeError::InvalidChannelLimit { max_channels });
    }

    let samples = (0..capacity * max_channels)
        .map(|_| AtomicU32::new(0))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        samples,
        mask: capacity - 1,
        max_channels,
        write_pos: AtomicUsize::new(0),
        read_pos: AtomicUsize::new(0),
        channels: AtomicUsize::new(0),
        active: AtomicBool::new(false),
        reading: AtomicBool::new(false),
    });

    Ok((
        FrameProducer {
            shared: Arc::clone(&shared),
        },
        FrameConsumer { shared },
    ))
}

/// Writing half of the frame buffer, owned by the background context.
pub struct FrameProducer {
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Capacity in frames, including the reserved slot.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Largest channel count [`activate`](Self::activate) accepts.
    pub fn max_channels(&self) -> usize {
        self.shared.max_channels
    }

    /// Channel count of the current session.
    pub fn channels(&self) -> usize {
        self.shared.channels.load(Ordering::Relaxed)
    }

    /// Whether the consumer may currently read.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Frames waiting to be read; 0 while inactive.
    pub fn available_frames(&self) -> usize {
        self.shared.available_frames()
    }

    /// Frames that may be pushed before the buffer is full.
    pub fn write_space(&self) -> usize {
        self.shared.write_space()
    }

    /// Copies one frame into the buffer and publishes it.
    ///
    /// `frame` must hold at least [`channels`](Self::channels) samples; extra
    /// samples are ignored. The caller must have checked
    /// [`write_space`](Self::write_space) first: this is the hot path and only
    /// re-checks in debug builds.
    pub fn push_frame(&mut self, frame: &[f32]) {
        debug_assert!(self.write_space() > 0, "push_frame on a full buffer");
        let channels = self.channels();
        debug_assert!(frame.len() >= channels, "short frame");

        let write = self.shared.write_pos.load(Ordering::Relaxed);
        let base = write * channels;
        for (slot, sample) in self.shared.samples[base..base + channels]
            .iter()
            .zip(frame)
        {
            slot.store(sample.to_bits(), Ordering::Relaxed);
        }

        self.shared
            .write_pos
            .store((write + 1) & self.shared.mask, Ordering::Release);
    }

    /// Stops the consumer from reading. Buffered frames are kept.
    pub fn deactivate(&mut self) {
        self.shared.active.store(false, Ordering::SeqCst);
    }

    /// Discards all buffered frames and leaves the buffer inactive.
    ///
    /// Waits for a render block that is currently reading to finish before
    /// touching the indices.
    pub fn reset(&mut self) {
        self.deactivate();
        while self.shared.reading.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        self.shared.read_pos.store(0, Ordering::Release);
        self.shared.write_pos.store(0, Ordering::Release);
    }

    /// Resets the buffer for a new session with `channels` channels, then
    /// lets the consumer read.
    ///
    /// The active flag is published only after the reset completed.
    pub fn activate(&mut self, channels: usize) -> Result<(), ConnectError> {
        if channels == 0 || channels > self.shared.max_channels {
            return Err(ConnectError::InvalidChannelCount {
                channels,
                max: self.shared.max_channels,
            });
        }

        self.reset();
        self.shared.channels.store(channels, Ordering::Relaxed);
        self.shared.active.store(true, Ordering::Release);
        Ok(())
    }
}

/// Reading half of the frame buffer, owned by the render step.
pub struct FrameConsumer {
    shared: Arc<Shared>,
}

impl FrameConsumer {
    /// Capacity in frames, including the reserved slot.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    /// Whether a session's frames may currently be read.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Frames ready to read; 0 while inactive.
    pub fn available_frames(&self) -> usize {
        self.shared.available_frames()
    }

    /// Frames that may still be pushed by the producer.
    pub fn write_space(&self) -> usize {
        self.shared.write_space()
    }

    /// Starts reading a block.
    ///
    /// While the returned reader lives, the producer cannot reset the buffer.
    /// Hold it for one render block at most.
    pub fn reader(&mut self) -> FrameReader<'_> {
        let shared = &*self.shared;
        shared.reading.store(true, Ordering::SeqCst);
        let active = shared.active.load(Ordering::SeqCst);
        let channels = if active {
            shared.channels.load(Ordering::Relaxed)
        } else {
            0
        };
        FrameReader {
            shared,
            active,
            channels,
        }
    }

    /// Pops one frame into `frame`. See [`FrameReader::pop_frame`].
    pub fn pop_frame(&mut self, frame: &mut [f32]) -> Option<usize> {
        self.reader().pop_frame(frame)
    }
}

/// Read access to the frame buffer for the duration of one render block.
pub struct FrameReader<'a> {
    shared: &'a Shared,
    active: bool,
    channels: usize,
}

impl FrameReader<'_> {
    /// Whether the buffer was active when the block started.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Channel count of the frames being read.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames ready to read; 0 if the block started inactive.
    pub fn available_frames(&self) -> usize {
        if !self.active {
            return 0;
        }
        let write = self.shared.write_pos.load(Ordering::Acquire);
        let read = self.shared.read_pos.load(Ordering::Relaxed);
        self.shared.occupied(write, read)
    }

    /// Copies the oldest frame into `frame` and advances the read index.
    ///
    /// Returns the number of samples copied, `min(channels, frame.len())`, or
    /// `None` if nothing is buffered; the caller renders silence then.
    pub fn pop_frame(&mut self, frame: &mut [f32]) -> Option<usize> {
        if !self.active {
            return None;
        }
        let read = self.shared.read_pos.load(Ordering::Relaxed);
        let write = self.shared.write_pos.load(Ordering::Acquire);
        if read == write {
            return None;
        }

        let base = read * self.channels;
        let copied = self.channels.min(frame.len());
        for (out, slot) in frame[..copied]
            .iter_mut()
            .zip(&self.shared.samples[base..base + copied])
        {
            *out = f32::from_bits(slot.load(Ordering::Relaxed));
        }

        self.shared
            .read_pos
            .store((read + 1) & self.shared.mask, Ordering::Release);
        Some(copied)
    }
}

impl Drop for FrameReader<'_> {
    fn drop(&mut self) {
        self.shared.reading.store(false, Ordering::SeqCst);
    }
}
