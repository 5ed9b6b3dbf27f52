//! Render step - the real-time consumer and the bridge's only clock.
//!
//! Called once per audio block by the audio framework. Everything here is
//! allocation-free and lock-free: frames come out of the [`FrameConsumer`],
//! missing frames become silence, and background work is posted through a
//! [`TaskScheduler`] without waiting for it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::pipeline::{BackgroundTask, FrameConsumer, TaskScheduler};
use crate::state::BridgeState;

/// Destination of one rendered block, addressed per frame and channel.
pub trait AudioOutput {
    /// Frames in this block.
    fn frames(&self) -> usize;

    /// Output channel count.
    fn channels(&self) -> usize;

    /// Writes one sample.
    fn write(&mut self, frame: usize, channel: usize, value: f32);
}

/// An interleaved output buffer, as handed out by most audio callbacks.
#[derive(Debug)]
pub struct InterleavedOutput<'a> {
    buffer: &'a mut [f32],
    channels: usize,
}

impl<'a> InterleavedOutput<'a> {
    /// Wraps `buffer`, which holds whole frames of `channels` samples.
    pub fn new(buffer: &'a mut [f32], channels: usize) -> Self {
        Self { buffer, channels }
    }
}

impl AudioOutput for InterleavedOutput<'_> {
    fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.buffer.len() / self.channels
        }
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn write(&mut self, frame: usize, channel: usize, value: f32) {
        if let Some(slot) = self.buffer.get_mut(frame * self.channels + channel) {
            *slot = value;
        }
    }
}

/// One buffer per output channel.
#[derive(Debug)]
pub struct PlanarOutput<'a, 'b> {
    channels: &'a mut [&'b mut [f32]],
}

impl<'a, 'b> PlanarOutput<'a, 'b> {
    /// Wraps per-channel buffers of equal length.
    pub fn new(channels: &'a mut [&'b mut [f32]]) -> Self {
        Self { channels }
    }
}

impl AudioOutput for PlanarOutput<'_, '_> {
    fn frames(&self) -> usize {
        self.channels.iter().map(|c| c.len()).min().unwrap_or(0)
    }

    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn write(&mut self, frame: usize, channel: usize, value: f32) {
        if let Some(slot) = self
            .channels
            .get_mut(channel)
            .and_then(|buffer| buffer.get_mut(frame))
        {
            *slot = value;
        }
    }
}

/// Drains the frame buffer into the audio output, one block at a time.
pub struct RenderStep {
    consumer: FrameConsumer,
    state: Arc<BridgeState>,
    /// Scratch frame at the buffer's maximum channel count.
    frame: Box<[f32]>,
    blocks: u64,
    active_blocks: u64,
    discovery_period_blocks: u64,
    fill_period_blocks: u64,
}

impl RenderStep {
    pub(crate) fn new(
        consumer: FrameConsumer,
        max_channels: usize,
        state: Arc<BridgeState>,
        discovery_period_blocks: u64,
        fill_period_blocks: u64,
    ) -> Self {
        Self {
            consumer,
            state,
            frame: vec![0.0; max_channels].into_boxed_slice(),
            blocks: 0,
            active_blocks: 0,
            discovery_period_blocks: discovery_period_blocks.max(1),
            fill_period_blocks: fill_period_blocks.max(1),
        }
    }

    /// Blocks rendered so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Render blocks between discovery requests.
    pub fn discovery_period_blocks(&self) -> u64 {
        self.discovery_period_blocks
    }

    /// Active render blocks between fill requests.
    pub fn fill_period_blocks(&self) -> u64 {
        self.fill_period_blocks
    }

    /// Whether a session is currently feeding the buffer.
    pub fn is_active(&self) -> bool {
        self.consumer.is_active()
    }

    /// Frames buffered and ready to render.
    pub fn available_frames(&self) -> usize {
        self.consumer.available_frames()
    }

    /// Renders one block and posts whatever background work is due.
    ///
    /// Output channels beyond the stream's channel count, and frames for
    /// which nothing is buffered, are written as silence.
    pub fn render<O, S>(&mut self, output: &mut O, scheduler: &S)
    where
        O: AudioOutput + ?Sized,
        S: TaskScheduler + ?Sized,
    {
        self.schedule(scheduler);

        let frames = output.frames();
        let out_channels = output.channels();
        let mut rendered = 0u64;
        let mut underruns = 0u64;

        let mut reader = self.consumer.reader();
        let active = reader.is_active();
        for i in 0..frames {
            let copied = reader.pop_frame(&mut self.frame).unwrap_or(0);
            if copied > 0 {
                rendered += 1;
            } else if active {
                underruns += 1;
            }
            for channel in 0..out_channels {
                let value = if channel < copied {
                    self.frame[channel]
                } else {
                    0.0
                };
                output.write(i, channel, value);
            }
        }
        drop(reader);

        if rendered > 0 {
            self.state
                .frames_rendered
                .fetch_add(rendered, Ordering::Relaxed);
        }
        if underruns > 0 {
            self.state
                .underrun_frames
                .fetch_add(underruns, Ordering::Relaxed);
        }
    }

    fn schedule<S: TaskScheduler + ?Sized>(&mut self, scheduler: &S) {
        let active = self.consumer.is_active();

        if self.blocks % self.discovery_period_blocks == 0
            && (!active || self.state.rediscovery_requested())
        {
            scheduler.schedule(BackgroundTask::ResolveStreams);
        }

        if active {
            if self.active_blocks % self.fill_period_blocks == 0 {
                scheduler.schedule(BackgroundTask::FillBuffer);
            }
            self.active_blocks = self.active_blocks.wrapping_add(1);
        }

        self.blocks = self.blocks.wrapping_add(1);
    }
}

impl std::fmt::Debug for RenderStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderStep")
            .field("blocks", &self.blocks)
            .field("active", &self.is_active())
            .field("discovery_period_blocks", &self.discovery_period_blocks)
            .field("fill_period_blocks", &self.fill_period_blocks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{frame_buffer, FrameProducer};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        tasks: Mutex<Vec<BackgroundTask>>,
    }

    impl TaskScheduler for Recorder {
        fn schedule(&self, task: BackgroundTask) {
            self.tasks.lock().push(task);
        }
    }

    impl Recorder {
        fn count(&self, task: BackgroundTask) -> usize {
            self.tasks.lock().iter().filter(|t| **t == task).count()
        }
    }

    fn render_step(discovery: u64, fill: u64) -> (FrameProducer, RenderStep, Arc<BridgeState>) {
        let (producer, consumer) = frame_buffer(16, 4).unwrap();
        let state = Arc::new(BridgeState::new());
        let step = RenderStep::new(consumer, 4, Arc::clone(&state), discovery, fill);
        (producer, step, state)
    }

    #[test]
    fn test_inactive_renders_silence() {
        let (_producer, mut step, state) = render_step(4, 1);
        let mut buffer = [1.0f32; 8];
        step.render(&mut InterleavedOutput::new(&mut buffer, 2), &Recorder::default());

        assert_eq!(buffer, [0.0; 8]);
        let stats = state.snapshot();
        assert_eq!(stats.frames_rendered, 0);
        assert_eq!(stats.underrun_frames, 0);
    }

    #[test]
    fn test_renders_frames_then_silence() {
        let (mut producer, mut step, state) = render_step(4, 1);
        producer.activate(2).unwrap();
        producer.push_frame(&[0.1, 0.2]);
        producer.push_frame(&[0.3, 0.4]);

        let mut buffer = [9.0f32; 6];
        step.render(&mut InterleavedOutput::new(&mut buffer, 2), &Recorder::default());

        assert_eq!(buffer, [0.1, 0.2, 0.3, 0.4, 0.0, 0.0]);
        let stats = state.snapshot();
        assert_eq!(stats.frames_rendered, 2);
        assert_eq!(stats.underrun_frames, 1);
    }

    #[test]
    fn test_extra_output_channels_are_silent() {
        let (mut producer, mut step, _state) = render_step(4, 1);
        producer.activate(1).unwrap();
        producer.push_frame(&[0.5]);

        let mut buffer = [9.0f32; 3];
        step.render(&mut InterleavedOutput::new(&mut buffer, 3), &Recorder::default());
        assert_eq!(buffer, [0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_extra_stream_channels_are_dropped() {
        let (mut producer, mut step, _state) = render_step(4, 1);
        producer.activate(4).unwrap();
        producer.push_frame(&[0.1, 0.2, 0.3, 0.4]);

        let mut buffer = [9.0f32; 2];
        step.render(&mut InterleavedOutput::new(&mut buffer, 2), &Recorder::default());
        assert_eq!(buffer, [0.1, 0.2]);
    }

    #[test]
    fn test_planar_output() {
        let (mut producer, mut step, _state) = render_step(4, 1);
        producer.activate(2).unwrap();
        producer.push_frame(&[0.1, 0.2]);

        let mut left = [9.0f32; 2];
        let mut right = [9.0f32; 2];
        let mut channels: [&mut [f32]; 2] = [&mut left, &mut right];
        step.render(&mut PlanarOutput::new(&mut channels), &Recorder::default());

        assert_eq!(left, [0.1, 0.0]);
        assert_eq!(right, [0.2, 0.0]);
    }

    #[test]
    fn test_discovery_scheduled_every_period_while_inactive() {
        let (_producer, mut step, _state) = render_step(4, 1);
        let scheduler = Recorder::default();
        let mut buffer = [0.0f32; 4];
        for _ in 0..8 {
            step.render(&mut InterleavedOutput::new(&mut buffer, 2), &scheduler);
        }

        assert_eq!(scheduler.count(BackgroundTask::ResolveStreams), 2);
        assert_eq!(scheduler.count(BackgroundTask::FillBuffer), 0);
    }

    #[test]
    fn test_fill_scheduled_while_active() {
        let (mut producer, mut step, state) = render_step(4, 2);
        producer.activate(2).unwrap();
        state.rediscover.store(false, Ordering::Release);

        let scheduler = Recorder::default();
        let mut buffer = [0.0f32; 4];
        for _ in 0..8 {
            step.render(&mut InterleavedOutput::new(&mut buffer, 2), &scheduler);
        }

        assert_eq!(scheduler.count(BackgroundTask::FillBuffer), 4);
        assert_eq!(scheduler.count(BackgroundTask::ResolveStreams), 0);
    }

    #[test]
    fn test_rediscovery_flag_schedules_discovery_while_active() {
        let (mut producer, mut step, state) = render_step(2, 1);
        producer.activate(2).unwrap();
        state.request_rediscovery();

        let scheduler = Recorder::default();
        let mut buffer = [0.0f32; 4];
        for _ in 0..4 {
            step.render(&mut InterleavedOutput::new(&mut buffer, 2), &scheduler);
        }
        assert_eq!(scheduler.count(BackgroundTask::ResolveStreams), 2);
    }
}
