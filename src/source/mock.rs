//! In-process mock transport for testing without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{Inlet, StreamInfo, StreamTransport};
use crate::{InletError, InletOptions};

/// Connection state shared by one outlet and the inlet opened on it.
#[derive(Default)]
struct Link {
    lost: AtomicBool,
    pull_errors: Mutex<VecDeque<String>>,
}

struct Advertised {
    info: StreamInfo,
    link: Arc<Link>,
    /// Taken by the first successful `open`.
    consumer: Option<HeapCons<f32>>,
}

/// A scripted failure for the next `open` call.
enum OpenFailure {
    Refused(String),
    Unresponsive,
}

#[derive(Default)]
struct MockState {
    streams: Vec<Advertised>,
    open_failures: VecDeque<OpenFailure>,
    opens: usize,
    resolves: usize,
}

/// A mock stream transport that connects in-process outlets to inlets.
///
/// Each advertised stream is backed by a lock-free SPSC ring buffer: the
/// [`MockOutlet`] pushes interleaved frames, the [`MockInlet`] returned by
/// [`open`](StreamTransport::open) pulls them. Loss, withdrawal, open failures
/// and transient pull errors can be scripted, which makes the whole bridge
/// testable in CI.
///
/// # Example
///
/// ```
/// use inlet_bridge::{InletOptions, MockTransport, StreamInfo, StreamTransport};
///
/// let mut transport = MockTransport::new();
/// let mut outlet = transport.advertise(StreamInfo::new("audio", 2, 44100.0), 1024);
/// outlet.push_sine(440.0, 256);
///
/// let advertised = transport.resolve();
/// assert_eq!(advertised.len(), 1);
///
/// let mut inlet = transport.open(&advertised[0], &InletOptions::default()).unwrap();
/// let mut samples = [0.0f32; 2 * 64];
/// let mut timestamps = [0.0f64; 64];
/// assert_eq!(inlet.pull_chunk(&mut samples, &mut timestamps).unwrap(), 64);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a transport with nothing advertised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertises a stream and returns the outlet feeding it.
    ///
    /// `capacity_frames` bounds how many frames may be in flight between the
    /// outlet and the inlet. Dropping the outlet loses the stream.
    pub fn advertise(&self, info: StreamInfo, capacity_frames: usize) -> MockOutlet {
        let capacity = capacity_frames.max(1) * info.channel_count.max(1);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let link = Arc::new(Link::default());

        self.state.lock().streams.push(Advertised {
            info: info.clone(),
            link: Arc::clone(&link),
            consumer: Some(consumer),
        });

        MockOutlet {
            info,
            producer,
            link,
            frames_sent: 0,
        }
    }

    /// Stops advertising every stream with the given name.
    ///
    /// Inlets already open on those streams report a loss on their next pull.
    pub fn withdraw(&self, name: &str) {
        self.state.lock().streams.retain(|stream| {
            if stream.info.name == name {
                stream.link.lost.store(true, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
    }

    /// Makes the next `open` call fail with the given reason.
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state
            .lock()
            .open_failures
            .push_back(OpenFailure::Refused(reason.into()));
    }

    /// Makes the next `open` call behave like a peer that never answers.
    ///
    /// The call reports [`InletError::Timeout`] with the caller's
    /// [`InletOptions::open_timeout`] instead of actually waiting.
    pub fn time_out_next_open(&self) {
        self.state
            .lock()
            .open_failures
            .push_back(OpenFailure::Unresponsive);
    }

    /// Number of `open` calls made so far, failed ones included.
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Number of `resolve` calls made so far.
    pub fn resolve_count(&self) -> usize {
        self.state.lock().resolves
    }
}

impl StreamTransport for MockTransport {
    fn resolve(&mut self) -> Vec<StreamInfo> {
        let mut state = self.state.lock();
        state.resolves += 1;
        state
            .streams
            .iter()
            .filter(|stream| !stream.link.lost.load(Ordering::SeqCst))
            .map(|stream| stream.info.clone())
            .collect()
    }

    fn open(
        &mut self,
        info: &StreamInfo,
        options: &InletOptions,
    ) -> Result<Box<dyn Inlet>, InletError> {
        let mut state = self.state.lock();
        state.opens += 1;

        match state.open_failures.pop_front() {
            Some(OpenFailure::Refused(reason)) => return Err(InletError::open_failed(reason)),
            Some(OpenFailure::Unresponsive) => {
                return Err(InletError::Timeout(options.open_timeout));
            }
            None => {}
        }

        let stream = state
            .streams
            .iter_mut()
            .find(|stream| stream.info == *info && !stream.link.lost.load(Ordering::SeqCst))
            .ok_or_else(|| InletError::open_failed(format!("'{}' is not advertised", info.name)))?;

        let consumer = stream
            .consumer
            .take()
            .ok_or_else(|| InletError::open_failed(format!("'{}' already has an inlet", info.name)))?;

        Ok(Box::new(MockInlet {
            info: stream.info.clone(),
            consumer,
            link: Arc::clone(&stream.link),
            frames_pulled: 0,
            closed: false,
        }))
    }
}

/// Sending side of a mock stream.
pub struct MockOutlet {
    info: StreamInfo,
    producer: HeapProd<f32>,
    link: Arc<Link>,
    frames_sent: u64,
}

impl MockOutlet {
    /// Metadata this outlet advertises.
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Total frames accepted so far.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Pushes one frame. Returns `false` if it didn't fit or has the wrong
    /// channel count.
    pub fn push_frame(&mut self, frame: &[f32]) -> bool {
        frame.len() == self.info.channel_count && self.push_frames(frame) == 1
    }

    /// Pushes as many whole interleaved frames as fit. Returns the frame count.
    pub fn push_frames(&mut self, interleaved: &[f32]) -> usize {
        let channels = self.info.channel_count;
        if channels == 0 {
            return 0;
        }
        let frames = (interleaved.len() / channels).min(self.producer.vacant_len() / channels);
        let pushed = self.producer.push_slice(&interleaved[..frames * channels]);
        debug_assert_eq!(pushed, frames * channels);
        self.frames_sent += frames as u64;
        frames
    }

    /// Pushes `frames` frames of silence.
    pub fn push_silence(&mut self, frames: usize) -> usize {
        let samples = vec![0.0f32; frames * self.info.channel_count];
        self.push_frames(&samples)
    }

    /// Pushes `frames` frames of a half-scale sine wave, identical on every
    /// channel, continuing the phase from previously sent frames.
    pub fn push_sine(&mut self, frequency: f64, frames: usize) -> usize {
        let channels = self.info.channel_count;
        let rate = if self.info.is_irregular() {
            1.0
        } else {
            self.info.nominal_srate
        };
        let start = self.frames_sent;

        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames as u64 {
            let t = (start + i) as f64 / rate;
            let value = (0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32;
            samples.extend(std::iter::repeat(value).take(channels));
        }
        self.push_frames(&samples)
    }

    /// Simulates the sender going away. The stream stops being advertised and
    /// any open inlet reports a loss.
    pub fn disconnect(&self) {
        self.link.lost.store(true, Ordering::SeqCst);
    }

    /// Makes the inlet's next pull fail with a transient error.
    pub fn fail_next_pull(&self, reason: impl Into<String>) {
        self.link.pull_errors.lock().push_back(reason.into());
    }
}

impl Drop for MockOutlet {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Receiving side of a mock stream, created by [`MockTransport`].
pub struct MockInlet {
    info: StreamInfo,
    consumer: HeapCons<f32>,
    link: Arc<Link>,
    frames_pulled: u64,
    closed: bool,
}

impl Inlet for MockInlet {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn pull_chunk(
        &mut self,
        samples: &mut [f32],
        timestamps: &mut [f64],
    ) -> Result<usize, InletError> {
        if self.closed {
            return Err(InletError::lost("inlet closed"));
        }
        if self.link.lost.load(Ordering::SeqCst) {
            return Err(InletError::lost(format!(
                "'{}' is no longer available",
                self.info.name
            )));
        }
        if let Some(reason) = self.link.pull_errors.lock().pop_front() {
            return Err(InletError::pull(reason));
        }

        let channels = self.info.channel_count;
        if channels == 0 {
            return Ok(0);
        }

        let frames = (self.consumer.occupied_len() / channels)
            .min(timestamps.len())
            .min(samples.len() / channels);
        self.consumer.pop_slice(&mut samples[..frames * channels]);

        for (i, timestamp) in timestamps[..frames].iter_mut().enumerate() {
            *timestamp = if self.info.is_irregular() {
                0.0
            } else {
                (self.frames_pulled + i as u64) as f64 / self.info.nominal_srate
            };
        }
        self.frames_pulled += frames as u64;

        Ok(frames)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn open_first(transport: &mut MockTransport) -> Box<dyn Inlet> {
        let advertised = transport.resolve();
        transport
            .open(&advertised[0], &InletOptions::default())
            .unwrap()
    }

    #[test]
    fn test_resolve_lists_advertised_streams() {
        let mut transport = MockTransport::new();
        let _a = transport.advertise(StreamInfo::new("audio", 2, 44100.0), 64);
        let _b = transport.advertise(StreamInfo::new("eeg", 8, 250.0).with_type("EEG"), 64);

        let names: Vec<_> = transport.resolve().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["audio", "eeg"]);
        assert_eq!(transport.resolve_count(), 1);
    }

    #[test]
    fn test_pull_returns_pushed_frames_in_order() {
        let mut transport = MockTransport::new();
        let mut outlet = transport.advertise(StreamInfo::new("audio", 2, 100.0), 64);
        assert_eq!(outlet.push_frames(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0]), 3);

        let mut inlet = open_first(&mut transport);
        let mut samples = [0.0f32; 8];
        let mut timestamps = [0.0f64; 4];

        let frames = inlet.pull_chunk(&mut samples, &mut timestamps).unwrap();
        assert_eq!(frames, 3);
        assert_eq!(&samples[..6], &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        assert_eq!(&timestamps[..3], &[0.0, 0.01, 0.02]);

        // Nothing left
        assert_eq!(inlet.pull_chunk(&mut samples, &mut timestamps).unwrap(), 0);
    }

    #[test]
    fn test_pull_respects_requested_frames() {
        let mut transport = MockTransport::new();
        let mut outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 64);
        outlet.push_silence(10);

        let mut inlet = open_first(&mut transport);
        let mut samples = [1.0f32; 16];
        let mut timestamps = [0.0f64; 4];
        assert_eq!(inlet.pull_chunk(&mut samples, &mut timestamps).unwrap(), 4);
        assert_eq!(inlet.pull_chunk(&mut samples, &mut timestamps).unwrap(), 4);
        assert_eq!(inlet.pull_chunk(&mut samples, &mut timestamps).unwrap(), 2);
    }

    #[test]
    fn test_outlet_capacity_limits_push() {
        let transport = MockTransport::new();
        let mut outlet = transport.advertise(StreamInfo::new("audio", 2, 100.0), 4);
        assert_eq!(outlet.push_silence(10), 4);
        assert!(!outlet.push_frame(&[0.0, 0.0]));
        assert!(!outlet.push_frame(&[0.0]));
        assert_eq!(outlet.frames_sent(), 4);
    }

    #[test]
    fn test_disconnect_reports_loss_and_stops_advertising() {
        let mut transport = MockTransport::new();
        let outlet = transport.advertise(StreamInfo::new("audio", 2, 100.0), 16);
        let mut inlet = open_first(&mut transport);

        outlet.disconnect();

        let mut samples = [0.0f32; 4];
        let mut timestamps = [0.0f64; 2];
        let err = inlet.pull_chunk(&mut samples, &mut timestamps).unwrap_err();
        assert!(err.is_lost());
        assert!(transport.resolve().is_empty());
    }

    #[test]
    fn test_dropping_outlet_loses_stream() {
        let mut transport = MockTransport::new();
        let outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 16);
        drop(outlet);
        assert!(transport.resolve().is_empty());
    }

    #[test]
    fn test_withdraw_loses_open_inlet() {
        let mut transport = MockTransport::new();
        let _outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 16);
        let mut inlet = open_first(&mut transport);

        transport.withdraw("audio");

        let mut samples = [0.0f32; 1];
        let mut timestamps = [0.0f64; 1];
        assert!(inlet
            .pull_chunk(&mut samples, &mut timestamps)
            .unwrap_err()
            .is_lost());
    }

    #[test]
    fn test_transient_pull_error_then_recovers() {
        let mut transport = MockTransport::new();
        let mut outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 16);
        outlet.push_silence(2);
        outlet.fail_next_pull("hiccup");
        let mut inlet = open_first(&mut transport);

        let mut samples = [0.0f32; 4];
        let mut timestamps = [0.0f64; 4];
        let err = inlet.pull_chunk(&mut samples, &mut timestamps).unwrap_err();
        assert_eq!(err, InletError::pull("hiccup"));
        assert_eq!(inlet.pull_chunk(&mut samples, &mut timestamps).unwrap(), 2);
    }

    #[test]
    fn test_scripted_open_failure() {
        let mut transport = MockTransport::new();
        let _outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 16);
        transport.fail_next_open("refused");

        let info = transport.resolve().remove(0);
        let err = transport
            .open(&info, &InletOptions::default())
            .err()
            .unwrap();
        assert_eq!(err, InletError::open_failed("refused"));

        // The stream itself is still openable afterwards
        assert!(transport.open(&info, &InletOptions::default()).is_ok());
        assert_eq!(transport.open_count(), 2);
    }

    #[test]
    fn test_scripted_open_timeout_uses_options() {
        let mut transport = MockTransport::new();
        let _outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 16);
        transport.time_out_next_open();

        let info = transport.resolve().remove(0);
        let options = InletOptions {
            open_timeout: Duration::from_millis(250),
            ..Default::default()
        };
        let err = transport.open(&info, &options).err().unwrap();
        assert_eq!(err, InletError::Timeout(Duration::from_millis(250)));
        assert!(!err.is_lost());
        assert!(transport.open(&info, &options).is_ok());
    }

    #[test]
    fn test_second_open_of_same_stream_fails() {
        let mut transport = MockTransport::new();
        let _outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 16);
        let info = transport.resolve().remove(0);

        assert!(transport.open(&info, &InletOptions::default()).is_ok());
        assert!(transport.open(&info, &InletOptions::default()).is_err());
    }

    #[test]
    fn test_closed_inlet_reports_loss() {
        let mut transport = MockTransport::new();
        let _outlet = transport.advertise(StreamInfo::new("audio", 1, 100.0), 16);
        let mut inlet = open_first(&mut transport);
        inlet.close();

        let mut samples = [0.0f32; 1];
        let mut timestamps = [0.0f64; 1];
        assert!(inlet
            .pull_chunk(&mut samples, &mut timestamps)
            .unwrap_err()
            .is_lost());
    }

    #[test]
    fn test_sine_is_continuous_and_identical_across_channels() {
        let mut transport = MockTransport::new();
        let mut outlet = transport.advertise(StreamInfo::new("audio", 2, 8000.0), 64);
        assert_eq!(outlet.push_sine(1000.0, 8), 8);
        assert_eq!(outlet.push_sine(1000.0, 8), 8);

        let mut inlet = open_first(&mut transport);
        let mut samples = [0.0f32; 32];
        let mut timestamps = [0.0f64; 16];
        assert_eq!(inlet.pull_chunk(&mut samples, &mut timestamps).unwrap(), 16);

        for frame in samples.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        // Quarter period of 1kHz at 8kHz is frame 2; phase continues into frame 10
        assert!((samples[2 * 2] - 0.5).abs() < 1e-6);
        assert!((samples[10 * 2] - 0.5).abs() < 1e-6);
    }
}
