//! Integration tests for inlet-bridge.
//!
//! Everything runs against the in-process mock transport, so no network or
//! audio hardware is needed.

use std::sync::Arc;
use std::time::Duration;

use inlet_bridge::pipeline::{frame_buffer, spawn_auxiliary, DiscoveryOutcome, FillOutcome};
use inlet_bridge::{
    AudioBridge, AuxScheduler, BackgroundTask, BridgeConfig, BridgeEvent, BridgeWorker,
    ChannelSink, ConnectError, InletMonitor, InterleavedOutput, MockTransport, MonitorConfig,
    RenderStep, SessionState, StreamInfo, TaskScheduler,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

const RATE: f64 = 44100.0;
const BLOCK: usize = 64;

/// Scheduler that records posted tasks so a test can run them in order.
#[derive(Default)]
struct Queue {
    tasks: Mutex<Vec<BackgroundTask>>,
}

impl TaskScheduler for Queue {
    fn schedule(&self, task: BackgroundTask) {
        let mut tasks = self.tasks.lock();
        if !tasks.contains(&task) {
            tasks.push(task);
        }
    }
}

impl Queue {
    fn run(&self, worker: &mut BridgeWorker) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            worker.run_task(task);
        }
    }
}

fn bridge(transport: &MockTransport, config: BridgeConfig) -> (RenderStep, BridgeWorker) {
    AudioBridge::builder()
        .with_config(config)
        .transport(transport.clone())
        .audio_format(RATE, BLOCK)
        .build()
        .unwrap()
}

fn render_block(render: &mut RenderStep, scheduler: &Queue, channels: usize) -> Vec<f32> {
    let mut block = vec![f32::NAN; BLOCK * channels];
    render.render(&mut InterleavedOutput::new(&mut block, channels), scheduler);
    block
}

#[test]
fn test_frame_buffer_accounting() {
    let (mut producer, mut consumer) = frame_buffer(16, 2).unwrap();
    producer.activate(2).unwrap();

    let mut frame = [0.0f32; 2];
    let mut written = 0usize;
    let mut read = 0usize;
    for step in 0..40 {
        if step % 3 != 2 && producer.write_space() > 0 {
            producer.push_frame(&[written as f32, -(written as f32)]);
            written += 1;
        } else if consumer.pop_frame(&mut frame).is_some() {
            assert_eq!(frame, [read as f32, -(read as f32)]);
            read += 1;
        }
        assert_eq!(consumer.available_frames(), written - read);
        assert_eq!(producer.write_space() + consumer.available_frames(), 15);
    }

    producer.reset();
    assert_eq!(consumer.available_frames(), 0);
    assert_eq!(producer.write_space(), 15);
}

#[test]
fn test_frame_buffer_fills_to_capacity_minus_one() {
    let (mut producer, mut consumer) = frame_buffer(8, 1).unwrap();
    producer.activate(1).unwrap();
    for i in 0..7 {
        producer.push_frame(&[i as f32]);
    }
    assert_eq!(producer.write_space(), 0);

    let mut frame = [0.0f32];
    for i in 0..7 {
        assert_eq!(consumer.pop_frame(&mut frame), Some(1));
        assert_eq!(frame[0], i as f32);
    }
    assert_eq!(consumer.pop_frame(&mut frame), None);
}

#[test]
fn test_discovery_then_fill_makes_frames_available() {
    let transport = MockTransport::new();
    let mut outlet = transport.advertise(StreamInfo::new("audio", 2, RATE), 4096);
    outlet.push_sine(440.0, 1000);

    let (render, mut worker) = bridge(&transport, BridgeConfig::default());
    assert_eq!(worker.session_state(), SessionState::Absent);

    assert!(matches!(worker.resolve_streams(), DiscoveryOutcome::Connected(_)));
    assert_eq!(worker.session_state(), SessionState::Active);
    assert_eq!(worker.fill_buffer(), FillOutcome::Filled(512));
    assert_eq!(worker.fill_buffer(), FillOutcome::Filled(488));
    assert_eq!(render.available_frames(), 1000);
}

#[test]
fn test_too_many_channels_stays_absent() {
    let transport = MockTransport::new();
    let _outlet = transport.advertise(StreamInfo::new("audio", 9, RATE), 64);

    let (render, mut worker) = bridge(&transport, BridgeConfig::default());
    assert_eq!(worker.resolve_streams(), DiscoveryOutcome::NoMatch);
    assert_eq!(worker.session_state(), SessionState::Absent);
    assert_eq!(worker.fill_buffer(), FillOutcome::Idle);
    assert!(!render.is_active());
}

#[test]
fn test_rate_mismatch_is_never_opened() {
    let transport = MockTransport::new();
    let _outlet = transport.advertise(StreamInfo::new("audio", 2, 48000.0), 64);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let (_render, mut worker) = AudioBridge::builder()
        .transport(transport.clone())
        .audio_format(RATE, BLOCK)
        .on_event(move |e| sink.lock().push(e))
        .build()
        .unwrap();

    for _ in 0..5 {
        worker.resolve_streams();
    }
    assert_eq!(transport.open_count(), 0);
    assert_eq!(worker.stats().rejected_candidates, 5);
    assert!(events.lock().iter().all(|e| matches!(
        e,
        BridgeEvent::SourceRejected {
            reason: ConnectError::RateMismatch { .. },
            ..
        } | BridgeEvent::NoMatchingStream { .. }
    )));
}

#[test]
fn test_render_clock_drives_discovery_and_fill() {
    let transport = MockTransport::new();
    let mut outlet = transport.advertise(StreamInfo::new("audio", 1, RATE), 8192);
    outlet.push_frames(&[0.5; 256]);

    let config = BridgeConfig {
        fill_period_blocks: 1,
        ..Default::default()
    };
    let (mut render, mut worker) = bridge(&transport, config);
    let queue = Queue::default();

    // Block 0 posts discovery
    let block = render_block(&mut render, &queue, 1);
    assert!(block.iter().all(|s| *s == 0.0));
    queue.run(&mut worker);
    assert_eq!(worker.session_state(), SessionState::Active);

    // Next block posts a fill; the one after plays it
    render_block(&mut render, &queue, 1);
    queue.run(&mut worker);
    let block = render_block(&mut render, &queue, 1);
    assert!(block.iter().all(|s| *s == 0.5));
}

#[test]
fn test_loss_silences_until_reconnection() {
    let transport = MockTransport::new();
    let mut outlet = transport.advertise(StreamInfo::new("audio", 2, RATE), 8192);
    outlet.push_frames(&[0.25; 2 * 1024]);

    let (mut render, mut worker) = bridge(&transport, BridgeConfig::default());
    let queue = Queue::default();
    worker.resolve_streams();
    worker.fill_buffer();
    assert!(render_block(&mut render, &queue, 2).iter().all(|s| *s == 0.25));

    outlet.disconnect();
    assert_eq!(worker.fill_buffer(), FillOutcome::Lost);
    assert_eq!(worker.session_state(), SessionState::Lost);

    // Buffered frames are not played after the loss
    for _ in 0..4 {
        assert!(render_block(&mut render, &queue, 2).iter().all(|s| *s == 0.0));
    }
    assert_eq!(worker.resolve_streams(), DiscoveryOutcome::NoStreams);
    assert_eq!(worker.session_state(), SessionState::Absent);

    let mut outlet = transport.advertise(StreamInfo::new("audio", 1, RATE), 8192);
    outlet.push_frames(&[0.75; 128]);
    assert!(matches!(worker.resolve_streams(), DiscoveryOutcome::Connected(_)));
    worker.fill_buffer();

    // Mono stream on a stereo output: right channel stays silent
    let block = render_block(&mut render, &queue, 2);
    assert_eq!(&block[..4], &[0.75, 0.0, 0.75, 0.0]);

    let stats = worker.stats();
    assert_eq!(stats.connections, 2);
    assert_eq!(stats.losses, 1);
}

#[test]
fn test_drain_on_loss_plays_buffered_frames() {
    let transport = MockTransport::new();
    let mut outlet = transport.advertise(StreamInfo::new("audio", 1, RATE), 8192);
    outlet.push_frames(&[0.5; BLOCK]);

    let config = BridgeConfig {
        drain_on_loss: true,
        ..Default::default()
    };
    let (mut render, mut worker) = bridge(&transport, config);
    let queue = Queue::default();
    worker.resolve_streams();
    worker.fill_buffer();

    drop(outlet);
    assert_eq!(worker.fill_buffer(), FillOutcome::Lost);
    assert!(render_block(&mut render, &queue, 1).iter().all(|s| *s == 0.5));
    assert!(render_block(&mut render, &queue, 1).iter().all(|s| *s == 0.0));
}

#[test]
fn test_withdrawn_stream_is_reported_lost() {
    let transport = MockTransport::new();
    let _outlet = transport.advertise(StreamInfo::new("audio", 2, RATE), 64);
    let (_render, mut worker) = bridge(&transport, BridgeConfig::default());
    worker.resolve_streams();

    transport.withdraw("audio");
    assert_eq!(worker.fill_buffer(), FillOutcome::Lost);
    assert_eq!(worker.resolve_streams(), DiscoveryOutcome::NoStreams);
}

#[tokio::test]
async fn test_started_bridge_plays_stream() {
    let transport = MockTransport::new();
    let mut outlet = transport.advertise(StreamInfo::new("audio", 2, RATE), 8192);
    outlet.push_frames(&[0.125; 2 * 2048]);

    let config = BridgeConfig {
        fill_period_blocks: 1,
        ..Default::default()
    };
    let (mut render, handle) = AudioBridge::builder()
        .with_config(config)
        .transport(transport)
        .audio_format(RATE, BLOCK)
        .start()
        .unwrap();
    let scheduler = handle.scheduler();

    let mut heard = false;
    let mut block = vec![0.0f32; BLOCK * 2];
    for _ in 0..50 {
        render.render(&mut InterleavedOutput::new(&mut block, 2), &scheduler);
        if block.iter().any(|s| *s == 0.125) {
            heard = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(heard);

    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.connections, 1);
    assert!(stats.frames_rendered > 0);
    assert!(!render.is_active());
}

#[tokio::test]
async fn test_monitor_forwards_samples_from_every_stream() {
    let transport = MockTransport::new();
    let mut eeg = transport.advertise(StreamInfo::new("eeg", 4, 250.0), 64);
    let mut markers = transport.advertise(StreamInfo::new("markers", 1, 0.0), 64);
    eeg.push_frame(&[1.0, 2.0, 3.0, 4.0]);
    markers.push_frame(&[9.0]);

    let (tx, mut rx) = mpsc::channel(16);
    let monitor = InletMonitor::new(transport, MonitorConfig::default())
        .unwrap()
        .add_sink(ChannelSink::new(tx));
    let mut clock = monitor.clock(1000.0, 10).unwrap();
    let scheduler = AuxScheduler::new();
    let worker = spawn_auxiliary(&scheduler, monitor).unwrap();

    // Discovery is posted on spawn; give it a moment before pulling
    tokio::time::sleep(Duration::from_millis(20)).await;
    clock.tick(&scheduler);

    let mut sources = Vec::new();
    for _ in 0..2 {
        let sample = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        sources.push(sample.source);
    }
    sources.sort();
    assert_eq!(sources, vec!["eeg", "markers"]);

    let monitor = worker.stop().await.unwrap();
    assert_eq!(monitor.open_inlets(), 0);
    assert_eq!(monitor.stats().connections, 2);
}
