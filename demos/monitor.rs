//! Multi-inlet monitor example.
//!
//! Opens every stream advertised on the mock transport and logs each sample.
//!
//! Run with: cargo run --example monitor

use std::time::Duration;

use inlet_bridge::pipeline::spawn_auxiliary;
use inlet_bridge::{
    AuxScheduler, InletMonitor, LogSink, MockTransport, MonitorConfig, StreamInfo,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let transport = MockTransport::new();
    let mut eeg = transport.advertise(StreamInfo::new("eeg", 4, 250.0).with_type("EEG"), 256);
    let mut markers = transport.advertise(StreamInfo::new("markers", 1, 0.0).with_type("Markers"), 16);

    let monitor = InletMonitor::new(transport, MonitorConfig::default())?
        .add_sink(LogSink::new())
        .on_event(|e| println!("event: {e:?}"));
    monitor.start_sinks().await?;

    // A 1kHz audio clock with 100-frame blocks ticks every 100ms
    let mut clock = monitor.clock(1000.0, 100)?;
    let scheduler = AuxScheduler::new();
    let worker = spawn_auxiliary(&scheduler, monitor)?;

    let mut interval = tokio::time::interval(Duration::from_millis(100));
    for i in 0..30u8 {
        interval.tick().await;
        let value = f32::from(i);
        eeg.push_frame(&[value, -value, value * 0.5, 0.0]);
        if i % 10 == 0 {
            markers.push_frame(&[value]);
        }
        clock.tick(&scheduler);
    }

    let monitor = worker.stop().await?;
    println!("Stats: {:?}", monitor.stats());

    Ok(())
}
