//! Desktop playback example.
//!
//! Plays a mock sine stream through the default output device.
//!
//! Run with: cargo run --example cpal_bridge --features cpal-output

use std::time::Duration;

use inlet_bridge::{AudioBridge, CpalOutput, MockTransport, StreamInfo};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let output = CpalOutput::open_default()?.with_block_size(256);
    println!(
        "Output: {} ({}Hz, {} channels)",
        output.name(),
        output.sample_rate(),
        output.channels()
    );

    let transport = MockTransport::new();
    let mut outlet = transport.advertise(
        StreamInfo::new("audio", output.channels(), output.sample_rate()),
        16384,
    );

    let (render, bridge) = AudioBridge::builder()
        .transport(transport)
        .audio_format(output.sample_rate(), output.block_size())
        .start()?;
    let _stream = output.start(render, bridge.scheduler())?;

    println!("Playing 440Hz for 5 seconds...");
    let frames_per_tick = (output.sample_rate() / 100.0) as usize;
    for _ in 0..500 {
        outlet.push_sine(440.0, frames_per_tick);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let stats = bridge.stop().await?;
    println!("Stats: {stats:?}");

    Ok(())
}
