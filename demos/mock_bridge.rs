//! Mock bridge example.
//!
//! Runs the whole bridge against the in-process mock transport: a sender
//! task streams a sine tone, disappears for a while, then comes back. A
//! simulated audio clock drives the render step.
//!
//! Run with: cargo run --example mock_bridge

use std::time::Duration;

use inlet_bridge::{AudioBridge, InterleavedOutput, MockTransport, StreamInfo};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 480;
const CHANNELS: usize = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inlet_bridge=info".into()),
        )
        .init();

    let transport = MockTransport::new();
    let (mut render, bridge) = AudioBridge::builder()
        .transport(transport.clone())
        .audio_format(SAMPLE_RATE, BLOCK_SIZE)
        .on_event(|e| println!("event: {e:?}"))
        .start()?;
    let scheduler = bridge.scheduler();

    // Sender: 1s of tone, 1s gone, 1s of tone again
    let sender = tokio::spawn(async move {
        for round in 0..2 {
            let mut outlet = transport.advertise(StreamInfo::new("audio", CHANNELS, SAMPLE_RATE), 8192);
            for _ in 0..100 {
                outlet.push_sine(220.0 * f64::from(round + 1), BLOCK_SIZE);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            println!("outlet going away");
            drop(outlet);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });

    // Simulated audio clock: one block every 10ms
    let mut clock = tokio::time::interval(Duration::from_millis(10));
    let mut block = vec![0.0f32; BLOCK_SIZE * CHANNELS];
    for i in 0..400 {
        clock.tick().await;
        render.render(&mut InterleavedOutput::new(&mut block, CHANNELS), &scheduler);

        if i % 50 == 0 {
            let peak = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            println!(
                "block {i:>3}: active={} buffered={} peak={peak:.2}",
                render.is_active(),
                render.available_frames()
            );
        }
    }

    sender.await?;
    let stats = bridge.stop().await?;
    println!("Stats: {stats:?}");

    Ok(())
}
