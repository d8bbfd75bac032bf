//! Batch collection — the pull model.
//!
//! Run with:
//!   cargo run --example collect -- vcan0
//!
//! Waits for ten frames (up to five seconds between frames) and
//! prints them as one batch.

use std::time::Duration;

use canlink::{CanBus, StreamOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let interface = std::env::args().nth(1).unwrap_or_else(|| "vcan0".into());
    let bus = CanBus::open(&interface)?;

    let options = StreamOptions::default().with_timeout(Duration::from_secs(5));
    let frames = bus.collect_frames(10, options).await?;

    for frame in &frames {
        println!(
            "{:>8x}  [{}]  {:02X?}",
            frame.id,
            frame.kind(),
            frame.data.as_ref()
        );
    }

    bus.close().await?;
    Ok(())
}
