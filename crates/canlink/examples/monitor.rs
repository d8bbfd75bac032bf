//! Live bus monitor — the push model.
//!
//! Run with:
//!   cargo run --example monitor -- vcan0
//!
//! Generate traffic in another terminal, e.g.:
//!   cansend vcan0 123#DEADBEEF

use canlink::{BusEvent, CanBus, EventKind, ListenOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let interface = std::env::args().nth(1).unwrap_or_else(|| "vcan0".into());
    let bus = CanBus::open(&interface)?;

    bus.on(EventKind::Frame, |event| {
        if let BusEvent::Frame(frame) = event {
            println!(
                "{:>8x}  [{}]  {:02X?}",
                frame.id,
                frame.kind(),
                frame.data.as_ref()
            );
        }
    });
    bus.on(EventKind::Error, |event| {
        if let BusEvent::Error(err) = event {
            eprintln!("listener failed ({}): {err}", err.code());
        }
    });

    bus.start_listening(ListenOptions::default()).await?;
    eprintln!("Listening on {interface}; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    bus.stop_listening().await;
    bus.close().await?;
    Ok(())
}
