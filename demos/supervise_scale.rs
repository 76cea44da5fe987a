//! Supervise a single BS440 scale and print availability changes
//!
//! Run with: cargo run --example supervise_scale -- AA:BB:CC:DD:EE:FF [scan_interval_secs]

use bs440_rust_ble::{
    EventKind, Result, ScaleAvailability, ScaleConfig, ScaleManager, SupervisionConfig, Topic,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bs440_rust_ble=debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        eprintln!("usage: supervise_scale <address> [scan_interval_secs]");
        std::process::exit(2);
    };
    let scan_interval: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);

    let supervision = SupervisionConfig::new(scan_interval, Duration::from_secs(30))?;
    let config = ScaleConfig::new(&address)?.with_supervision(supervision);
    let device = config.device;

    let manager = ScaleManager::new().await?;

    let availability = ScaleAvailability::with_callback(manager.event_bus(), device, |available| {
        println!("available: {}", available);
    });

    let _connected = manager
        .event_bus()
        .on_event(Topic::connected(device), |event| {
            println!("{} at {}", Topic::connected(event.device), event.timestamp);
        });
    let _disconnected = manager
        .event_bus()
        .on_event(Topic::disconnected(device), |event| {
            println!("{} at {}", Topic::new(EventKind::Disconnected, event.device), event.timestamp);
        });

    // A missing scale is a "not ready" condition; try again until it shows up.
    loop {
        match manager.setup(config.clone()).await {
            Ok(()) => break,
            Err(e) if e.is_not_ready() => {
                println!("{}; retrying in {}s", e, scan_interval);
                tokio::time::sleep(supervision.scan_interval()).await;
            }
            Err(e) => return Err(e),
        }
    }

    println!("Supervising {} ({}). Press Ctrl+C to exit.", availability.name(), device);
    let _ = tokio::signal::ctrl_c().await;

    manager.shutdown().await?;
    println!("\nDone!");

    Ok(())
}
