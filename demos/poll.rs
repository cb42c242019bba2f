//! Print every event from every attached device as one JSON object per line.
//!
//! ```text
//! RUST_LOG=evinput=debug cargo run --example poll [config.toml]
//! ```

use evinput::{DeviceManager, ManagerConfig};
use std::thread;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ManagerConfig::load(path)?,
        None => ManagerConfig::default(),
    };
    let manager = DeviceManager::with_config(config)?;

    eprintln!("Devices:");
    for d in manager.devices() {
        eprintln!("- {} ({}, {})", d.name(), d.id(), d.category());
    }
    if manager.devices().is_empty() {
        eprintln!("no input devices found");
        return Ok(());
    }

    let readers: Vec<_> = manager
        .devices()
        .into_iter()
        .map(|device| {
            thread::spawn(move || {
                while let Ok(events) = device.read() {
                    for event in events.iter().filter(|e| !e.is_sync()) {
                        match serde_json::to_string(event) {
                            Ok(line) => println!("{line}"),
                            Err(e) => eprintln!("{e}"),
                        }
                    }
                }
                eprintln!("{} is gone", device.name());
            })
        })
        .collect();

    for reader in readers {
        let _ = reader.join();
    }
    Ok(())
}
