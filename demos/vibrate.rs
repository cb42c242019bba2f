//! Rumble the first gamepad: left motor, right motor, then both.
//!
//! ```text
//! cargo run --example vibrate
//! ```

use evinput::DeviceManager;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let manager = DeviceManager::new()?;
    let Some(pad) = manager.gamepads().into_iter().find(|p| p.has_force_feedback()) else {
        eprintln!("no gamepad with force feedback found");
        return Ok(());
    };
    eprintln!("rumbling {} ({})", pad.name(), pad.id());

    for (left, right, ms) in [(1.0, 0.0, 1000), (0.0, 1.0, 1000), (1.0, 1.0, 2000)] {
        pad.set_vibration(left, right, Duration::from_millis(ms))?;
        thread::sleep(Duration::from_secs(2));
    }
    Ok(())
}
