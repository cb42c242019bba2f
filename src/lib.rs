//! evinput: cross-platform keyboard, mouse and gamepad input as Linux-style
//! events.
//!
//! Every platform's native input is normalized into one event shape, the
//! `{type, code, value}` triple Linux evdev uses, with codes resolved to their
//! evdev names (`KEY_A`, `BTN_SOUTH`, `ABS_HAT0X`, ...):
//!
//! - **Linux**: `/dev/input/event*` device nodes, read directly.
//! - **Windows**: XInput polling for gamepads, low-level hooks for keyboard and
//!   mouse.
//! - **macOS**: Quartz event taps for keyboard and mouse.
//!
//! A [`DeviceManager`] discovers sources and gives each its own capture thread
//! and bounded queue. Read per device with [`InputDevice::read`], or per
//! category with [`get_gamepad`], [`get_key`] and [`get_mouse`].
//!
//! ```no_run
//! use evinput::{get_key, DeviceManager};
//!
//! let manager = DeviceManager::new()?;
//! loop {
//!     for event in get_key(&manager)? {
//!         println!("{} {} {}", event.ev_type, event.code, event.state);
//!     }
//! }
//! # Ok::<(), evinput::InputError>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backends;
pub mod codes;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod manager;
pub mod metadata;
pub mod query;
mod queue;

pub use codes::CodeTable;
pub use config::{LinuxConfig, ManagerConfig, OverflowPolicy};
pub use device::{DeviceCategory, DeviceId, InputDevice};
pub use error::{InputError, Result};
pub use event::{EventType, InputEvent, RawEvent, Timeval};
pub use manager::{DeviceManager, DiscoveryReport};
pub use metadata::DeviceInfo;
pub use query::{get_gamepad, get_key, get_mouse};
