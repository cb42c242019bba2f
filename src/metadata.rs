//! Device metadata snapshot.
//!
//! [`DeviceInfo`] is a lightweight, cloneable description of a device suitable
//! for UI display and logging. Backends fill what they know; unknown fields stay
//! `None`.
//!
//! # Conventions
//! - `key` identifies the hardware endpoint for de-duplication across
//!   re-discovery: the resolved device-node path on Linux, `xinput:{slot}` for
//!   XInput pads, `hook:keyboard` / `quartz:mouse` style keys for hook-based
//!   sources.
//! - `path` is the path the device was found under (a `by-id` / `by-path` link
//!   on Linux). Treat it as diagnostic first, identity second.

use crate::device::{DeviceCategory, DeviceId};
use serde::Serialize;

/// Snapshot of what is known about one device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub key: String,
    pub name: String,
    pub category: DeviceCategory,
    pub path: Option<String>,
    /// Bus/protocol hint parsed from the path, e.g. `"usb"`, `"platform"`, `"pci"`.
    pub protocol: Option<String>,
    /// The middle part of the path, e.g. `"Logitech_USB_Receiver-if01"`.
    pub identifier: Option<String>,
}

/// Pieces of a udev-style input link name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathInfo {
    pub protocol: String,
    pub identifier: String,
    /// The trailing kind: `kbd`, `mouse`, `joystick`, ...
    pub device_type: String,
}

impl PathInfo {
    /// Split `usb-Logitech_USB_Receiver-if01-event-mouse` into
    /// `("usb", "Logitech_USB_Receiver-if01", "mouse")`.
    ///
    /// Accepts a bare file name or a full path.
    pub fn parse(path: &str) -> Option<Self> {
        let file = path.rsplit('/').next()?;
        let (protocol, remainder) = file.split_once('-')?;
        let mut tail = remainder.rsplitn(3, '-');
        let device_type = tail.next()?;
        let _event = tail.next()?;
        let identifier = tail.next()?;
        if protocol.is_empty() || device_type.is_empty() {
            return None;
        }
        Some(Self {
            protocol: protocol.to_string(),
            identifier: identifier.to_string(),
            device_type: device_type.to_string(),
        })
    }

    pub fn category(&self) -> DeviceCategory {
        DeviceCategory::from_device_type(&self.device_type)
    }
}
