#![cfg(target_os = "windows")]

//! Windows input backend.
//!
//! - **Gamepads** come from XInput slots `0..4`, polled and diffed
//!   ([`XInputDecoder`]). Their motors are driven through the same slot.
//! - **Keyboard and mouse** come from low-level hooks (`WH_KEYBOARD_LL`,
//!   `WH_MOUSE_LL`) running on their own message-loop threads. Hooks see the
//!   merged system input, so at most one keyboard and one mouse are exposed,
//!   and only when Raw Input reports at least one such device attached.
//!
//! Most users should not interact with this module directly; use
//! [`DeviceManager`](crate::manager::DeviceManager).

pub mod hooks;
pub mod raw_input;
pub mod xinput;

use super::rumble::TimedRumble;
use super::xinput::XInputDecoder;
use super::{Backend, Candidate, Probe, PushDecoder};
use crate::codes::CodeTable;
use crate::config::ManagerConfig;
use crate::device::DeviceCategory;
use crate::error::InputError;
use hooks::HookKind;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// XInput supports exactly four controllers.
const XINPUT_SLOTS: u32 = 4;

pub struct WindowsBackend {
    codes: Arc<CodeTable>,
    poll_interval: Duration,
    wait: Duration,
}

impl WindowsBackend {
    pub fn new(config: &ManagerConfig, codes: Arc<CodeTable>) -> Self {
        Self {
            codes,
            poll_interval: config.poll_interval(),
            wait: config.wait_timeout(),
        }
    }

    fn hook(&self, kind: HookKind) -> Result<Candidate, InputError> {
        let (tx, rx) = mpsc::channel();
        let thread = hooks::spawn(kind, self.codes.clone(), tx)?;
        let decoder = PushDecoder::new(kind.key(), rx, self.wait).with_guard(thread);
        Ok(Candidate {
            key: kind.key().to_string(),
            name: kind.name().to_string(),
            category: kind.category(),
            path: None,
            decoder: Box::new(decoder),
            rumble: None,
        })
    }
}

impl Backend for WindowsBackend {
    fn probe(&mut self, known: &dyn Fn(&str) -> bool) -> Probe {
        let mut probe = Probe::default();

        for slot in 0..XINPUT_SLOTS {
            let key = format!("xinput:{slot}");
            if known(&key) || !xinput::connected(slot) {
                continue;
            }
            debug!(slot, "XInput controller connected");
            let decoder = XInputDecoder::new(key.clone(), xinput::XInputSlot::new(slot), self.poll_interval);
            probe.found.push(Candidate {
                key,
                name: format!("XInput Controller {slot}"),
                category: DeviceCategory::Gamepad,
                path: None,
                decoder: Box::new(decoder),
                rumble: Some(Box::new(TimedRumble::new(xinput::XInputMotors::new(slot)))),
            });
        }

        let attached = raw_input::count_devices();
        debug!(keyboards = attached.keyboards, mice = attached.mice, "raw input devices");
        for (kind, count) in [(HookKind::Keyboard, attached.keyboards), (HookKind::Mouse, attached.mice)] {
            if count == 0 || known(kind.key()) {
                continue;
            }
            match self.hook(kind) {
                Ok(candidate) => probe.found.push(candidate),
                Err(e) => probe.skipped.push((kind.key().to_string(), e)),
            }
        }
        probe
    }
}
