//! Events and their raw, evdev-shaped precursors.
//!
//! Every backend produces [`RawEvent`]s: the same `{time, type, code, value}`
//! quadruple the Linux kernel writes to `/dev/input/event*`. A per-device
//! [`Normalizer`](crate::backends::Normalizer) resolves them through the
//! [`CodeTable`] into immutable [`InputEvent`]s, so application code never sees
//! which OS the input came from.
//!
//! ## Value conventions
//! - **Key:** `0` released, `1` pressed, `2` kernel autorepeat.
//! - **Relative:** signed delta (wheel ticks are whole detents on every platform).
//! - **Absolute:** whatever range the source reports (XInput sticks are `i16`,
//!   triggers `0..=255`, hats `-1..=1`, pointer positions are screen pixels).
//! - **Sync:** `SYN_REPORT` closes a frame of related changes.

use crate::codes::CodeTable;
use crate::device::DeviceId;
use crate::error::{InputError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Event category tag (the evdev `EV_*` type).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    Sync,
    Key,
    Relative,
    Absolute,
    Misc,
    Switch,
    #[serde(rename = "LED")]
    Led,
    Sound,
    Repeat,
    ForceFeedback,
    Power,
    ForceFeedbackStatus,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::Sync,
        EventType::Key,
        EventType::Relative,
        EventType::Absolute,
        EventType::Misc,
        EventType::Switch,
        EventType::Led,
        EventType::Sound,
        EventType::Repeat,
        EventType::ForceFeedback,
        EventType::Power,
        EventType::ForceFeedbackStatus,
    ];

    /// Resolve a raw `EV_*` number.
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0x00 => EventType::Sync,
            0x01 => EventType::Key,
            0x02 => EventType::Relative,
            0x03 => EventType::Absolute,
            0x04 => EventType::Misc,
            0x05 => EventType::Switch,
            0x11 => EventType::Led,
            0x12 => EventType::Sound,
            0x14 => EventType::Repeat,
            0x15 => EventType::ForceFeedback,
            0x16 => EventType::Power,
            0x17 => EventType::ForceFeedbackStatus,
            _ => return None,
        })
    }

    pub fn raw(self) -> u16 {
        match self {
            EventType::Sync => 0x00,
            EventType::Key => 0x01,
            EventType::Relative => 0x02,
            EventType::Absolute => 0x03,
            EventType::Misc => 0x04,
            EventType::Switch => 0x05,
            EventType::Led => 0x11,
            EventType::Sound => 0x12,
            EventType::Repeat => 0x14,
            EventType::ForceFeedback => 0x15,
            EventType::Power => 0x16,
            EventType::ForceFeedbackStatus => 0x17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EventType::Sync => "Sync",
            EventType::Key => "Key",
            EventType::Relative => "Relative",
            EventType::Absolute => "Absolute",
            EventType::Misc => "Misc",
            EventType::Switch => "Switch",
            EventType::Led => "LED",
            EventType::Sound => "Sound",
            EventType::Repeat => "Repeat",
            EventType::ForceFeedback => "ForceFeedback",
            EventType::Power => "Power",
            EventType::ForceFeedbackStatus => "ForceFeedbackStatus",
        }
    }

    /// Inclusive range a `state` must fall in for this type, if restricted.
    pub fn state_range(self) -> Option<(i32, i32)> {
        match self {
            EventType::Key => Some((0, 2)),
            EventType::Switch | EventType::Led => Some((0, 1)),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// C-style `timeval`: whole seconds plus microseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timeval {
    pub sec: i64,
    pub usec: i64,
}

impl Timeval {
    pub fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }

    /// Wall-clock now. Used by backends whose OS callbacks carry no usable clock.
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: since.as_secs() as i64,
            usec: i64::from(since.subsec_micros()),
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.usec as f64 / 1_000_000.0
    }
}

/// One evdev-shaped record, before code-table resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub time: Timeval,
    pub ev_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(time: Timeval, ev_type: EventType, code: u16, value: i32) -> Self {
        Self {
            time,
            ev_type: ev_type.raw(),
            code,
            value,
        }
    }

    /// `SYN_REPORT` frame marker.
    pub fn sync(time: Timeval) -> Self {
        Self::new(time, EventType::Sync, 0, 0)
    }
}

/// A normalized input occurrence.
///
/// Immutable once built; clone freely. `device` is a lookup key into the
/// [`DeviceManager`](crate::manager::DeviceManager), not an owning handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputEvent {
    pub timestamp: Timeval,
    pub device: DeviceId,
    pub ev_type: EventType,
    pub code: &'static str,
    pub state: i32,
}

impl InputEvent {
    /// Resolve `raw` against `codes` and validate its state range.
    pub fn new(codes: &CodeTable, device: DeviceId, raw: RawEvent) -> Result<Self> {
        let ev_type = EventType::from_raw(raw.ev_type).ok_or_else(|| {
            InputError::DecodeMalformed(format!("unknown event type 0x{:02x}", raw.ev_type))
        })?;
        let code = codes.lookup(ev_type, raw.code).ok_or_else(|| {
            InputError::DecodeMalformed(format!("unknown {ev_type} code 0x{:03x}", raw.code))
        })?;
        if let Some((lo, hi)) = ev_type.state_range() {
            if raw.value < lo || raw.value > hi {
                return Err(InputError::DecodeMalformed(format!(
                    "{code} state {} outside {lo}..={hi}",
                    raw.value
                )));
            }
        }
        Ok(Self {
            timestamp: raw.time,
            device,
            ev_type,
            code,
            state: raw.value,
        })
    }

    /// `true` for the `SYN_REPORT` marker that closes a frame.
    pub fn is_sync(&self) -> bool {
        self.ev_type == EventType::Sync && self.code == "SYN_REPORT"
    }
}
