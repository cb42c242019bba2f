//! XInput controller polling, expressed as evdev events.
//!
//! XInput has no event stream: a slot is polled for a full state snapshot and
//! each snapshot is compared with the previous one. Differences are emitted
//! using the Linux `xpad` driver's layout, so a pad reads the same on Windows
//! as on Linux:
//!
//! | XInput                | evdev                          |
//! |-----------------------|--------------------------------|
//! | D-pad up / down       | `ABS_HAT0Y` `-1` / `1` (`0` on release) |
//! | D-pad left / right    | `ABS_HAT0X` `-1` / `1` (`0` on release) |
//! | A / B / X / Y         | `BTN_SOUTH` / `BTN_EAST` / `BTN_WEST` / `BTN_NORTH` |
//! | LB / RB               | `BTN_TL` / `BTN_TR`            |
//! | START / BACK          | `BTN_START` / `BTN_SELECT`     |
//! | L3 / R3               | `BTN_THUMBL` / `BTN_THUMBR`    |
//! | LX, LY, RX, RY        | `ABS_X`, `ABS_Y`, `ABS_RX`, `ABS_RY` (raw `i16`) |
//! | LT, RT                | `ABS_Z`, `ABS_RZ` (raw `0..=255`) |
//!
//! The guide button is not reported by the public XInput API.

use super::{Decoder, Normalizer};
use crate::error::{InputError, Result};
use crate::event::{EventType, InputEvent, RawEvent, Timeval};
use std::thread;
use std::time::Duration;

const DPAD_UP: u16 = 0x0001;
const DPAD_DOWN: u16 = 0x0002;
const DPAD_LEFT: u16 = 0x0004;
const DPAD_RIGHT: u16 = 0x0008;

const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;
const ABS_Z: u16 = 0x02;
const ABS_RX: u16 = 0x03;
const ABS_RY: u16 = 0x04;
const ABS_RZ: u16 = 0x05;
const ABS_HAT0X: u16 = 0x10;
const ABS_HAT0Y: u16 = 0x11;

/// Face, shoulder, menu and stick buttons: XInput mask → evdev key code.
const BUTTONS: [(u16, u16); 10] = [
    (0x0010, 0x13b), // START → BTN_START
    (0x0020, 0x13a), // BACK → BTN_SELECT
    (0x0040, 0x13d), // LEFT_THUMB → BTN_THUMBL
    (0x0080, 0x13e), // RIGHT_THUMB → BTN_THUMBR
    (0x0100, 0x136), // LEFT_SHOULDER → BTN_TL
    (0x0200, 0x137), // RIGHT_SHOULDER → BTN_TR
    (0x1000, 0x130), // A → BTN_SOUTH
    (0x2000, 0x131), // B → BTN_EAST
    (0x4000, 0x134), // X → BTN_WEST
    (0x8000, 0x133), // Y → BTN_NORTH
];

/// Hat axis → (negative bit, positive bit).
const HATS: [(u16, u16, u16); 2] = [
    (ABS_HAT0X, DPAD_LEFT, DPAD_RIGHT),
    (ABS_HAT0Y, DPAD_UP, DPAD_DOWN),
];

/// `-1`, `0` or `1` for one hat axis. Both directions held cancel out.
fn hat_value(buttons: u16, negative: u16, positive: u16) -> i32 {
    i32::from(buttons & positive != 0) - i32::from(buttons & negative != 0)
}

/// One `XINPUT_STATE` snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GamepadState {
    /// Bumped by the driver whenever anything in the snapshot changed.
    pub packet_number: u32,
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// Events describing the change from `prev` to `next`, without a frame marker.
///
/// Snapshots with the same packet number produce nothing. Otherwise every
/// changed button bit yields one event and every changed axis one event. The
/// D-pad is reported per hat axis, so rocking from one direction straight to
/// the opposite one is a single event carrying the new position.
pub fn diff_states(prev: &GamepadState, next: &GamepadState, time: Timeval) -> Vec<RawEvent> {
    let mut out = Vec::new();
    if prev.packet_number == next.packet_number {
        return out;
    }

    for (code, negative, positive) in HATS {
        let before = hat_value(prev.buttons, negative, positive);
        let after = hat_value(next.buttons, negative, positive);
        if before != after {
            out.push(RawEvent::new(time, EventType::Absolute, code, after));
        }
    }
    let changed = prev.buttons ^ next.buttons;
    for (mask, code) in BUTTONS {
        if changed & mask != 0 {
            let value = i32::from(next.buttons & mask != 0);
            out.push(RawEvent::new(time, EventType::Key, code, value));
        }
    }

    let axes = [
        (ABS_X, i32::from(prev.thumb_lx), i32::from(next.thumb_lx)),
        (ABS_Y, i32::from(prev.thumb_ly), i32::from(next.thumb_ly)),
        (ABS_Z, i32::from(prev.left_trigger), i32::from(next.left_trigger)),
        (ABS_RX, i32::from(prev.thumb_rx), i32::from(next.thumb_rx)),
        (ABS_RY, i32::from(prev.thumb_ry), i32::from(next.thumb_ry)),
        (ABS_RZ, i32::from(prev.right_trigger), i32::from(next.right_trigger)),
    ];
    for (code, before, after) in axes {
        if before != after {
            out.push(RawEvent::new(time, EventType::Absolute, code, after));
        }
    }
    out
}

/// Where snapshots come from. `Ok(None)` means the slot is disconnected.
pub trait StateSource: Send {
    fn get_state(&mut self) -> Result<Option<GamepadState>>;
}

/// Polling decoder for one XInput slot.
///
/// The first successful poll only records a baseline; a pad held in some
/// position at attach time does not produce a burst of synthetic changes.
pub struct XInputDecoder<S> {
    source: S,
    label: String,
    interval: Duration,
    last: Option<GamepadState>,
}

impl<S: StateSource> XInputDecoder<S> {
    pub fn new(label: impl Into<String>, source: S, interval: Duration) -> Self {
        Self {
            source,
            label: label.into(),
            interval,
            last: None,
        }
    }
}

impl<S: StateSource> Decoder for XInputDecoder<S> {
    fn decode_next(&mut self, normalizer: &mut Normalizer) -> Result<Vec<InputEvent>> {
        thread::sleep(self.interval);
        let next = self
            .source
            .get_state()?
            .ok_or_else(|| InputError::DeviceGone(format!("{}: disconnected", self.label)))?;

        let Some(prev) = self.last.replace(next) else {
            return Ok(Vec::new());
        };
        let time = Timeval::now();
        let mut raws = diff_states(&prev, &next, time);
        if raws.is_empty() {
            return Ok(Vec::new());
        }
        raws.push(RawEvent::sync(time));
        Ok(normalizer.normalize_all(raws))
    }
}
