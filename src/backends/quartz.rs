//! macOS Quartz event-tap events, expressed as evdev frames.
//!
//! The tap callback receives a `CGEventType` and a `CGEventRef`. The platform
//! glue (`macos`) reads the handful of fields needed into a [`TapEvent`]; the
//! functions here do the mapping and build on every host.

use crate::codes::CodeTable;
use crate::event::{EventType, RawEvent, Timeval};

pub const LEFT_MOUSE_DOWN: u32 = 1;
pub const LEFT_MOUSE_UP: u32 = 2;
pub const RIGHT_MOUSE_DOWN: u32 = 3;
pub const RIGHT_MOUSE_UP: u32 = 4;
pub const MOUSE_MOVED: u32 = 5;
pub const LEFT_MOUSE_DRAGGED: u32 = 6;
pub const RIGHT_MOUSE_DRAGGED: u32 = 7;
pub const KEY_DOWN: u32 = 10;
pub const KEY_UP: u32 = 11;
pub const FLAGS_CHANGED: u32 = 12;
pub const SCROLL_WHEEL: u32 = 22;
pub const OTHER_MOUSE_DOWN: u32 = 25;
pub const OTHER_MOUSE_UP: u32 = 26;
pub const OTHER_MOUSE_DRAGGED: u32 = 27;

/// Event types the keyboard tap subscribes to.
pub const KEYBOARD_TYPES: [u32; 3] = [KEY_DOWN, KEY_UP, FLAGS_CHANGED];

/// Event types the mouse tap subscribes to.
pub const MOUSE_TYPES: [u32; 11] = [
    LEFT_MOUSE_DOWN,
    LEFT_MOUSE_UP,
    RIGHT_MOUSE_DOWN,
    RIGHT_MOUSE_UP,
    MOUSE_MOVED,
    LEFT_MOUSE_DRAGGED,
    RIGHT_MOUSE_DRAGGED,
    SCROLL_WHEEL,
    OTHER_MOUSE_DOWN,
    OTHER_MOUSE_UP,
    OTHER_MOUSE_DRAGGED,
];

/// `CGEventFlags` value left when the last modifier is released.
const FLAGS_NONE: u64 = 0x100;

const MSC_SCAN: u16 = 0x04;
const REL_X: u16 = 0x00;
const REL_Y: u16 = 0x01;
const REL_HWHEEL: u16 = 0x06;
const REL_WHEEL: u16 = 0x08;
const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;

const BTN_LEFT: (u16, i32) = (0x110, 589_825);
const BTN_RIGHT: (u16, i32) = (0x111, 589_826);
const BTN_MIDDLE: (u16, i32) = (0x112, 589_827);
const BTN_SIDE: (u16, i32) = (0x113, 589_828);
const BTN_EXTRA: (u16, i32) = (0x114, 589_829);

/// The fields of one tapped `CGEvent` that matter for mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TapEvent {
    pub event_type: u32,
    /// `kCGKeyboardEventKeycode`.
    pub keycode: u16,
    /// `CGEventGetFlags`.
    pub flags: u64,
    /// `kCGMouseEventButtonNumber`: 0 left, 1 right, 2 middle, 3 and 4 side buttons.
    pub button: i64,
    /// `CGEventGetLocation`, in global display points.
    pub x: f64,
    pub y: f64,
    /// `kCGMouseEventDeltaX` / `DeltaY`.
    pub delta_x: i64,
    pub delta_y: i64,
    /// `kCGScrollWheelEventDeltaAxis1` (vertical) / `Axis2` (horizontal).
    pub scroll_y: i64,
    pub scroll_x: i64,
}

/// `MSC_SCAN` (the native keycode), key, `SYN_REPORT`.
///
/// `None` for non-keyboard event types and keycodes with no evdev counterpart.
pub fn keyboard_frame(codes: &CodeTable, event: &TapEvent, time: Timeval) -> Option<Vec<RawEvent>> {
    let state = match event.event_type {
        KEY_DOWN => 1,
        KEY_UP => 0,
        FLAGS_CHANGED => i32::from(event.flags != FLAGS_NONE),
        _ => return None,
    };
    let key = codes.mac_key(event.keycode)?;
    Some(vec![
        RawEvent::new(time, EventType::Misc, MSC_SCAN, i32::from(event.keycode)),
        RawEvent::new(time, EventType::Key, key, state),
        RawEvent::sync(time),
    ])
}

/// Frame for one mouse tap event: button (scan + key), wheel, cursor position,
/// non-zero motion deltas, then `SYN_REPORT`.
pub fn mouse_frame(event: &TapEvent, time: Timeval) -> Vec<RawEvent> {
    let mut frame = Vec::with_capacity(8);
    if let Some(((code, scan), state)) = button(event) {
        frame.push(RawEvent::new(time, EventType::Misc, MSC_SCAN, scan));
        frame.push(RawEvent::new(time, EventType::Key, code, state));
    }
    if event.event_type == SCROLL_WHEEL {
        if event.scroll_x != 0 {
            frame.push(RawEvent::new(time, EventType::Relative, REL_HWHEEL, clamp(event.scroll_x)));
        }
        if event.scroll_y != 0 {
            frame.push(RawEvent::new(time, EventType::Relative, REL_WHEEL, clamp(event.scroll_y)));
        }
    }
    frame.push(RawEvent::new(time, EventType::Absolute, ABS_X, event.x as i32));
    frame.push(RawEvent::new(time, EventType::Absolute, ABS_Y, event.y as i32));
    if event.delta_x != 0 {
        frame.push(RawEvent::new(time, EventType::Relative, REL_X, clamp(event.delta_x)));
    }
    if event.delta_y != 0 {
        frame.push(RawEvent::new(time, EventType::Relative, REL_Y, clamp(event.delta_y)));
    }
    frame.push(RawEvent::sync(time));
    frame
}

fn button(event: &TapEvent) -> Option<((u16, i32), i32)> {
    let other = || match event.button {
        2 => Some(BTN_MIDDLE),
        3 => Some(BTN_SIDE),
        4 => Some(BTN_EXTRA),
        _ => None,
    };
    Some(match event.event_type {
        LEFT_MOUSE_DOWN => (BTN_LEFT, 1),
        LEFT_MOUSE_UP => (BTN_LEFT, 0),
        RIGHT_MOUSE_DOWN => (BTN_RIGHT, 1),
        RIGHT_MOUSE_UP => (BTN_RIGHT, 0),
        OTHER_MOUSE_DOWN => (other()?, 1),
        OTHER_MOUSE_UP => (other()?, 0),
        _ => return None,
    })
}

fn clamp(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;
    use crate::event::InputEvent;

    fn resolve(frame: &[RawEvent]) -> Vec<(&'static str, i32)> {
        let codes = CodeTable::evdev();
        frame
            .iter()
            .map(|r| {
                let ev = InputEvent::new(&codes, DeviceId(0), *r).unwrap();
                (ev.code, ev.state)
            })
            .collect()
    }

    fn key(event_type: u32, keycode: u16, flags: u64) -> TapEvent {
        TapEvent {
            event_type,
            keycode,
            flags,
            ..TapEvent::default()
        }
    }

    #[test]
    fn key_presses_map_through_mac_table() {
        let codes = CodeTable::evdev();
        let t = Timeval::default();
        // kVK_ANSI_A
        let down = keyboard_frame(&codes, &key(KEY_DOWN, 0x00, 0), t).unwrap();
        assert_eq!(resolve(&down), vec![("MSC_SCAN", 0), ("KEY_A", 1), ("SYN_REPORT", 0)]);
        let up = keyboard_frame(&codes, &key(KEY_UP, 0x00, 0), t).unwrap();
        assert_eq!(resolve(&up)[1], ("KEY_A", 0));
    }

    #[test]
    fn modifier_state_follows_flags() {
        let codes = CodeTable::evdev();
        let t = Timeval::default();
        // kVK_Shift with the shift flag set, then with nothing held.
        let held = keyboard_frame(&codes, &key(FLAGS_CHANGED, 0x38, 0x20102), t).unwrap();
        assert_eq!(resolve(&held)[1], ("KEY_LEFTSHIFT", 1));
        let released = keyboard_frame(&codes, &key(FLAGS_CHANGED, 0x38, FLAGS_NONE), t).unwrap();
        assert_eq!(resolve(&released)[1], ("KEY_LEFTSHIFT", 0));
    }

    #[test]
    fn unmapped_keycodes_and_mouse_types_yield_nothing() {
        let codes = CodeTable::evdev();
        assert!(keyboard_frame(&codes, &key(KEY_DOWN, 0x7f7f, 0), Timeval::default()).is_none());
        assert!(keyboard_frame(&codes, &key(MOUSE_MOVED, 0x00, 0), Timeval::default()).is_none());
    }

    #[test]
    fn move_reports_position_and_deltas() {
        let event = TapEvent {
            event_type: MOUSE_MOVED,
            x: 100.7,
            y: 20.2,
            delta_x: 3,
            ..TapEvent::default()
        };
        assert_eq!(
            resolve(&mouse_frame(&event, Timeval::default())),
            vec![("ABS_X", 100), ("ABS_Y", 20), ("REL_X", 3), ("SYN_REPORT", 0)]
        );
    }

    #[test]
    fn other_buttons_use_button_number() {
        let t = Timeval::default();
        for (button, name, scan) in [(2, "BTN_MIDDLE", 589_827), (3, "BTN_SIDE", 589_828), (4, "BTN_EXTRA", 589_829)] {
            let event = TapEvent {
                event_type: OTHER_MOUSE_DOWN,
                button,
                ..TapEvent::default()
            };
            assert_eq!(resolve(&mouse_frame(&event, t))[..2], [("MSC_SCAN", scan), (name, 1)]);
        }
        let left_up = TapEvent {
            event_type: LEFT_MOUSE_UP,
            ..TapEvent::default()
        };
        assert_eq!(resolve(&mouse_frame(&left_up, t))[1], ("BTN_LEFT", 0));
    }

    #[test]
    fn scroll_maps_both_axes() {
        let event = TapEvent {
            event_type: SCROLL_WHEEL,
            scroll_y: -1,
            scroll_x: 2,
            ..TapEvent::default()
        };
        let frame = resolve(&mouse_frame(&event, Timeval::default()));
        assert_eq!(frame[..2], [("REL_HWHEEL", 2), ("REL_WHEEL", -1)]);
    }
}
