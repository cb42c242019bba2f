//! Windows low-level hook messages, expressed as evdev frames.
//!
//! The hook callbacks (`WH_KEYBOARD_LL`, `WH_MOUSE_LL`) hand over a message
//! identifier plus a small struct. These functions turn one callback into one
//! frame of raw events ending in `SYN_REPORT`. They are pure so the mapping is
//! testable off Windows; the hook thread itself lives in `windows::hooks`.

use crate::codes::CodeTable;
use crate::event::{EventType, RawEvent, Timeval};

pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;

pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_XBUTTONDOWN: u32 = 0x020B;
pub const WM_XBUTTONUP: u32 = 0x020C;
pub const WM_MOUSEHWHEEL: u32 = 0x020E;

/// One notch of a Windows wheel.
const WHEEL_DELTA: i32 = 120;
/// `XBUTTON2` in the high word of `mouseData`.
const XBUTTON2: i32 = 2;

const MSC_SCAN: u16 = 0x04;
const REL_HWHEEL: u16 = 0x06;
const REL_WHEEL: u16 = 0x08;
const ABS_X: u16 = 0x00;
const ABS_Y: u16 = 0x01;

/// Button code and the HID usage reported as its `MSC_SCAN`, matching what
/// Linux reports for USB mice.
const BTN_LEFT: (u16, i32) = (0x110, 589_825);
const BTN_RIGHT: (u16, i32) = (0x111, 589_826);
const BTN_MIDDLE: (u16, i32) = (0x112, 589_827);
const BTN_SIDE: (u16, i32) = (0x113, 589_828);
const BTN_EXTRA: (u16, i32) = (0x114, 589_829);

/// Key state for a keyboard hook message, `None` for anything else.
pub fn key_state(message: u32) -> Option<i32> {
    match message {
        WM_KEYDOWN | WM_SYSKEYDOWN => Some(1),
        WM_KEYUP | WM_SYSKEYUP => Some(0),
        _ => None,
    }
}

/// `MSC_SCAN`, key, `SYN_REPORT` for one `KBDLLHOOKSTRUCT`.
///
/// `None` when the message is not a key transition or the virtual key has no
/// evdev counterpart.
pub fn keyboard_frame(
    codes: &CodeTable,
    message: u32,
    vk_code: u32,
    scan_code: u32,
    time: Timeval,
) -> Option<Vec<RawEvent>> {
    let state = key_state(message)?;
    let key = codes.windows_key(u16::try_from(vk_code).ok()?)?;
    Some(vec![
        RawEvent::new(time, EventType::Misc, MSC_SCAN, scan_code as i32),
        RawEvent::new(time, EventType::Key, key, state),
        RawEvent::sync(time),
    ])
}

/// Frame for one `MSLLHOOKSTRUCT`.
///
/// `mouse_data` is the signed high word of `mouseData`: wheel distance in
/// multiples of 120, or which X button. Every frame carries the cursor
/// position as `ABS_X`/`ABS_Y`. Messages that are none of move, wheel or button
/// (double clicks, non-client messages) yield `None`.
pub fn mouse_frame(message: u32, x: i32, y: i32, mouse_data: i32, time: Timeval) -> Option<Vec<RawEvent>> {
    let mut frame = Vec::with_capacity(5);
    match message {
        WM_MOUSEMOVE => {}
        WM_MOUSEWHEEL => frame.push(RawEvent::new(
            time,
            EventType::Relative,
            REL_WHEEL,
            mouse_data.div_euclid(WHEEL_DELTA),
        )),
        WM_MOUSEHWHEEL => frame.push(RawEvent::new(
            time,
            EventType::Relative,
            REL_HWHEEL,
            mouse_data.div_euclid(WHEEL_DELTA),
        )),
        _ => {
            let ((code, scan), state) = button(message, mouse_data)?;
            frame.push(RawEvent::new(time, EventType::Misc, MSC_SCAN, scan));
            frame.push(RawEvent::new(time, EventType::Key, code, state));
        }
    }
    frame.push(RawEvent::new(time, EventType::Absolute, ABS_X, x));
    frame.push(RawEvent::new(time, EventType::Absolute, ABS_Y, y));
    frame.push(RawEvent::sync(time));
    Some(frame)
}

fn button(message: u32, mouse_data: i32) -> Option<((u16, i32), i32)> {
    let x_button = if mouse_data == XBUTTON2 { BTN_EXTRA } else { BTN_SIDE };
    Some(match message {
        WM_LBUTTONDOWN => (BTN_LEFT, 1),
        WM_LBUTTONUP => (BTN_LEFT, 0),
        WM_RBUTTONDOWN => (BTN_RIGHT, 1),
        WM_RBUTTONUP => (BTN_RIGHT, 0),
        WM_MBUTTONDOWN => (BTN_MIDDLE, 1),
        WM_MBUTTONUP => (BTN_MIDDLE, 0),
        WM_XBUTTONDOWN => (x_button, 1),
        WM_XBUTTONUP => (x_button, 0),
        _ => return None,
    })
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

    #[test]
    fn key_down_and_up() {
        let codes = CodeTable::evdev();
        let t = Timeval::new(1, 0);
        // VK 'A', scan code 0x1e
        let down = keyboard_frame(&codes, WM_KEYDOWN, 0x41, 0x1e, t).unwrap();
        assert_eq!(resolve(&down), vec![("MSC_SCAN", 0x1e), ("KEY_A", 1), ("SYN_REPORT", 0)]);
        let up = keyboard_frame(&codes, WM_SYSKEYUP, 0x41, 0x1e, t).unwrap();
        assert_eq!(resolve(&up)[1], ("KEY_A", 0));
        assert!(keyboard_frame(&codes, WM_MOUSEMOVE, 0x41, 0x1e, t).is_none());
    }

    #[test]
    fn move_reports_position_only() {
        let frame = mouse_frame(WM_MOUSEMOVE, 640, 480, 0, Timeval::default()).unwrap();
        assert_eq!(resolve(&frame), vec![("ABS_X", 640), ("ABS_Y", 480), ("SYN_REPORT", 0)]);
    }

    #[test]
    fn wheel_is_scaled_to_detents() {
        let t = Timeval::default();
        let up = mouse_frame(WM_MOUSEWHEEL, 0, 0, 240, t).unwrap();
        assert_eq!(resolve(&up)[0], ("REL_WHEEL", 2));
        let down = mouse_frame(WM_MOUSEWHEEL, 0, 0, -120, t).unwrap();
        assert_eq!(resolve(&down)[0], ("REL_WHEEL", -1));
        let side = mouse_frame(WM_MOUSEHWHEEL, 0, 0, 120, t).unwrap();
        assert_eq!(resolve(&side)[0], ("REL_HWHEEL", 1));
    }

    #[test]
    fn buttons_carry_scan_and_key() {
        let t = Timeval::default();
        let left = mouse_frame(WM_LBUTTONDOWN, 5, 6, 0, t).unwrap();
        assert_eq!(
            resolve(&left),
            vec![
                ("MSC_SCAN", 589_825),
                ("BTN_LEFT", 1),
                ("ABS_X", 5),
                ("ABS_Y", 6),
                ("SYN_REPORT", 0)
            ]
        );
        let right = mouse_frame(WM_RBUTTONUP, 0, 0, 0, t).unwrap();
        assert_eq!(resolve(&right)[1], ("BTN_RIGHT", 0));
        let middle = mouse_frame(WM_MBUTTONDOWN, 0, 0, 0, t).unwrap();
        assert_eq!(resolve(&middle)[..2], [("MSC_SCAN", 589_827), ("BTN_MIDDLE", 1)]);
    }

    #[test]
    fn x_buttons_split_on_mouse_data() {
        let t = Timeval::default();
        let side = mouse_frame(WM_XBUTTONDOWN, 0, 0, 1, t).unwrap();
        assert_eq!(resolve(&side)[..2], [("MSC_SCAN", 589_828), ("BTN_SIDE", 1)]);
        let extra = mouse_frame(WM_XBUTTONUP, 0, 0, 2, t).unwrap();
        assert_eq!(resolve(&extra)[..2], [("MSC_SCAN", 589_829), ("BTN_EXTRA", 0)]);
    }

    #[test]
    fn double_clicks_are_ignored() {
        assert!(mouse_frame(0x0203, 0, 0, 0, Timeval::default()).is_none());
    }
}
