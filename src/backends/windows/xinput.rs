//! XInput slot access.
//!
//! Many Xbox-style controllers show up both as a HID interface and as an
//! XInput slot (0–3). Only the XInput side is used: it gives stable
//! slot-based polling and a standardized button layout. The same slot drives
//! the controller's two rumble motors.

use crate::backends::rumble::Motors;
use crate::backends::xinput::{GamepadState, StateSource};
use crate::error::{InputError, Result};
use windows_sys::Win32::Foundation::{ERROR_DEVICE_NOT_CONNECTED, ERROR_SUCCESS};
use windows_sys::Win32::UI::Input::XboxController::{
    XInputGetState, XInputSetState, XINPUT_STATE, XINPUT_VIBRATION,
};

fn get_state(slot: u32) -> std::result::Result<XINPUT_STATE, u32> {
    // FFI struct: must be zeroed before the call.
    let mut state: XINPUT_STATE = unsafe { std::mem::zeroed() };
    let rc = unsafe { XInputGetState(slot, &mut state) };
    if rc == ERROR_SUCCESS {
        Ok(state)
    } else {
        Err(rc)
    }
}

/// `true` when a controller currently occupies `slot`.
pub fn connected(slot: u32) -> bool {
    get_state(slot).is_ok()
}

/// [`StateSource`] over one XInput slot.
pub struct XInputSlot {
    slot: u32,
}

impl XInputSlot {
    pub fn new(slot: u32) -> Self {
        Self { slot }
    }
}

impl StateSource for XInputSlot {
    fn get_state(&mut self) -> Result<Option<GamepadState>> {
        match get_state(self.slot) {
            Ok(state) => {
                let gp = state.Gamepad;
                Ok(Some(GamepadState {
                    packet_number: state.dwPacketNumber,
                    buttons: gp.wButtons as u16,
                    left_trigger: gp.bLeftTrigger,
                    right_trigger: gp.bRightTrigger,
                    thumb_lx: gp.sThumbLX,
                    thumb_ly: gp.sThumbLY,
                    thumb_rx: gp.sThumbRX,
                    thumb_ry: gp.sThumbRY,
                }))
            }
            Err(ERROR_DEVICE_NOT_CONNECTED) => Ok(None),
            Err(code) => Err(InputError::Io(std::io::Error::from_raw_os_error(code as i32))),
        }
    }
}

/// Rumble motors of one XInput slot.
pub struct XInputMotors {
    slot: u32,
}

impl XInputMotors {
    pub fn new(slot: u32) -> Self {
        Self { slot }
    }
}

impl Motors for XInputMotors {
    fn set(&mut self, strong: u16, weak: u16) -> Result<()> {
        let mut vibration = XINPUT_VIBRATION {
            wLeftMotorSpeed: strong,
            wRightMotorSpeed: weak,
        };
        match unsafe { XInputSetState(self.slot, &mut vibration) } {
            ERROR_SUCCESS => Ok(()),
            ERROR_DEVICE_NOT_CONNECTED => Err(InputError::DeviceGone(format!("XInput slot {}", self.slot))),
            code => Err(InputError::Io(std::io::Error::from_raw_os_error(code as i32))),
        }
    }
}
