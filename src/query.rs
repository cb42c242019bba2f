//! Category-level blocking reads.
//!
//! Each function resolves the first active device of its category (discovery
//! order) and blocks in its [`InputDevice::read`](crate::device::InputDevice::read).
//! With no such device they fail with [`InputError::NoSuchDevice`] instead of
//! blocking, so "no device" and "no event yet" stay distinguishable.

use crate::device::DeviceCategory;
use crate::error::{InputError, Result};
use crate::event::InputEvent;
use crate::manager::DeviceManager;

/// Block for the next batch from the first gamepad.
pub fn get_gamepad(manager: &DeviceManager) -> Result<Vec<InputEvent>> {
    read_first(manager, DeviceCategory::Gamepad)
}

/// Block for the next batch from the first keyboard.
pub fn get_key(manager: &DeviceManager) -> Result<Vec<InputEvent>> {
    read_first(manager, DeviceCategory::Keyboard)
}

/// Block for the next batch from the first mouse.
pub fn get_mouse(manager: &DeviceManager) -> Result<Vec<InputEvent>> {
    read_first(manager, DeviceCategory::Mouse)
}

fn read_first(manager: &DeviceManager, category: DeviceCategory) -> Result<Vec<InputEvent>> {
    let device = manager
        .first_active(category)
        .ok_or(InputError::NoSuchDevice(category))?;
    device.read()
}
