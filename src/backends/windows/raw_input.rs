//! Raw Input device enumeration.
//!
//! Only used to decide whether a keyboard and a mouse are attached at all; the
//! events themselves come from the low-level hooks.

use windows_sys::Win32::UI::Input::{
    GetRawInputDeviceList, RAWINPUTDEVICELIST, RIM_TYPEKEYBOARD, RIM_TYPEMOUSE,
};

/// Attached device counts by kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attached {
    pub keyboards: usize,
    pub mice: usize,
}

/// Count keyboards and mice known to Raw Input. Failures count as none.
pub fn count_devices() -> Attached {
    let entry = core::mem::size_of::<RAWINPUTDEVICELIST>() as u32;
    let mut attached = Attached::default();
    unsafe {
        // Query count
        let mut count: u32 = 0;
        if GetRawInputDeviceList(core::ptr::null_mut(), &mut count, entry) == u32::MAX || count == 0 {
            return attached;
        }

        let mut list: Vec<RAWINPUTDEVICELIST> = vec![core::mem::zeroed(); count as usize];
        let got = GetRawInputDeviceList(list.as_mut_ptr(), &mut count, entry);
        if got == u32::MAX {
            return attached;
        }
        list.truncate(got as usize);

        for device in &list {
            match device.dwType {
                RIM_TYPEKEYBOARD => attached.keyboards += 1,
                RIM_TYPEMOUSE => attached.mice += 1,
                _ => {}
            }
        }
    }
    attached
}
