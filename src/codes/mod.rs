//! Code table: `(event type, raw code)` ⇄ normalized name.
//!
//! The table is loaded once, wrapped in an `Arc`, and shared read-only by every
//! capture task. [`CodeTable::evdev`] carries the Linux names plus the key
//! translation tables the Windows and macOS backends need to express their
//! native key numbers as evdev key codes.

mod tables;

use crate::event::EventType;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
struct TypeCodes {
    by_code: HashMap<u16, &'static str>,
    by_name: HashMap<&'static str, u16>,
}

impl TypeCodes {
    fn insert(&mut self, code: u16, name: &'static str) {
        // Aliases are listed generic first; the last, most specific name wins.
        self.by_code.insert(code, name);
        self.by_name.insert(name, code);
    }
}

/// Read-only mapping between platform numbers and human-meaningful names.
#[derive(Clone, Debug, Default)]
pub struct CodeTable {
    types: HashMap<EventType, TypeCodes>,
    windows_vk: HashMap<u16, u16>,
    mac_keys: HashMap<u16, u16>,
}

impl CodeTable {
    /// Empty table. Every lookup fails until entries are inserted.
    pub fn new() -> Self {
        Self::default()
    }

    /// The full Linux evdev table.
    pub fn evdev() -> Self {
        let mut table = Self::new();
        let sets: [(EventType, &[(u16, &'static str)]); 9] = [
            (EventType::Sync, tables::SYNC),
            (EventType::Key, tables::KEYS),
            (EventType::Relative, tables::RELATIVE),
            (EventType::Absolute, tables::ABSOLUTE),
            (EventType::Misc, tables::MISC),
            (EventType::Switch, tables::SWITCH),
            (EventType::Led, tables::LEDS),
            (EventType::Sound, tables::SOUNDS),
            (EventType::Repeat, tables::REPEAT),
        ];
        for (ty, entries) in sets {
            for &(code, name) in entries {
                table.insert(ty, code, name);
            }
        }
        table.windows_vk = tables::WINDOWS_VK.iter().copied().collect();
        table.mac_keys = tables::MAC_KEYCODES.iter().copied().collect();
        table
    }

    /// Add (or alias) one entry.
    pub fn insert(&mut self, ev_type: EventType, code: u16, name: &'static str) {
        self.types.entry(ev_type).or_default().insert(code, name);
    }

    pub fn lookup(&self, ev_type: EventType, code: u16) -> Option<&'static str> {
        self.types.get(&ev_type)?.by_code.get(&code).copied()
    }

    pub fn reverse_lookup(&self, ev_type: EventType, name: &str) -> Option<u16> {
        self.types.get(&ev_type)?.by_name.get(name).copied()
    }

    /// Number of distinct codes known for `ev_type`.
    pub fn len(&self, ev_type: EventType) -> usize {
        self.types.get(&ev_type).map_or(0, |t| t.by_code.len())
    }

    /// Windows virtual-key code → evdev key code.
    pub fn windows_key(&self, vk: u16) -> Option<u16> {
        self.windows_vk.get(&vk).copied()
    }

    /// macOS virtual keycode (`kVK_*`) → evdev key code.
    pub fn mac_key(&self, keycode: u16) -> Option<u16> {
        self.mac_keys.get(&keycode).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_name_round_trips() {
        let table = CodeTable::evdev();
        let sets: [(EventType, &[(u16, &'static str)]); 4] = [
            (EventType::Key, tables::KEYS),
            (EventType::Absolute, tables::ABSOLUTE),
            (EventType::Relative, tables::RELATIVE),
            (EventType::Misc, tables::MISC),
        ];
        for (ty, entries) in sets {
            for &(code, name) in entries {
                let back = table.reverse_lookup(ty, name).unwrap();
                assert_eq!(back, code, "{name}");
                // Aliases resolve to a name that maps back to the same code.
                let canonical = table.lookup(ty, code).unwrap();
                assert_eq!(table.reverse_lookup(ty, canonical), Some(code));
            }
        }
    }

    #[test]
    fn common_codes() {
        let table = CodeTable::evdev();
        assert_eq!(table.lookup(EventType::Sync, 0), Some("SYN_REPORT"));
        assert_eq!(table.lookup(EventType::Key, 30), Some("KEY_A"));
        assert_eq!(table.lookup(EventType::Key, 0x110), Some("BTN_LEFT"));
        assert_eq!(table.lookup(EventType::Key, 0x130), Some("BTN_SOUTH"));
        assert_eq!(table.reverse_lookup(EventType::Key, "BTN_GAMEPAD"), Some(0x130));
        assert_eq!(table.lookup(EventType::Relative, 0x08), Some("REL_WHEEL"));
        assert_eq!(table.lookup(EventType::Absolute, 0x10), Some("ABS_HAT0X"));
        assert_eq!(table.lookup(EventType::Misc, 0x04), Some("MSC_SCAN"));
        assert_eq!(table.reverse_lookup(EventType::Key, "BTN_TRIGGER_HAPPY40"), Some(0x2e7));
        assert_eq!(table.lookup(EventType::Key, 0x3ff), None);
        assert_eq!(table.lookup(EventType::Power, 0), None);
    }

    #[test]
    fn platform_key_translation() {
        let table = CodeTable::evdev();
        // VK_RETURN → KEY_ENTER, VK_SHIFT → KEY_LEFTSHIFT
        assert_eq!(table.windows_key(0x0D), Some(28));
        assert_eq!(table.windows_key(0x10), Some(42));
        // kVK_ANSI_A → KEY_A, kVK_ANSI_D → KEY_D
        assert_eq!(table.mac_key(0x00), Some(30));
        assert_eq!(table.mac_key(0x02), Some(32));
    }

    #[test]
    fn custom_entries() {
        let mut table = CodeTable::new();
        assert_eq!(table.lookup(EventType::Key, 1), None);
        table.insert(EventType::Key, 1, "KEY_ESC");
        assert_eq!(table.lookup(EventType::Key, 1), Some("KEY_ESC"));
        assert_eq!(table.len(EventType::Key), 1);
    }
}
