//! Linux evdev discovery and capture.
//!
//! udev publishes stable links such as
//! `/dev/input/by-id/usb-Logitech_USB_Receiver-if01-event-mouse`; the suffix
//! after `-event-` classifies the device. Several links can point at the same
//! `eventN` node, so candidates are de-duplicated by their resolved path.
//!
//! A few platform devices get no by-id/by-path link at all. They are matched
//! by the name the kernel publishes in sysfs and given a pseudo-path that
//! carries the classification.
//!
//! Gamepads get a [`NodeRumble`] that opens the node for writing on first use.

use super::evdev::{encode_record, EvdevDecoder};
use super::rumble::{self, Rumble};
use super::{Backend, Candidate, Probe};
use crate::config::ManagerConfig;
use crate::device::DeviceCategory;
use crate::error::{InputError, Result};
use crate::event::Timeval;
use crate::metadata::PathInfo;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

const UNKNOWN_NAME: &str = "Unknown Device";

/// Kernel device name → pseudo-path used to classify it.
const SPECIAL_DEVICES: [(&str, &str); 3] = [
    (
        "Raspberry Pi Sense HAT Joystick",
        "/dev/input/by-id/gpio-Raspberry_Pi_Sense_HAT_Joystick-event-kbd",
    ),
    (
        "Nintendo Wii Remote",
        "/dev/input/by-id/bluetooth-Nintendo_Wii_Remote-event-joystick",
    ),
    (
        "FT5406 memory based driver",
        "/dev/input/by-id/gpio-Raspberry_Pi_Touchscreen_Display-event-mouse",
    ),
];

/// Discovery over `/dev/input` and `/sys/class/input`.
pub struct LinuxBackend {
    input_dir: PathBuf,
    sysfs_dir: PathBuf,
    search: Vec<String>,
    wait: Duration,
    batch: usize,
}

/// A node to consider: where it is opened from and what it is reported as.
struct Found {
    node: PathBuf,
    path: String,
    category: DeviceCategory,
}

impl LinuxBackend {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            input_dir: config.linux.input_dir.clone(),
            sysfs_dir: config.linux.sysfs_dir.clone(),
            search: config.linux.search.clone(),
            wait: config.wait_timeout(),
            batch: config.read_batch,
        }
    }

    /// `*-event-*` links from each search directory, each directory sorted.
    fn linked(&self) -> Vec<Found> {
        let mut out = Vec::new();
        for sub in &self.search {
            let dir = self.input_dir.join(sub);
            let Ok(entries) = fs::read_dir(&dir) else {
                trace!(dir = %dir.display(), "not present");
                continue;
            };
            let mut links: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| file_name(p).is_some_and(|n| n.contains("-event-")))
                .collect();
            links.sort();
            for link in links {
                let path = link.to_string_lossy().into_owned();
                let category = PathInfo::parse(&path).map_or(DeviceCategory::Other, |p| p.category());
                out.push(Found { node: link, path, category });
            }
        }
        out
    }

    /// Special devices, found by their sysfs name.
    fn special(&self) -> Vec<Found> {
        let Ok(entries) = fs::read_dir(&self.sysfs_dir) else {
            return Vec::new();
        };
        let mut events: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.starts_with("event"))
            .collect();
        events.sort();

        let mut out = Vec::new();
        for event in events {
            let Some(name) = self.sysfs_name(&event) else { continue };
            let Some((_, pseudo)) = SPECIAL_DEVICES.iter().find(|(n, _)| *n == name) else {
                continue;
            };
            let category = PathInfo::parse(pseudo).map_or(DeviceCategory::Other, |p| p.category());
            out.push(Found {
                node: self.input_dir.join(&event),
                path: (*pseudo).to_string(),
                category,
            });
        }
        out
    }

    /// `<sysfs>/<eventN>/device/name`, trimmed.
    fn sysfs_name(&self, event: &str) -> Option<String> {
        let raw = fs::read_to_string(self.sysfs_dir.join(event).join("device").join("name")).ok()?;
        let name = raw.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

impl Backend for LinuxBackend {
    fn probe(&mut self, known: &dyn Fn(&str) -> bool) -> Probe {
        let mut probe = Probe::default();
        let mut seen = HashSet::new();

        for found in self.linked().into_iter().chain(self.special()) {
            let Ok(real) = fs::canonicalize(&found.node) else {
                trace!(path = %found.path, "dangling link");
                continue;
            };
            let key = real.to_string_lossy().into_owned();
            if known(&key) || !seen.insert(key.clone()) {
                continue;
            }

            let name = file_name(&real)
                .and_then(|event| self.sysfs_name(event))
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());

            match EventFile::open(&real, self.wait) {
                Ok(file) => {
                    debug!(path = %found.path, node = %key, %name, "found {}", found.category);
                    let decoder = EvdevDecoder::new(key.clone(), file, self.batch);
                    let rumble = (found.category == DeviceCategory::Gamepad)
                        .then(|| Box::new(NodeRumble::new(real.clone())) as Box<dyn Rumble>);
                    probe.found.push(Candidate {
                        key,
                        name,
                        category: found.category,
                        path: Some(found.path),
                        decoder: Box::new(decoder),
                        rumble,
                    });
                }
                Err(e) => probe.skipped.push((key, e)),
            }
        }
        probe
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}

/// An open device node whose reads wait at most `wait` for data.
///
/// A read that times out fails with [`io::ErrorKind::TimedOut`]; a node that
/// went away fails with `ENODEV`.
pub struct EventFile {
    file: File,
    wait_ms: libc::c_int,
}

impl EventFile {
    pub fn open(path: &Path, wait: Duration) -> Result<Self> {
        let file = File::open(path).map_err(|e| InputError::from_open(path, e))?;
        Ok(Self {
            file,
            wait_ms: libc::c_int::try_from(wait.as_millis()).unwrap_or(libc::c_int::MAX),
        })
    }
}

impl Read for EventFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, self.wait_ms) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        if rc == 0 {
            return Err(io::ErrorKind::TimedOut.into());
        }
        if pfd.revents & libc::POLLNVAL != 0
            || (pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 && pfd.revents & libc::POLLIN == 0)
        {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }
        self.file.read(buf)
    }
}

/// Force feedback through a device node's `EV_FF` interface.
///
/// One rumble effect is uploaded per node and re-uploaded in place on every
/// request. Closing the node erases it.
pub struct NodeRumble {
    node: PathBuf,
    file: Option<File>,
    effect: i16,
}

impl NodeRumble {
    pub fn new(node: PathBuf) -> Self {
        Self { node, file: None, effect: -1 }
    }

    fn file(&mut self) -> Result<&mut File> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .write(true)
                .open(&self.node)
                .map_err(|e| InputError::from_open(&self.node, e))?,
        };
        Ok(self.file.insert(file))
    }

    fn play(&mut self, play: bool) -> Result<()> {
        let record = encode_record(&rumble::play_record(self.effect, play, Timeval::now())?);
        let node = self.node.clone();
        self.file()?.write_all(&record).map_err(|e| gone_or_io(&node, e))
    }
}

impl Rumble for NodeRumble {
    fn rumble(&mut self, strong: u16, weak: u16, duration: Duration) -> Result<()> {
        if rumble::is_stop(strong, weak, duration) {
            return if self.effect < 0 { Ok(()) } else { self.play(false) };
        }
        let mut effect = rumble::encode_rumble_effect(self.effect, strong, weak, duration);
        let node = self.node.clone();
        let fd = self.file()?.as_raw_fd();
        let rc = unsafe { libc::ioctl(fd, rumble::eviocsff() as _, effect.as_mut_ptr()) };
        if rc < 0 {
            return Err(gone_or_io(&node, io::Error::last_os_error()));
        }
        self.effect = rumble::effect_id(&effect);
        trace!(node = %node.display(), effect = self.effect, "rumble effect uploaded");
        self.play(true)
    }
}

fn gone_or_io(node: &Path, err: io::Error) -> InputError {
    if err.raw_os_error() == Some(libc::ENODEV) {
        InputError::DeviceGone(node.display().to_string())
    } else {
        InputError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Normalizer;
    use crate::backends::evdev::encode_record;
    use crate::codes::CodeTable;
    use crate::config::LinuxConfig;
    use crate::device::DeviceId;
    use crate::event::{EventType, RawEvent, Timeval};
    use std::os::unix::fs::symlink;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Tree {
        _root: TempDir,
        config: ManagerConfig,
    }

    impl Tree {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let input_dir = root.path().join("input");
            let sysfs_dir = root.path().join("sys");
            for dir in ["by-id", "by-path"] {
                fs::create_dir_all(input_dir.join(dir)).unwrap();
            }
            fs::create_dir_all(&sysfs_dir).unwrap();
            let config = ManagerConfig {
                wait_timeout_ms: 10,
                linux: LinuxConfig {
                    input_dir,
                    sysfs_dir,
                    ..LinuxConfig::default()
                },
                ..ManagerConfig::default()
            };
            Self { _root: root, config }
        }

        /// Create `eventN` with `contents` and a sysfs name.
        fn node(&self, event: &str, name: Option<&str>, contents: &[u8]) -> PathBuf {
            let node = self.config.linux.input_dir.join(event);
            fs::write(&node, contents).unwrap();
            let dev = self.config.linux.sysfs_dir.join(event).join("device");
            fs::create_dir_all(&dev).unwrap();
            if let Some(name) = name {
                fs::write(dev.join("name"), format!("{name}\n")).unwrap();
            }
            node
        }

        fn link(&self, dir: &str, link: &str, event: &str) {
            let target = self.config.linux.input_dir.join(event);
            symlink(target, self.config.linux.input_dir.join(dir).join(link)).unwrap();
        }

        fn backend(&self) -> LinuxBackend {
            LinuxBackend::new(&self.config)
        }
    }

    #[test]
    fn classifies_and_dedupes_links() {
        let tree = Tree::new();
        tree.node("event0", Some("AT Translated Set 2 keyboard"), b"");
        tree.node("event1", Some("Logitech USB Receiver"), b"");
        tree.node("event2", None, b"");
        tree.link("by-path", "platform-i8042-serio-0-event-kbd", "event0");
        tree.link("by-id", "usb-Logitech_USB_Receiver-if01-event-mouse", "event1");
        tree.link("by-path", "pci-0000:00:14.0-usb-0:2:1.1-event-mouse", "event1");
        tree.link("by-id", "usb-Microsoft_Controller-event-joystick", "event2");
        tree.link("by-id", "usb-Logitech_USB_Receiver-if01-mouse", "event1");

        let probe = tree.backend().probe(&|_| false);
        assert!(probe.skipped.is_empty());
        let mut found: Vec<_> = probe
            .found
            .iter()
            .map(|c| (c.name.as_str(), c.category))
            .collect();
        found.sort_by_key(|(name, _)| name.to_string());
        assert_eq!(
            found,
            vec![
                ("AT Translated Set 2 keyboard", DeviceCategory::Keyboard),
                ("Logitech USB Receiver", DeviceCategory::Mouse),
                ("Unknown Device", DeviceCategory::Gamepad),
            ]
        );
        // by-id is searched first, so the mouse is reported under its by-id link.
        let mouse = probe.found.iter().find(|c| c.category == DeviceCategory::Mouse).unwrap();
        assert!(mouse.path.as_deref().unwrap().contains("/by-id/"));
        assert!(mouse.key.ends_with("/event1"));
    }

    #[test]
    fn known_keys_are_not_reopened() {
        let tree = Tree::new();
        tree.node("event0", Some("kbd"), b"");
        tree.node("event1", Some("mouse"), b"");
        tree.link("by-id", "usb-A-event-kbd", "event0");
        tree.link("by-id", "usb-B-event-mouse", "event1");

        let first = tree.backend().probe(&|_| false);
        let keys: HashSet<String> = first.found.iter().map(|c| c.key.clone()).collect();
        assert_eq!(keys.len(), 2);
        let second = tree.backend().probe(&|key| keys.contains(key));
        assert!(second.found.is_empty());
    }

    #[test]
    fn special_devices_are_found_by_sysfs_name() {
        let tree = Tree::new();
        tree.node("event4", Some("Nintendo Wii Remote"), b"");
        tree.node("event5", Some("Raspberry Pi Sense HAT Joystick"), b"");
        tree.node("event6", Some("Some Other Thing"), b"");

        let probe = tree.backend().probe(&|_| false);
        let mut found: Vec<_> = probe.found.iter().map(|c| (c.name.as_str(), c.category)).collect();
        found.sort_by_key(|(name, _)| name.to_string());
        assert_eq!(
            found,
            vec![
                ("Nintendo Wii Remote", DeviceCategory::Gamepad),
                ("Raspberry Pi Sense HAT Joystick", DeviceCategory::Keyboard),
            ]
        );
    }

    #[test]
    fn dangling_links_and_missing_dirs_are_ignored() {
        let tree = Tree::new();
        tree.link("by-id", "usb-Gone-event-kbd", "event9");
        let mut config = tree.config.clone();
        config.linux.search.push("nowhere".into());
        let probe = LinuxBackend::new(&config).probe(&|_| false);
        assert!(probe.found.is_empty());
        assert!(probe.skipped.is_empty());
    }

    #[test]
    fn captures_records_from_node_until_end() {
        let tree = Tree::new();
        let t = Timeval::new(42, 0);
        let bytes: Vec<u8> = [
            RawEvent::new(t, EventType::Misc, 0x04, 458_756),
            RawEvent::new(t, EventType::Key, 30, 1),
            RawEvent::sync(t),
        ]
        .iter()
        .flat_map(encode_record)
        .collect();
        tree.node("event0", Some("kbd"), &bytes);
        tree.link("by-id", "usb-Kbd-event-kbd", "event0");

        let mut probe = tree.backend().probe(&|_| false);
        let mut candidate = probe.found.pop().unwrap();
        let mut norm = Normalizer::new(DeviceId(0), Arc::new(CodeTable::evdev()));
        let events = candidate.decoder.decode_next(&mut norm).unwrap();
        let codes: Vec<_> = events.iter().map(|e| e.code).collect();
        assert_eq!(codes, ["MSC_SCAN", "KEY_A", "SYN_REPORT"]);
        assert!(candidate.decoder.decode_next(&mut norm).unwrap_err().is_gone());
    }

    #[test]
    fn only_gamepads_get_force_feedback() {
        let tree = Tree::new();
        tree.node("event0", Some("kbd"), b"");
        tree.node("event1", Some("pad"), b"");
        tree.link("by-id", "usb-Kbd-event-kbd", "event0");
        tree.link("by-id", "usb-Pad-event-joystick", "event1");

        let probe = tree.backend().probe(&|_| false);
        for candidate in &probe.found {
            let expected = candidate.category == DeviceCategory::Gamepad;
            assert_eq!(candidate.rumble.is_some(), expected, "{}", candidate.name);
        }
    }

    #[test]
    fn rumble_on_a_node_without_force_feedback_fails() {
        let tree = Tree::new();
        let node = tree.node("event3", Some("pad"), b"");
        let mut rumble = NodeRumble::new(node);
        // Stopping before anything was uploaded does not touch the node.
        rumble.rumble(0, 0, Duration::from_secs(1)).unwrap();
        // A regular file rejects the effect upload ioctl.
        let err = rumble.rumble(100, 100, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, InputError::Io(_)));

        let missing = tree.config.linux.input_dir.join("event99");
        let err = NodeRumble::new(missing).rumble(1, 1, Duration::from_secs(1)).unwrap_err();
        assert!(!err.is_gone());
    }
}
