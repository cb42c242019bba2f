//! Input backends for `evinput`.
//!
//! A backend does two jobs:
//! - **discovery**: [`Backend::probe`] lists the input sources the platform
//!   currently exposes, each with a category and a ready-to-run [`Decoder`];
//! - **decoding**: a [`Decoder`] turns raw OS data into canonical events, one
//!   frame at a time, on the device's capture thread.
//!
//! The decoder family is closed and chosen once per device at discovery:
//! - [`evdev::EvdevDecoder`]: fixed-size binary records from a Linux device node
//! - [`xinput::XInputDecoder`]: polled controller state, diffed against the last poll
//! - [`PushDecoder`]: frames pushed by an OS callback thread (Windows low-level
//!   hooks, macOS event taps)
//!
//! Gamepads that can vibrate also carry a [`Rumble`] output.
//!
//! Platform glue lives in `linux`, `windows` and `macos`; the decoding rules in
//! `evdev`, `xinput`, `winhook` and `quartz` and the force-feedback encoding in
//! `rumble` are plain functions that build and test on every host.

pub mod evdev;
pub mod quartz;
pub mod rumble;
pub mod winhook;
pub mod xinput;

#[cfg(target_os = "linux")]
#[cfg_attr(docsrs, doc(cfg(target_os = "linux")))]
pub mod linux;

#[cfg(target_os = "windows")]
#[cfg_attr(docsrs, doc(cfg(target_os = "windows")))]
pub mod windows;

#[cfg(target_os = "macos")]
#[cfg_attr(docsrs, doc(cfg(target_os = "macos")))]
pub mod macos;

use crate::codes::CodeTable;
use crate::config::ManagerConfig;
use crate::device::{DeviceCategory, DeviceId};
use crate::error::{InputError, Result};
use crate::event::{InputEvent, RawEvent, Timeval};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use rumble::Rumble;

/// Capability shared by every decoder variant.
pub trait Decoder: Send {
    /// Wait (bounded) for the next chunk of raw data and decode it.
    ///
    /// - `Ok(events)`: zero or more events in receipt order. Empty means the
    ///   wait timed out; the capture loop checks its stop signal and calls again.
    /// - `Err(DeviceGone)`: end of stream; the device turns inactive.
    /// - any other `Err` is logged and capture continues.
    fn decode_next(&mut self, normalizer: &mut Normalizer) -> Result<Vec<InputEvent>>;
}

/// Per-device raw → canonical conversion.
///
/// Resolves codes through the shared [`CodeTable`], keeps timestamps
/// non-decreasing, and skips records that do not resolve.
pub struct Normalizer {
    device: DeviceId,
    codes: Arc<CodeTable>,
    last: Timeval,
    skipped: u64,
}

impl Normalizer {
    pub fn new(device: DeviceId, codes: Arc<CodeTable>) -> Self {
        Self {
            device,
            codes,
            last: Timeval::default(),
            skipped: 0,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn codes(&self) -> &CodeTable {
        &self.codes
    }

    /// Records discarded as malformed so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn normalize(&mut self, mut raw: RawEvent) -> Result<InputEvent> {
        if raw.time < self.last {
            raw.time = self.last;
        }
        let event = InputEvent::new(&self.codes, self.device, raw)?;
        self.last = event.timestamp;
        Ok(event)
    }

    /// Normalize a run of records, dropping (and logging) the malformed ones.
    pub fn normalize_all(&mut self, raws: impl IntoIterator<Item = RawEvent>) -> Vec<InputEvent> {
        let mut out = Vec::new();
        for raw in raws {
            match self.normalize(raw) {
                Ok(event) => out.push(event),
                Err(e) => {
                    self.skipped += 1;
                    debug!(device = %self.device, "skipping record: {e}");
                }
            }
        }
        out
    }
}

/// Decoder fed by an OS callback thread through a channel.
///
/// Each message is one already-mapped frame of raw events. The optional guard
/// owns whatever keeps the callback alive (hook thread, run loop); dropping the
/// decoder drops the guard, which tears the callback down.
pub struct PushDecoder {
    frames: Receiver<Vec<RawEvent>>,
    wait: Duration,
    label: String,
    _guard: Option<Box<dyn Send>>,
}

impl PushDecoder {
    pub fn new(label: impl Into<String>, frames: Receiver<Vec<RawEvent>>, wait: Duration) -> Self {
        Self {
            frames,
            wait,
            label: label.into(),
            _guard: None,
        }
    }

    pub fn with_guard(mut self, guard: impl Send + 'static) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }
}

impl Decoder for PushDecoder {
    fn decode_next(&mut self, normalizer: &mut Normalizer) -> Result<Vec<InputEvent>> {
        match self.frames.recv_timeout(self.wait) {
            Ok(frame) => {
                let mut events = normalizer.normalize_all(frame);
                // Coalesce whatever else already arrived into the same batch.
                while let Ok(frame) = self.frames.try_recv() {
                    events.extend(normalizer.normalize_all(frame));
                }
                Ok(events)
            }
            Err(RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                Err(InputError::DeviceGone(format!("{}: source closed", self.label)))
            }
        }
    }
}

/// A source found by [`Backend::probe`], ready to be wrapped as a device.
pub struct Candidate {
    /// De-duplication key (see [`DeviceInfo::key`](crate::metadata::DeviceInfo::key)).
    pub key: String,
    pub name: String,
    pub category: DeviceCategory,
    pub path: Option<String>,
    pub decoder: Box<dyn Decoder>,
    /// Force-feedback output, for sources that have one.
    pub rumble: Option<Box<dyn Rumble>>,
}

/// Outcome of one discovery pass.
#[derive(Default)]
pub struct Probe {
    pub found: Vec<Candidate>,
    /// Sources that exist but could not be opened, keyed like [`Candidate::key`].
    pub skipped: Vec<(String, InputError)>,
}

/// Platform discovery.
pub trait Backend: Send {
    /// Enumerate current sources. `known(key)` is `true` for sources the caller
    /// already has attached; those must not be opened again.
    fn probe(&mut self, known: &dyn Fn(&str) -> bool) -> Probe;
}

/// Backend for hosts with no supported input API. Finds nothing.
#[derive(Debug, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn probe(&mut self, _known: &dyn Fn(&str) -> bool) -> Probe {
        Probe::default()
    }
}

/// The backend for the platform this crate was built for.
#[cfg(target_os = "linux")]
pub fn native(config: &ManagerConfig, _codes: Arc<CodeTable>) -> Box<dyn Backend> {
    Box::new(linux::LinuxBackend::new(config))
}

/// The backend for the platform this crate was built for.
#[cfg(target_os = "windows")]
pub fn native(config: &ManagerConfig, codes: Arc<CodeTable>) -> Box<dyn Backend> {
    Box::new(windows::WindowsBackend::new(config, codes))
}

/// The backend for the platform this crate was built for.
#[cfg(target_os = "macos")]
pub fn native(config: &ManagerConfig, codes: Arc<CodeTable>) -> Box<dyn Backend> {
    Box::new(macos::MacBackend::new(config, codes))
}

/// The backend for the platform this crate was built for.
#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
pub fn native(_config: &ManagerConfig, _codes: Arc<CodeTable>) -> Box<dyn Backend> {
    Box::new(NullBackend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use std::sync::mpsc;

    fn normalizer() -> Normalizer {
        Normalizer::new(DeviceId(1), Arc::new(CodeTable::evdev()))
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let mut norm = normalizer();
        let late = RawEvent::new(Timeval::new(5, 0), EventType::Key, 30, 1);
        let early = RawEvent::new(Timeval::new(4, 999_999), EventType::Key, 30, 0);
        let a = norm.normalize(late).unwrap();
        let b = norm.normalize(early).unwrap();
        assert_eq!(a.timestamp, Timeval::new(5, 0));
        assert_eq!(b.timestamp, Timeval::new(5, 0));
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let mut norm = normalizer();
        let t = Timeval::new(1, 0);
        let events = norm.normalize_all([
            RawEvent::new(t, EventType::Key, 30, 1),
            RawEvent { time: t, ev_type: 0x0b, code: 0, value: 0 },
            RawEvent::sync(t),
        ]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].code, "KEY_A");
        assert!(events[1].is_sync());
        assert_eq!(norm.skipped(), 1);
    }

    #[test]
    fn push_decoder_batches_and_reports_gone() {
        let (tx, rx) = mpsc::channel();
        let mut decoder = PushDecoder::new("test", rx, Duration::from_millis(10));
        let mut norm = normalizer();
        assert!(decoder.decode_next(&mut norm).unwrap().is_empty());

        let t = Timeval::new(1, 0);
        tx.send(vec![RawEvent::new(t, EventType::Key, 30, 1), RawEvent::sync(t)]).unwrap();
        tx.send(vec![RawEvent::new(t, EventType::Key, 30, 0), RawEvent::sync(t)]).unwrap();
        let events = decoder.decode_next(&mut norm).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[2].state, 0);

        drop(tx);
        assert!(decoder.decode_next(&mut norm).unwrap_err().is_gone());
    }

    #[test]
    fn null_backend_finds_nothing() {
        let probe = NullBackend.probe(&|_| false);
        assert!(probe.found.is_empty());
        assert!(probe.skipped.is_empty());
    }
}
