//! Scripted backend shared by the integration tests.
//!
//! Sources are "plugged" by key and fed frames by the test. Unplugging drops
//! the frame sender, which the device sees as its source going away.

#![allow(dead_code)]

use evinput::backends::{Backend, Candidate, Probe, PushDecoder};
use evinput::{CodeTable, DeviceCategory, DeviceManager, InputError, ManagerConfig, RawEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct RigState {
    plugged: Vec<(String, DeviceCategory)>,
    senders: HashMap<String, Sender<Vec<RawEvent>>>,
    denied: Vec<String>,
}

#[derive(Clone, Default)]
pub struct Rig {
    state: Arc<Mutex<RigState>>,
}

impl Rig {
    pub fn plug(&self, key: &str, category: DeviceCategory) {
        self.state.lock().plugged.push((key.to_string(), category));
    }

    pub fn unplug(&self, key: &str) {
        let mut state = self.state.lock();
        state.plugged.retain(|(k, _)| k != key);
        state.senders.remove(key);
    }

    pub fn deny(&self, key: &str) {
        self.state.lock().denied.push(key.to_string());
    }

    pub fn send(&self, key: &str, frame: Vec<RawEvent>) {
        let state = self.state.lock();
        state.senders[key].send(frame).unwrap();
    }

    pub fn manager(&self, config: ManagerConfig) -> DeviceManager {
        DeviceManager::with_backend(
            config,
            Arc::new(CodeTable::evdev()),
            Box::new(RigBackend(self.clone())),
        )
        .unwrap()
    }
}

struct RigBackend(Rig);

impl Backend for RigBackend {
    fn probe(&mut self, known: &dyn Fn(&str) -> bool) -> Probe {
        let mut probe = Probe::default();
        let mut state = self.0.state.lock();
        let plugged = state.plugged.clone();
        for (key, category) in plugged {
            if known(&key) {
                continue;
            }
            let (tx, rx) = mpsc::channel();
            state.senders.insert(key.clone(), tx);
            probe.found.push(Candidate {
                name: format!("Scripted {key}"),
                decoder: Box::new(PushDecoder::new(key.clone(), rx, Duration::from_millis(10))),
                key,
                category,
                path: None,
                rumble: None,
            });
        }
        for key in &state.denied {
            probe.skipped.push((
                key.clone(),
                InputError::PermissionDenied {
                    path: PathBuf::from(key),
                },
            ));
        }
        probe
    }
}

pub fn config() -> ManagerConfig {
    ManagerConfig {
        wait_timeout_ms: 10,
        ..ManagerConfig::default()
    }
}

/// Spin until `cond` holds, failing the test after a few seconds.
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}
