//! Device discovery and ownership.
//!
//! [`DeviceManager`] is the root object: it owns the platform [`Backend`], the
//! shared [`CodeTable`] and every attached [`InputDevice`]. Devices are kept in
//! discovery order; per-category views are filtered from that one sequence,
//! so a device appears once overall and once in its category.
//!
//! Discovery is eager at construction and can be re-run with
//! [`DeviceManager::discover`] to pick up hot-attached hardware. Re-running is
//! idempotent: sources whose key is already attached are not reopened.
//! Devices that went inactive since the last pass are pruned first, so a
//! re-plugged device comes back under a fresh [`DeviceId`].
//!
//! ```no_run
//! use evinput::{DeviceManager, Result};
//!
//! fn main() -> Result<()> {
//!     let manager = DeviceManager::new()?;
//!     for device in manager.devices() {
//!         println!("{} ({}, {})", device.name(), device.id(), device.category());
//!     }
//!     Ok(())
//! }
//! ```

use crate::backends::{self, Backend};
use crate::codes::CodeTable;
use crate::config::ManagerConfig;
use crate::device::{DeviceCategory, DeviceId, InputDevice};
use crate::error::{InputError, Result};
use crate::metadata::{DeviceInfo, PathInfo};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one [`DeviceManager::discover`] pass changed.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Newly attached devices, in discovery order.
    pub added: Vec<DeviceId>,
    /// Inactive devices pruned before probing.
    pub removed: Vec<DeviceId>,
    /// Sources that could not be opened, keyed by source key. A source is
    /// listed here on its first failure only.
    pub skipped: Vec<(String, InputError)>,
}

impl DiscoveryReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Default)]
struct Registry {
    devices: Vec<Arc<InputDevice>>,
    next_id: u32,
}

/// Owner of every attached input device.
pub struct DeviceManager {
    config: ManagerConfig,
    codes: Arc<CodeTable>,
    backend: Mutex<Box<dyn Backend>>,
    registry: RwLock<Registry>,
    /// Source keys whose open failure was already reported.
    reported: Mutex<HashSet<String>>,
}

impl DeviceManager {
    /// Default configuration, native backend, initial discovery.
    pub fn new() -> Result<Self> {
        Self::with_config(ManagerConfig::default())
    }

    /// Native backend with `config`, then an initial discovery pass.
    pub fn with_config(config: ManagerConfig) -> Result<Self> {
        let codes = Arc::new(CodeTable::evdev());
        let backend = backends::native(&config, codes.clone());
        Self::with_backend(config, codes, backend)
    }

    /// Build around an explicit backend, then run an initial discovery pass.
    ///
    /// This is the seam for custom sources and for tests.
    pub fn with_backend(config: ManagerConfig, codes: Arc<CodeTable>, backend: Box<dyn Backend>) -> Result<Self> {
        config.validate()?;
        let manager = Self {
            config,
            codes,
            backend: Mutex::new(backend),
            registry: RwLock::new(Registry::default()),
            reported: Mutex::new(HashSet::new()),
        };
        let report = manager.discover();
        info!(
            devices = report.added.len(),
            skipped = report.skipped.len(),
            "initial discovery complete"
        );
        Ok(manager)
    }

    /// Prune inactive devices, then attach every source not already attached.
    pub fn discover(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        // Held until every candidate is registered, so a concurrent pass sees
        // them as known and cannot open the same source twice.
        let mut backend = self.backend.lock();

        let pruned: Vec<Arc<InputDevice>> = {
            let mut registry = self.registry.write();
            let (gone, live): (Vec<_>, Vec<_>) =
                registry.devices.drain(..).partition(|d| !d.is_active());
            registry.devices = live;
            gone
        };
        for device in pruned {
            info!(device = %device.id(), name = device.name(), "detached");
            report.removed.push(device.id());
            device.close();
        }

        let known: HashSet<String> = self
            .registry
            .read()
            .devices
            .iter()
            .map(|d| d.info().key.clone())
            .collect();
        let probe = backend.probe(&|key| known.contains(key));

        for (key, error) in probe.skipped {
            if self.reported.lock().insert(key.clone()) {
                warn!(source = %key, "{error}");
                report.skipped.push((key, error));
            } else {
                debug!(source = %key, "still unavailable: {error}");
            }
        }

        for candidate in probe.found {
            self.reported.lock().remove(&candidate.key);
            let id = {
                let mut registry = self.registry.write();
                let id = DeviceId(registry.next_id);
                registry.next_id += 1;
                id
            };
            let parsed = candidate.path.as_deref().and_then(PathInfo::parse);
            let info = DeviceInfo {
                id,
                key: candidate.key,
                name: candidate.name,
                category: candidate.category,
                protocol: parsed.as_ref().map(|p| p.protocol.clone()),
                identifier: parsed.map(|p| p.identifier),
                path: candidate.path,
            };
            let key = info.key.clone();
            match InputDevice::spawn(
                info,
                candidate.decoder,
                candidate.rumble,
                self.codes.clone(),
                &self.config,
            ) {
                Ok(device) => {
                    info!(device = %id, name = device.name(), category = %device.category(), "attached");
                    self.registry.write().devices.push(Arc::new(device));
                    report.added.push(id);
                }
                Err(e) => {
                    warn!(source = %key, "could not start capture: {e}");
                    report.skipped.push((key, e));
                }
            }
        }
        report
    }

    /// Every attached device, in discovery order.
    pub fn devices(&self) -> Vec<Arc<InputDevice>> {
        self.registry.read().devices.clone()
    }

    /// Attached devices of one category, in discovery order. Empty, never an
    /// error, when there are none.
    pub fn devices_by_category(&self, category: DeviceCategory) -> Vec<Arc<InputDevice>> {
        self.registry
            .read()
            .devices
            .iter()
            .filter(|d| d.category() == category)
            .cloned()
            .collect()
    }

    pub fn gamepads(&self) -> Vec<Arc<InputDevice>> {
        self.devices_by_category(DeviceCategory::Gamepad)
    }

    pub fn keyboards(&self) -> Vec<Arc<InputDevice>> {
        self.devices_by_category(DeviceCategory::Keyboard)
    }

    pub fn mice(&self) -> Vec<Arc<InputDevice>> {
        self.devices_by_category(DeviceCategory::Mouse)
    }

    pub fn other_devices(&self) -> Vec<Arc<InputDevice>> {
        self.devices_by_category(DeviceCategory::Other)
    }

    /// Resolve an event's `device` back to the device, if still attached.
    pub fn device(&self, id: DeviceId) -> Option<Arc<InputDevice>> {
        self.registry.read().devices.iter().find(|d| d.id() == id).cloned()
    }

    /// First still-active device of `category`, in discovery order.
    pub fn first_active(&self, category: DeviceCategory) -> Option<Arc<InputDevice>> {
        self.registry
            .read()
            .devices
            .iter()
            .find(|d| d.category() == category && d.is_active())
            .cloned()
    }

    /// Detach one device: stop its capture and wake its readers.
    ///
    /// Returns `false` if no such device is attached.
    pub fn remove(&self, id: DeviceId) -> bool {
        let removed = {
            let mut registry = self.registry.write();
            let index = registry.devices.iter().position(|d| d.id() == id);
            index.map(|i| registry.devices.remove(i))
        };
        match removed {
            Some(device) => {
                info!(device = %id, name = device.name(), "removed");
                device.close();
                true
            }
            None => false,
        }
    }

    /// Stop every capture task and detach all devices.
    ///
    /// Handles held elsewhere stay valid but inactive: their reads return
    /// [`InputError::DeviceGone`]. Also run on drop.
    pub fn shutdown(&self) {
        let devices: Vec<Arc<InputDevice>> = self.registry.write().devices.drain(..).collect();
        if !devices.is_empty() {
            debug!(count = devices.len(), "shutting down devices");
        }
        for device in devices {
            device.close();
        }
    }

    pub fn codes(&self) -> &Arc<CodeTable> {
        &self.codes
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("devices", &self.registry.read().devices)
            .field("config", &self.config)
            .finish()
    }
}
