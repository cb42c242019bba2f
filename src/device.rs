//! One physical or logical input source and its capture task.
//!
//! An [`InputDevice`] exclusively owns a background thread that drains its
//! [`Decoder`] and a bounded queue the thread fills. Readers call
//! [`InputDevice::read`], which blocks until at least one event is queued.
//!
//! Gamepads with force feedback also accept [`InputDevice::set_vibration`].
//!
//! Teardown ([`InputDevice::close`], or dropping the device) raises the stop
//! signal, stops any rumble, closes the queue so blocked readers return at
//! once, and joins the thread. Decoders return to the loop at least every `wait_timeout_ms`, so the
//! join is bounded.

use crate::backends::rumble::motor_speed;
use crate::backends::{Decoder, Normalizer, Rumble};
use crate::codes::CodeTable;
use crate::config::ManagerConfig;
use crate::error::{InputError, Result};
use crate::event::InputEvent;
use crate::metadata::DeviceInfo;
use crate::queue::EventQueue;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Manager-assigned device handle. Stable for the lifetime of the manager,
/// never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    Gamepad,
    Keyboard,
    Mouse,
    Other,
}

impl DeviceCategory {
    /// Classify by the udev link suffix (`...-event-kbd`).
    pub fn from_device_type(kind: &str) -> Self {
        match kind {
            "kbd" => DeviceCategory::Keyboard,
            "mouse" => DeviceCategory::Mouse,
            "joystick" => DeviceCategory::Gamepad,
            _ => DeviceCategory::Other,
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceCategory::Gamepad => "gamepad",
            DeviceCategory::Keyboard => "keyboard",
            DeviceCategory::Mouse => "mouse",
            DeviceCategory::Other => "other device",
        })
    }
}

/// A live input source with its own capture thread and event queue.
pub struct InputDevice {
    info: DeviceInfo,
    queue: Arc<EventQueue>,
    active: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    capture: Mutex<Option<JoinHandle<()>>>,
    rumble: Mutex<Option<Box<dyn Rumble>>>,
}

impl InputDevice {
    /// Start capturing from `decoder` on a dedicated thread.
    pub(crate) fn spawn(
        info: DeviceInfo,
        decoder: Box<dyn Decoder>,
        rumble: Option<Box<dyn Rumble>>,
        codes: Arc<CodeTable>,
        config: &ManagerConfig,
    ) -> Result<Self> {
        let queue = Arc::new(EventQueue::new(config.queue_capacity, config.overflow));
        let active = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let task = CaptureTask {
            label: format!("{} ({})", info.name, info.id),
            decoder,
            normalizer: Normalizer::new(info.id, codes),
            queue: queue.clone(),
            active: active.clone(),
            stop: stop.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("evinput-{}", info.id))
            .spawn(move || task.run())
            .map_err(InputError::Io)?;

        Ok(Self {
            info,
            queue,
            active,
            stop,
            capture: Mutex::new(Some(handle)),
            rumble: Mutex::new(rumble),
        })
    }

    /// Run the left (strong) and right (weak) motors at `0.0..=1.0` for
    /// `duration`, replacing any rumble in progress.
    ///
    /// Returns immediately; the motors stop on their own. Zero levels or a
    /// zero duration stop them now. Devices without force feedback return
    /// [`InputError::Unsupported`].
    pub fn set_vibration(&self, left: f32, right: f32, duration: Duration) -> Result<()> {
        if !self.is_active() {
            return Err(self.gone());
        }
        let mut rumble = self.rumble.lock();
        let Some(rumble) = rumble.as_mut() else {
            return Err(InputError::Unsupported(format!(
                "{} ({}) has no force feedback",
                self.info.name, self.info.id
            )));
        };
        let (strong, weak) = (motor_speed(left), motor_speed(right));
        debug!(device = %self.info.id, strong, weak, ?duration, "rumble");
        rumble.rumble(strong, weak, duration)
    }

    /// `true` when [`set_vibration`](Self::set_vibration) can drive motors.
    pub fn has_force_feedback(&self) -> bool {
        self.rumble.lock().is_some()
    }

    /// Block until at least one event is available, then return everything
    /// queued, oldest first.
    ///
    /// Returns [`InputError::DeviceGone`] once the device is inactive and its
    /// queue is empty; it never blocks past teardown.
    pub fn read(&self) -> Result<Vec<InputEvent>> {
        let events = self.queue.drain_blocking();
        if events.is_empty() {
            return Err(self.gone());
        }
        Ok(events)
    }

    /// Non-blocking variant of [`read`](Self::read). An empty `Ok` means
    /// "nothing yet".
    pub fn try_read(&self) -> Result<Vec<InputEvent>> {
        let events = self.queue.try_drain();
        if events.is_empty() && self.queue.is_closed() {
            return Err(self.gone());
        }
        Ok(events)
    }

    /// `false` once the source reported it is gone or the device was closed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Events discarded by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped()
    }

    /// Events waiting to be read.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Stop the capture task, release the OS handle and wake blocked readers.
    ///
    /// Idempotent.
    pub fn close(&self) {
        self.stop.store(true, Ordering::Release);
        self.active.store(false, Ordering::Release);
        self.queue.close();
        drop(self.rumble.lock().take());
        if let Some(handle) = self.capture.lock().take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(device = %self.info.id, "capture task panicked");
            }
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn id(&self) -> DeviceId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn category(&self) -> DeviceCategory {
        self.info.category
    }

    fn gone(&self) -> InputError {
        InputError::DeviceGone(format!("{} ({})", self.info.name, self.info.id))
    }
}

impl Drop for InputDevice {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputDevice")
            .field("info", &self.info)
            .field("active", &self.is_active())
            .finish()
    }
}

impl fmt::Display for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.info.name)
    }
}

struct CaptureTask {
    label: String,
    decoder: Box<dyn Decoder>,
    normalizer: Normalizer,
    queue: Arc<EventQueue>,
    active: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl CaptureTask {
    fn run(mut self) {
        // Marks the device inactive and wakes readers however the loop ends,
        // including by panic.
        let _guard = Shutdown {
            queue: self.queue.clone(),
            active: self.active.clone(),
        };

        debug!(device = %self.label, "capture started");
        while !self.stop.load(Ordering::Acquire) {
            match self.decoder.decode_next(&mut self.normalizer) {
                Ok(events) if events.is_empty() => {}
                Ok(events) => {
                    if !self.queue.push_batch(events) {
                        break;
                    }
                }
                Err(e) if e.is_gone() => {
                    info!(device = %self.label, "{e}");
                    break;
                }
                Err(e) => {
                    warn!(device = %self.label, error = %e, "capture error, continuing");
                }
            }
        }
        debug!(device = %self.label, skipped = self.normalizer.skipped(), "capture stopped");
    }
}

struct Shutdown {
    queue: Arc<EventQueue>,
    active: Arc<AtomicBool>,
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.queue.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::PushDecoder;
    use crate::event::{EventType, RawEvent, Timeval};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    fn device(capacity: usize) -> (InputDevice, mpsc::Sender<Vec<RawEvent>>) {
        device_with(capacity, None)
    }

    fn device_with(
        capacity: usize,
        rumble: Option<Box<dyn Rumble>>,
    ) -> (InputDevice, mpsc::Sender<Vec<RawEvent>>) {
        let (tx, rx) = mpsc::channel();
        let config = ManagerConfig {
            queue_capacity: capacity,
            wait_timeout_ms: 10,
            ..ManagerConfig::default()
        };
        let info = DeviceInfo {
            id: DeviceId(5),
            key: "test:kbd".into(),
            name: "Test Keyboard".into(),
            category: DeviceCategory::Keyboard,
            path: None,
            protocol: None,
            identifier: None,
        };
        let decoder = PushDecoder::new("test", rx, config.wait_timeout());
        let device = InputDevice::spawn(
            info,
            Box::new(decoder),
            rumble,
            Arc::new(CodeTable::evdev()),
            &config,
        )
        .unwrap();
        (device, tx)
    }

    fn key(code: u16, value: i32) -> RawEvent {
        RawEvent::new(Timeval::now(), EventType::Key, code, value)
    }

    #[test]
    fn try_read_is_empty_until_data_arrives() {
        let (device, tx) = device(16);
        assert!(device.try_read().unwrap().is_empty());
        tx.send(vec![key(30, 1), RawEvent::sync(Timeval::now())]).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while device.pending() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let events = device.try_read().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.device == DeviceId(5)));
    }

    #[test]
    fn source_going_away_deactivates() {
        let (device, tx) = device(16);
        assert!(device.is_active());
        tx.send(vec![key(30, 1)]).unwrap();
        drop(tx);
        // Queued events are still handed out before the gone signal.
        assert_eq!(device.read().unwrap().len(), 1);
        assert!(device.read().unwrap_err().is_gone());
        assert!(!device.is_active());
    }

    #[test]
    fn close_is_idempotent_and_wakes_readers() {
        let (device, _tx) = device(16);
        let device = Arc::new(device);
        let reader = {
            let device = device.clone();
            thread::spawn(move || device.read())
        };
        thread::sleep(Duration::from_millis(30));
        device.close();
        device.close();
        assert!(reader.join().unwrap().unwrap_err().is_gone());
        assert!(device.try_read().unwrap_err().is_gone());
    }

    #[test]
    fn display_and_ids() {
        let (device, _tx) = device(4);
        assert_eq!(device.to_string(), "Test Keyboard");
        assert_eq!(device.id().to_string(), "dev5");
        assert_eq!(device.queue_capacity(), 4);
        assert_eq!(DeviceCategory::from_device_type("joystick"), DeviceCategory::Gamepad);
        assert_eq!(DeviceCategory::from_device_type("touchpad"), DeviceCategory::Other);
    }

    /// Remembers every request; `Drop` is logged as a final stop.
    struct Motors(Arc<Mutex<Vec<(u16, u16, Duration)>>>);

    impl Rumble for Motors {
        fn rumble(&mut self, strong: u16, weak: u16, duration: Duration) -> Result<()> {
            self.0.lock().push((strong, weak, duration));
            Ok(())
        }
    }

    impl Drop for Motors {
        fn drop(&mut self) {
            self.0.lock().push((0, 0, Duration::ZERO));
        }
    }

    #[test]
    fn vibration_scales_levels_and_stops_on_close() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (device, _tx) = device_with(4, Some(Box::new(Motors(log.clone()))));
        assert!(device.has_force_feedback());

        device.set_vibration(1.0, 0.0, Duration::from_millis(1000)).unwrap();
        device.set_vibration(0.5, 2.0, Duration::from_millis(250)).unwrap();
        assert_eq!(
            *log.lock(),
            vec![
                (u16::MAX, 0, Duration::from_millis(1000)),
                (32768, u16::MAX, Duration::from_millis(250)),
            ]
        );

        device.close();
        assert_eq!(log.lock().last(), Some(&(0, 0, Duration::ZERO)));
        assert!(device.set_vibration(1.0, 1.0, Duration::from_secs(1)).unwrap_err().is_gone());
        assert!(!device.has_force_feedback());
    }

    #[test]
    fn vibration_without_motors_is_unsupported() {
        let (device, _tx) = device(4);
        assert!(!device.has_force_feedback());
        assert!(matches!(
            device.set_vibration(1.0, 1.0, Duration::from_secs(1)),
            Err(InputError::Unsupported(_))
        ));
    }
}
