//! Gamepad force feedback.
//!
//! A rumble request drives two motors, strong (left, low frequency) and weak
//! (right, high frequency), at 16-bit magnitudes for a bounded time. Levels are
//! given to [`InputDevice::set_vibration`](crate::device::InputDevice::set_vibration)
//! as `0.0..=1.0` and scaled here.
//!
//! - Linux: an `FF_RUMBLE` effect is uploaded with `EVIOCSFF` and played by
//!   writing an `EV_FF` record to the device node. The kernel stops it after
//!   the effect's replay length.
//! - Windows: XInput has no durations, so [`TimedRumble`] starts the motors and
//!   a timer thread stops them, unless a newer request took over first.

use crate::error::{InputError, Result};
use crate::event::{EventType, RawEvent, Timeval};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// A device's force-feedback output.
pub trait Rumble: Send {
    /// Run both motors at the given magnitudes for `duration`, replacing any
    /// effect still playing. Zero magnitudes or a zero duration stop the motors.
    fn rumble(&mut self, strong: u16, weak: u16, duration: Duration) -> Result<()>;
}

/// Scale a `0.0..=1.0` level to a motor magnitude. Out-of-range levels are
/// clamped; NaN is off.
pub fn motor_speed(level: f32) -> u16 {
    if level.is_nan() {
        return 0;
    }
    (level.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16
}

/// `true` when a request means "stop".
pub fn is_stop(strong: u16, weak: u16, duration: Duration) -> bool {
    (strong == 0 && weak == 0) || duration.is_zero()
}

pub const FF_RUMBLE: u16 = 0x50;

/// `sizeof(struct ff_effect)`: a 14-byte header padded to the union's pointer
/// alignment, then the union, whose largest member (`ff_periodic_effect`) ends
/// in a `custom_data` pointer.
pub const FF_EFFECT_SIZE: usize = 16 + 24 + std::mem::size_of::<*const u8>();

const OFFSET_ID: usize = 2;
const OFFSET_REPLAY_LENGTH: usize = 10;
const OFFSET_STRONG: usize = 16;
const OFFSET_WEAK: usize = 18;

/// `EVIOCSFF`, i.e. `_IOW('E', 0x80, struct ff_effect)`.
pub const fn eviocsff() -> u32 {
    const IOC_WRITE: u32 = 1;
    (IOC_WRITE << 30) | ((FF_EFFECT_SIZE as u32) << 16) | ((b'E' as u32) << 8) | 0x80
}

/// A `struct ff_effect` describing a rumble, in native byte order.
///
/// `id` is `-1` for a new effect or the id the kernel assigned on an earlier
/// upload, which updates that effect in place. Durations past `u16::MAX`
/// milliseconds are capped.
pub fn encode_rumble_effect(id: i16, strong: u16, weak: u16, duration: Duration) -> [u8; FF_EFFECT_SIZE] {
    let length = u16::try_from(duration.as_millis()).unwrap_or(u16::MAX);
    let mut buf = [0u8; FF_EFFECT_SIZE];
    buf[0..2].copy_from_slice(&FF_RUMBLE.to_ne_bytes());
    buf[OFFSET_ID..OFFSET_ID + 2].copy_from_slice(&id.to_ne_bytes());
    buf[OFFSET_REPLAY_LENGTH..OFFSET_REPLAY_LENGTH + 2].copy_from_slice(&length.to_ne_bytes());
    buf[OFFSET_STRONG..OFFSET_STRONG + 2].copy_from_slice(&strong.to_ne_bytes());
    buf[OFFSET_WEAK..OFFSET_WEAK + 2].copy_from_slice(&weak.to_ne_bytes());
    buf
}

/// The effect id in an uploaded `struct ff_effect`.
pub fn effect_id(effect: &[u8; FF_EFFECT_SIZE]) -> i16 {
    i16::from_ne_bytes([effect[OFFSET_ID], effect[OFFSET_ID + 1]])
}

/// The `EV_FF` record that starts (`play`) or stops effect `id`.
pub fn play_record(id: i16, play: bool, time: Timeval) -> Result<RawEvent> {
    let code = u16::try_from(id)
        .map_err(|_| InputError::DecodeMalformed(format!("effect id {id} was never uploaded")))?;
    Ok(RawEvent::new(time, EventType::ForceFeedback, code, i32::from(play)))
}

/// Motors that stay at whatever they were last set to.
pub trait Motors: Send + 'static {
    fn set(&mut self, strong: u16, weak: u16) -> Result<()>;
}

/// [`Rumble`] over [`Motors`] with a stop timer per request.
///
/// Each request takes a new generation; a timer only stops the motors if its
/// generation is still the latest. Dropping the rumble stops the motors.
pub struct TimedRumble<M: Motors> {
    motors: Arc<Mutex<M>>,
    generation: Arc<AtomicU64>,
}

impl<M: Motors> TimedRumble<M> {
    pub fn new(motors: M) -> Self {
        Self {
            motors: Arc::new(Mutex::new(motors)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<M: Motors> Rumble for TimedRumble<M> {
    fn rumble(&mut self, strong: u16, weak: u16, duration: Duration) -> Result<()> {
        let ticket = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if is_stop(strong, weak, duration) {
            return self.motors.lock().set(0, 0);
        }
        self.motors.lock().set(strong, weak)?;

        let motors = self.motors.clone();
        let generation = self.generation.clone();
        thread::Builder::new()
            .name("evinput-rumble".into())
            .spawn(move || {
                thread::sleep(duration);
                if generation.load(Ordering::Acquire) != ticket {
                    return;
                }
                if let Err(e) = motors.lock().set(0, 0) {
                    debug!("stopping rumble: {e}");
                }
            })
            .map_err(InputError::Io)?;
        Ok(())
    }
}

impl<M: Motors> Drop for TimedRumble<M> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.motors.lock().set(0, 0) {
            debug!("stopping rumble: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<(u16, u16)>>>);

    impl Motors for Recorder {
        fn set(&mut self, strong: u16, weak: u16) -> Result<()> {
            self.0.lock().push((strong, weak));
            Ok(())
        }
    }

    impl Recorder {
        fn log(&self) -> Vec<(u16, u16)> {
            self.0.lock().clone()
        }

        fn wait_for(&self, len: usize) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while self.0.lock().len() < len {
                assert!(Instant::now() < deadline, "motors not set in time");
                thread::sleep(Duration::from_millis(5));
            }
        }
    }

    #[test]
    fn levels_scale_and_clamp() {
        assert_eq!(motor_speed(0.0), 0);
        assert_eq!(motor_speed(1.0), u16::MAX);
        assert_eq!(motor_speed(0.5), 32768);
        assert_eq!(motor_speed(-3.0), 0);
        assert_eq!(motor_speed(7.5), u16::MAX);
        assert_eq!(motor_speed(f32::NAN), 0);
    }

    #[test]
    fn rumble_effect_layout() {
        let effect = encode_rumble_effect(-1, 0xffff, 0x1234, Duration::from_millis(1000));
        assert_eq!(u16::from_ne_bytes([effect[0], effect[1]]), FF_RUMBLE);
        assert_eq!(effect_id(&effect), -1);
        // direction and trigger are left zeroed
        assert!(effect[4..10].iter().all(|b| *b == 0));
        assert_eq!(u16::from_ne_bytes([effect[10], effect[11]]), 1000);
        assert_eq!(u16::from_ne_bytes([effect[12], effect[13]]), 0);
        assert_eq!(u16::from_ne_bytes([effect[16], effect[17]]), 0xffff);
        assert_eq!(u16::from_ne_bytes([effect[18], effect[19]]), 0x1234);
        assert!(effect[20..].iter().all(|b| *b == 0));

        let long = encode_rumble_effect(3, 1, 1, Duration::from_secs(600));
        assert_eq!(effect_id(&long), 3);
        assert_eq!(u16::from_ne_bytes([long[10], long[11]]), u16::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn effect_upload_request_matches_kernel_abi() {
        assert_eq!(FF_EFFECT_SIZE, 48);
        assert_eq!(eviocsff(), 0x4030_4580);
    }

    #[test]
    fn play_and_stop_records() {
        let t = Timeval::new(1, 0);
        let play = play_record(2, true, t).unwrap();
        assert_eq!((play.ev_type, play.code, play.value), (0x15, 2, 1));
        let stop = play_record(2, false, t).unwrap();
        assert_eq!(stop.value, 0);
        assert!(play_record(-1, true, t).is_err());
    }

    #[test]
    fn timed_rumble_stops_after_duration() {
        let motors = Recorder::default();
        let mut rumble = TimedRumble::new(motors.clone());
        rumble.rumble(65535, 0, Duration::from_millis(20)).unwrap();
        motors.wait_for(2);
        assert_eq!(motors.log(), vec![(65535, 0), (0, 0)]);
    }

    #[test]
    fn newer_request_cancels_pending_stop() {
        let motors = Recorder::default();
        let mut rumble = TimedRumble::new(motors.clone());
        rumble.rumble(100, 100, Duration::from_millis(20)).unwrap();
        rumble.rumble(200, 0, Duration::from_millis(300)).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(motors.log(), vec![(100, 100), (200, 0)]);
        motors.wait_for(3);
        assert_eq!(motors.log()[2], (0, 0));
    }

    #[test]
    fn dropping_stops_the_motors() {
        let motors = Recorder::default();
        let mut rumble = TimedRumble::new(motors.clone());
        rumble.rumble(10, 20, Duration::from_secs(5)).unwrap();
        drop(rumble);
        assert_eq!(motors.log(), vec![(10, 20), (0, 0)]);
    }

    #[test]
    fn zero_request_stops_immediately() {
        let motors = Recorder::default();
        let mut rumble = TimedRumble::new(motors.clone());
        rumble.rumble(500, 500, Duration::from_secs(5)).unwrap();
        rumble.rumble(0, 0, Duration::from_secs(5)).unwrap();
        assert_eq!(motors.log(), vec![(500, 500), (0, 0)]);
        assert!(is_stop(9, 9, Duration::ZERO));
    }
}
