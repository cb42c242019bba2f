#![cfg(target_os = "macos")]

//! macOS backend: listen-only Quartz event taps.
//!
//! One tap per device (keyboard, mouse), each on its own thread running a
//! CoreFoundation run loop in short slices so the stop flag is honoured. The
//! tap callback reads the fields it needs into a [`TapEvent`], maps it with
//! [`quartz`](super::quartz) and sends the frame to the device's
//! [`PushDecoder`].
//!
//! Creating a tap needs the Input Monitoring (or Accessibility) permission.
//! Without it `CGEventTapCreate` returns null; that is logged once and the
//! device simply never produces events.

use super::quartz::{self, TapEvent};
use super::{Backend, Candidate, Probe, PushDecoder};
use crate::codes::CodeTable;
use crate::config::ManagerConfig;
use crate::device::DeviceCategory;
use crate::error::Result;
use crate::event::{RawEvent, Timeval};
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

type CFMachPortRef = *mut c_void;
type CFRunLoopSourceRef = *mut c_void;
type CFRunLoopRef = *mut c_void;
type CFStringRef = *const c_void;
type CGEventRef = *mut c_void;
type CGEventTapProxy = *mut c_void;
type CGEventTapCallBack =
    unsafe extern "C" fn(CGEventTapProxy, u32, CGEventRef, *mut c_void) -> CGEventRef;

#[repr(C)]
#[derive(Clone, Copy)]
struct CGPoint {
    x: f64,
    y: f64,
}

const SESSION_EVENT_TAP: u32 = 1;
const HEAD_INSERT_EVENT_TAP: u32 = 0;
const TAP_OPTION_LISTEN_ONLY: u32 = 1;
const TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
const TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

const FIELD_MOUSE_BUTTON_NUMBER: u32 = 3;
const FIELD_MOUSE_DELTA_X: u32 = 4;
const FIELD_MOUSE_DELTA_Y: u32 = 5;
const FIELD_KEYBOARD_KEYCODE: u32 = 9;
const FIELD_SCROLL_DELTA_AXIS_1: u32 = 11;
const FIELD_SCROLL_DELTA_AXIS_2: u32 = 12;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallBack,
        user_info: *mut c_void,
    ) -> CFMachPortRef;
    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);
    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventGetFlags(event: CGEventRef) -> u64;
    fn CGEventGetLocation(event: CGEventRef) -> CGPoint;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    static kCFRunLoopDefaultMode: CFStringRef;
    fn CFMachPortCreateRunLoopSource(
        allocator: *const c_void,
        port: CFMachPortRef,
        order: isize,
    ) -> CFRunLoopSourceRef;
    fn CFRunLoopGetCurrent() -> CFRunLoopRef;
    fn CFRunLoopAddSource(rl: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);
    fn CFRunLoopRunInMode(mode: CFStringRef, seconds: f64, return_after_source_handled: u8) -> i32;
    fn CFMachPortInvalidate(port: CFMachPortRef);
    fn CFRelease(cf: *const c_void);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TapKind {
    Keyboard,
    Mouse,
}

impl TapKind {
    fn key(self) -> &'static str {
        match self {
            TapKind::Keyboard => "quartz:keyboard",
            TapKind::Mouse => "quartz:mouse",
        }
    }

    fn name(self) -> &'static str {
        match self {
            TapKind::Keyboard => "Mac Keyboard",
            TapKind::Mouse => "Mac Mouse",
        }
    }

    fn category(self) -> DeviceCategory {
        match self {
            TapKind::Keyboard => DeviceCategory::Keyboard,
            TapKind::Mouse => DeviceCategory::Mouse,
        }
    }

    fn mask(self) -> u64 {
        let types: &[u32] = match self {
            TapKind::Keyboard => &quartz::KEYBOARD_TYPES,
            TapKind::Mouse => &quartz::MOUSE_TYPES,
        };
        types.iter().fold(0, |mask, ty| mask | (1u64 << ty))
    }
}

pub struct MacBackend {
    codes: Arc<CodeTable>,
    wait: Duration,
}

impl MacBackend {
    pub fn new(config: &ManagerConfig, codes: Arc<CodeTable>) -> Self {
        Self {
            codes,
            wait: config.wait_timeout(),
        }
    }

    fn tap(&self, kind: TapKind) -> Result<Candidate> {
        let (tx, rx) = mpsc::channel();
        let thread = TapThread::spawn(kind, self.codes.clone(), tx, self.wait)?;
        let decoder = PushDecoder::new(kind.key(), rx, self.wait).with_guard(thread);
        Ok(Candidate {
            key: kind.key().to_string(),
            name: kind.name().to_string(),
            category: kind.category(),
            path: None,
            decoder: Box::new(decoder),
            rumble: None,
        })
    }
}

impl Backend for MacBackend {
    fn probe(&mut self, known: &dyn Fn(&str) -> bool) -> Probe {
        let mut probe = Probe::default();
        for kind in [TapKind::Keyboard, TapKind::Mouse] {
            if known(kind.key()) {
                continue;
            }
            match self.tap(kind) {
                Ok(candidate) => probe.found.push(candidate),
                Err(e) => probe.skipped.push((kind.key().to_string(), e)),
            }
        }
        probe
    }
}

/// State reachable from the tap callback through `user_info`.
struct TapContext {
    kind: TapKind,
    codes: Arc<CodeTable>,
    frames: Sender<Vec<RawEvent>>,
    tap: CFMachPortRef,
}

/// Owner of a running tap thread. Dropping it stops the run loop and joins.
struct TapThread {
    kind: TapKind,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TapThread {
    fn spawn(kind: TapKind, codes: Arc<CodeTable>, frames: Sender<Vec<RawEvent>>, slice: Duration) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            thread::Builder::new()
                .name(format!("evinput-{}", kind.key()))
                .spawn(move || run(kind, codes, frames, stop, slice))?
        };
        Ok(Self {
            kind,
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for TapThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(tap = self.kind.key(), "tap thread panicked");
            }
        }
    }
}

fn run(
    kind: TapKind,
    codes: Arc<CodeTable>,
    frames: Sender<Vec<RawEvent>>,
    stop: Arc<AtomicBool>,
    slice: Duration,
) {
    let mut context = Box::new(TapContext {
        kind,
        codes,
        frames,
        tap: std::ptr::null_mut(),
    });
    unsafe {
        let tap = CGEventTapCreate(
            SESSION_EVENT_TAP,
            HEAD_INSERT_EVENT_TAP,
            TAP_OPTION_LISTEN_ONLY,
            kind.mask(),
            tap_callback,
            &mut *context as *mut TapContext as *mut c_void,
        );
        if tap.is_null() {
            warn!(tap = kind.key(), "event tap refused; grant Input Monitoring to this process");
            // Keep the frame sender alive so the device stays attached but silent.
            while !stop.load(Ordering::Acquire) {
                thread::sleep(slice);
            }
            return;
        }
        context.tap = tap;

        let source = CFMachPortCreateRunLoopSource(std::ptr::null(), tap, 0);
        CFRunLoopAddSource(CFRunLoopGetCurrent(), source, kCFRunLoopDefaultMode);
        CGEventTapEnable(tap, true);
        debug!(tap = kind.key(), "event tap installed");

        while !stop.load(Ordering::Acquire) {
            CFRunLoopRunInMode(kCFRunLoopDefaultMode, slice.as_secs_f64(), 0);
        }

        CGEventTapEnable(tap, false);
        CFMachPortInvalidate(tap);
        CFRelease(source as *const c_void);
        CFRelease(tap as *const c_void);
        debug!(tap = kind.key(), "event tap removed");
    }
}

unsafe extern "C" fn tap_callback(
    _proxy: CGEventTapProxy,
    event_type: u32,
    event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef {
    let context = &*(user_info as *const TapContext);
    if event_type == TAP_DISABLED_BY_TIMEOUT || event_type == TAP_DISABLED_BY_USER_INPUT {
        CGEventTapEnable(context.tap, true);
        return event;
    }

    let time = Timeval::now();
    let frame = match context.kind {
        TapKind::Keyboard => {
            let tapped = TapEvent {
                event_type,
                keycode: CGEventGetIntegerValueField(event, FIELD_KEYBOARD_KEYCODE) as u16,
                flags: CGEventGetFlags(event),
                ..TapEvent::default()
            };
            quartz::keyboard_frame(&context.codes, &tapped, time)
        }
        TapKind::Mouse => {
            let location = CGEventGetLocation(event);
            let tapped = TapEvent {
                event_type,
                button: CGEventGetIntegerValueField(event, FIELD_MOUSE_BUTTON_NUMBER),
                x: location.x,
                y: location.y,
                delta_x: CGEventGetIntegerValueField(event, FIELD_MOUSE_DELTA_X),
                delta_y: CGEventGetIntegerValueField(event, FIELD_MOUSE_DELTA_Y),
                scroll_y: CGEventGetIntegerValueField(event, FIELD_SCROLL_DELTA_AXIS_1),
                scroll_x: CGEventGetIntegerValueField(event, FIELD_SCROLL_DELTA_AXIS_2),
                ..TapEvent::default()
            };
            Some(quartz::mouse_frame(&tapped, time))
        }
    };
    if let Some(frame) = frame {
        let _ = context.frames.send(frame);
    }
    event
}
