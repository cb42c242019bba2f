//! Low-level keyboard/mouse hooks on a dedicated message-loop thread.
//!
//! Low-level hook callbacks run on the thread that installed the hook, and only
//! while that thread pumps messages. Each hook therefore gets its own thread:
//! it installs the hook, pumps until `WM_QUIT`, then unhooks. The callback maps
//! the message with [`winhook`](crate::backends::winhook) and sends the frame
//! to the device's [`PushDecoder`](crate::backends::PushDecoder).
//!
//! Dropping the returned [`HookThread`] posts `WM_QUIT` and joins.

use crate::backends::winhook;
use crate::codes::CodeTable;
use crate::device::DeviceCategory;
use crate::error::{InputError, Result};
use crate::event::{RawEvent, Timeval};
use std::cell::RefCell;
use std::io;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT,
    MSG, MSLLHOOKSTRUCT, PM_NOREMOVE, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_QUIT, WM_USER,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    Keyboard,
    Mouse,
}

impl HookKind {
    pub fn key(self) -> &'static str {
        match self {
            HookKind::Keyboard => "hook:keyboard",
            HookKind::Mouse => "hook:mouse",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HookKind::Keyboard => "System Keyboard",
            HookKind::Mouse => "System Mouse",
        }
    }

    pub fn category(self) -> DeviceCategory {
        match self {
            HookKind::Keyboard => DeviceCategory::Keyboard,
            HookKind::Mouse => DeviceCategory::Mouse,
        }
    }
}

struct Sink {
    frames: Sender<Vec<RawEvent>>,
    codes: Arc<CodeTable>,
    hook: HHOOK,
}

thread_local! {
    // Set once per hook thread before the hook is installed.
    static SINK: RefCell<Option<Sink>> = const { RefCell::new(None) };
}

/// Owner of a running hook thread.
pub struct HookThread {
    kind: HookKind,
    thread_id: u32,
    handle: Option<JoinHandle<()>>,
}

impl Drop for HookThread {
    fn drop(&mut self) {
        unsafe {
            PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(hook = self.kind.key(), "hook thread panicked");
            }
        }
    }
}

/// Start a hook thread sending one frame per hooked message to `frames`.
pub fn spawn(kind: HookKind, codes: Arc<CodeTable>, frames: Sender<Vec<RawEvent>>) -> Result<HookThread> {
    let (ready_tx, ready_rx) = mpsc::sync_channel::<std::result::Result<u32, io::Error>>(1);
    let handle = thread::Builder::new()
        .name(format!("evinput-{}", kind.key()))
        .spawn(move || run(kind, codes, frames, ready_tx))?;

    match ready_rx.recv() {
        Ok(Ok(thread_id)) => Ok(HookThread {
            kind,
            thread_id,
            handle: Some(handle),
        }),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(InputError::Io(e))
        }
        Err(_) => {
            let _ = handle.join();
            Err(InputError::DeviceGone(format!("{}: hook thread exited", kind.key())))
        }
    }
}

fn run(
    kind: HookKind,
    codes: Arc<CodeTable>,
    frames: Sender<Vec<RawEvent>>,
    ready: mpsc::SyncSender<std::result::Result<u32, io::Error>>,
) {
    unsafe {
        let mut msg: MSG = std::mem::zeroed();
        // Creates this thread's message queue so WM_QUIT can be posted to it.
        PeekMessageW(&mut msg, std::ptr::null_mut(), WM_USER, WM_USER, PM_NOREMOVE);
        let thread_id = GetCurrentThreadId();

        let (id, proc_fn): (_, unsafe extern "system" fn(i32, WPARAM, LPARAM) -> LRESULT) = match kind {
            HookKind::Keyboard => (WH_KEYBOARD_LL, keyboard_proc),
            HookKind::Mouse => (WH_MOUSE_LL, mouse_proc),
        };
        let hook = SetWindowsHookExW(id, Some(proc_fn), GetModuleHandleW(std::ptr::null()), 0);
        if hook.is_null() {
            let _ = ready.send(Err(io::Error::last_os_error()));
            return;
        }
        SINK.with(|sink| *sink.borrow_mut() = Some(Sink { frames, codes, hook }));
        let _ = ready.send(Ok(thread_id));
        debug!(hook = kind.key(), "hook installed");

        while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        UnhookWindowsHookEx(hook);
        SINK.with(|sink| sink.borrow_mut().take());
        debug!(hook = kind.key(), "hook removed");
    }
}

/// Send a frame through this thread's sink and chain to the next hook.
unsafe fn forward(code: i32, wparam: WPARAM, lparam: LPARAM, frame: impl FnOnce(&Sink) -> Option<Vec<RawEvent>>) -> LRESULT {
    let hook = SINK.with(|sink| {
        let sink = sink.borrow();
        let sink = sink.as_ref()?;
        if code == HC_ACTION as i32 {
            if let Some(events) = frame(sink) {
                let _ = sink.frames.send(events);
            }
        }
        Some(sink.hook)
    });
    CallNextHookEx(hook.unwrap_or(std::ptr::null_mut()), code, wparam, lparam)
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    forward(code, wparam, lparam, |sink| {
        let info = &*(lparam as *const KBDLLHOOKSTRUCT);
        winhook::keyboard_frame(&sink.codes, wparam as u32, info.vkCode, info.scanCode, Timeval::now())
    })
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    forward(code, wparam, lparam, |_| {
        let info = &*(lparam as *const MSLLHOOKSTRUCT);
        // High word of mouseData: signed wheel distance or X button number.
        let data = i32::from((info.mouseData >> 16) as u16 as i16);
        winhook::mouse_frame(wparam as u32, info.pt.x, info.pt.y, data, Timeval::now())
    })
}
