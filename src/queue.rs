//! Bounded event queue between one capture task and its readers.
//!
//! The capture task is the only writer. Readers drain everything queued at
//! once. Closing the queue wakes every waiter on both sides; readers then get
//! whatever is left, followed by empty drains.

use crate::config::OverflowPolicy;
use crate::event::InputEvent;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Default)]
struct QueueState {
    events: VecDeque<InputEvent>,
    closed: bool,
    dropped: u64,
}

pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
}

impl EventQueue {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Enqueue a batch in order. Returns `false` once the queue is closed.
    pub(crate) fn push_batch(&self, batch: Vec<InputEvent>) -> bool {
        let mut state = self.state.lock();
        for event in batch {
            if state.closed {
                return false;
            }
            if state.events.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.events.pop_front();
                        state.dropped += 1;
                    }
                    OverflowPolicy::Block => {
                        // Let readers see what is already there before stalling.
                        self.readable.notify_all();
                        while state.events.len() >= self.capacity && !state.closed {
                            self.writable.wait(&mut state);
                        }
                        if state.closed {
                            return false;
                        }
                    }
                }
            }
            state.events.push_back(event);
        }
        self.readable.notify_all();
        !state.closed
    }

    /// Block until something is queued or the queue is closed, then take it all.
    ///
    /// An empty result means the queue is closed and fully drained.
    pub(crate) fn drain_blocking(&self) -> Vec<InputEvent> {
        let mut state = self.state.lock();
        while state.events.is_empty() && !state.closed {
            self.readable.wait(&mut state);
        }
        let out: Vec<InputEvent> = state.events.drain(..).collect();
        self.writable.notify_all();
        out
    }

    /// Take whatever is queued without waiting.
    pub(crate) fn try_drain(&self) -> Vec<InputEvent> {
        let mut state = self.state.lock();
        let out: Vec<InputEvent> = state.events.drain(..).collect();
        if !out.is_empty() {
            self.writable.notify_all();
        }
        out
    }

    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
