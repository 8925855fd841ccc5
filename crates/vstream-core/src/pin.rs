//! Bounded multi-producer/multi-consumer queue with backpressure, flush and
//! stop semantics — the only queue primitive used between graph stages.
//!
//! Modeled on the Mutex+Condvar pattern used for cross-thread hand-off
//! elsewhere in this stack, generalized into a FIFO with a capacity bound.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration as StdDuration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopResult<T> {
    Ready(T),
    Timeout,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Ok,
    Timeout,
    Terminated,
}

struct Inner<T> {
    queue: VecDeque<T>,
}

/// A bounded FIFO pin connecting one graph stage's output to another's input.
pub struct Pin<T> {
    capacity: usize,
    state: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    stopped: AtomicBool,
}

impl<T> Pin<T> {
    pub fn new(capacity: usize) -> Self {
        Pin {
            capacity,
            state: Mutex::new(Inner { queue: VecDeque::with_capacity(capacity) }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Push `item`, blocking while the queue is full, up to `timeout`.
    pub fn push(&self, item: T, timeout: StdDuration) -> PushResult {
        if self.is_stopped() {
            return PushResult::Terminated;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock();
        loop {
            if self.is_stopped() {
                return PushResult::Terminated;
            }
            if guard.queue.len() < self.capacity {
                guard.queue.push_back(item);
                drop(guard);
                self.not_empty.notify_one();
                return PushResult::Ok;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return PushResult::Timeout;
            }
            let timed_out = self.not_full.wait_for(&mut guard, remaining).timed_out();
            if timed_out && guard.queue.len() >= self.capacity && !self.is_stopped() {
                return PushResult::Timeout;
            }
        }
    }

    /// Pop an item, blocking while the queue is empty, up to `timeout`.
    pub fn pop(&self, timeout: StdDuration) -> PopResult<T> {
        if self.is_stopped() {
            return PopResult::Terminated;
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock();
        loop {
            if let Some(item) = guard.queue.pop_front() {
                drop(guard);
                self.not_full.notify_one();
                return PopResult::Ready(item);
            }
            if self.is_stopped() {
                return PopResult::Terminated;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return PopResult::Timeout;
            }
            let timed_out = self.not_empty.wait_for(&mut guard, remaining).timed_out();
            if timed_out && guard.queue.is_empty() && !self.is_stopped() {
                return PopResult::Timeout;
            }
        }
    }

    /// Discard every buffered item without closing the pin.
    pub fn flush(&self) {
        let mut guard = self.state.lock();
        guard.queue.clear();
        drop(guard);
        self.not_full.notify_all();
    }

    /// Wake every blocked push/pop with `Terminated` and refuse further
    /// operations until the pin is reset.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Clear the stopped flag and any buffered items, for reuse after a
    /// pipeline restart.
    pub fn reset(&self) {
        self.state.lock().queue.clear();
        self.stopped.store(false, Ordering::Release);
    }
}
