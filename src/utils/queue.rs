//! # Thread-Safe Queue
//!
//! Unbounded multi-producer, multi-consumer FIFO used to hand decoded
//! [`GameEvent`](crate::protocol::event::GameEvent)s from network tasks to the
//! simulation thread.
//!
//! `push` never blocks on consumers, so I/O threads never wait for game logic.
//! Consumers choose between polling ([`ThreadSafeQueue::try_pop`]) and
//! blocking ([`ThreadSafeQueue::wait_pop`]). Growth is unbounded; an optional
//! high-water mark logs a warning when consumers fall behind.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

pub struct ThreadSafeQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
    high_water_mark: Option<usize>,
}

impl<T> ThreadSafeQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            high_water_mark: None,
        }
    }

    /// Queue that warns each time its depth climbs to `mark`.
    pub fn with_high_water_mark(mark: usize) -> Self {
        Self {
            high_water_mark: Some(mark),
            ..Self::new()
        }
    }

    /// Append an item and wake one waiting consumer.
    pub fn push(&self, item: T) {
        let depth = {
            let mut items = self.items.lock();
            items.push_back(item);
            items.len()
        };
        self.available.notify_one();

        if self.high_water_mark == Some(depth) {
            warn!(depth, "Queue reached its high-water mark; consumer is falling behind");
        }
    }

    /// Pop the oldest item without blocking.
    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Block the calling thread until an item is available.
    pub fn wait_pop(&self) -> T {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.available.wait(&mut items);
        }
    }

    /// Block for at most `timeout` waiting for an item.
    pub fn wait_pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            if self.available.wait_until(&mut items, deadline).timed_out() {
                return items.pop_front();
            }
        }
    }

    /// Point-in-time item count.
    pub fn size(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Take every queued item in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }
}

impl<T> Default for ThreadSafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
