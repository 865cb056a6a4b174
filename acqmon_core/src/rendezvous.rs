//! Mutex + condition-variable handoff between a controller and a worker.
//!
//! A [`Rendezvous`] holds at most `capacity` values. With capacity 1 it is the
//! classic single-slot mailbox: [`Rendezvous::send`] overwrites whatever was
//! not consumed yet. Larger capacities give a bounded FIFO whose producers
//! either wait for room ([`Rendezvous::send_timeout`]) or give up at once
//! ([`Rendezvous::offer`]), so nothing is ever overwritten silently.
//!
//! Receivers pop the value and release the lock before returning; a worker
//! processing a command never holds the channel lock across hardware I/O.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Rendezvous<T> {
    slot: Mutex<VecDeque<T>>,
    ready: Condvar,
    room: Condvar,
    capacity: usize,
}

impl<T> Rendezvous<T> {
    /// Single-slot, last-writer-wins mailbox.
    pub fn mailbox() -> Self {
        Self::with_capacity(1)
    }

    /// Bounded FIFO holding up to `capacity` values (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slot: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            room: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values posted but not yet received.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Store `value`, replacing the newest unconsumed value when full.
    /// Returns the value that was overwritten, if any.
    pub fn send(&self, value: T) -> Option<T> {
        let mut q = self.lock();
        let replaced = if q.len() >= self.capacity {
            q.pop_back()
        } else {
            None
        };
        q.push_back(value);
        drop(q);
        self.ready.notify_one();
        replaced
    }

    /// Enqueue `value`, waiting up to `timeout` for room. On timeout the value
    /// is handed back.
    pub fn send_timeout(&self, value: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now() + timeout;
        let mut q = self.lock();
        while q.len() >= self.capacity {
            let now = Instant::now();
            if now >= deadline {
                return Err(value);
            }
            let (guard, _) = self
                .room
                .wait_timeout(q, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            q = guard;
        }
        q.push_back(value);
        drop(q);
        self.ready.notify_one();
        Ok(())
    }

    /// Block until a value is available and take it.
    pub fn receive_blocking(&self) -> T {
        let mut q = self.lock();
        loop {
            if let Some(v) = q.pop_front() {
                drop(q);
                self.room.notify_one();
                return v;
            }
            q = self.ready.wait(q).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`Rendezvous::receive_blocking`] but gives up after `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut q = self.lock();
        loop {
            if let Some(v) = q.pop_front() {
                drop(q);
                self.room.notify_one();
                return Some(v);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(q, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            q = guard;
        }
    }

    /// Take a value if one is waiting.
    pub fn try_receive(&self) -> Option<T> {
        let v = self.lock().pop_front();
        if v.is_some() {
            self.room.notify_one();
        }
        v
    }

    /// Drop every pending value.
    pub fn clear(&self) {
        self.lock().clear();
        self.room.notify_all();
    }
}

impl<T: PartialEq> Rendezvous<T> {
    /// Enqueue `value` unless the queue is full or an equal value is already
    /// pending. Never blocks on a consumer.
    pub fn offer(&self, value: T) -> Result<(), T> {
        let mut q = self.lock();
        if q.len() >= self.capacity || q.contains(&value) {
            return Err(value);
        }
        q.push_back(value);
        drop(q);
        self.ready.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Rendezvous;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn mailbox_is_last_writer_wins() {
        let mb = Rendezvous::mailbox();
        assert_eq!(mb.send(1), None);
        assert_eq!(mb.send(2), Some(1));
        assert_eq!(mb.pending(), 1);
        assert_eq!(mb.try_receive(), Some(2));
        assert_eq!(mb.try_receive(), None);
    }

    #[test]
    fn queue_keeps_fifo_order() {
        let q = Rendezvous::with_capacity(3);
        for v in 1..=3 {
            q.send_timeout(v, Duration::from_millis(10)).unwrap();
        }
        assert_eq!(q.send_timeout(4, Duration::from_millis(5)), Err(4));
        assert_eq!(q.receive_blocking(), 1);
        assert_eq!(q.receive_blocking(), 2);
        assert_eq!(q.receive_blocking(), 3);
    }

    #[test]
    fn offer_coalesces_duplicates() {
        let q = Rendezvous::with_capacity(4);
        assert!(q.offer('s').is_ok());
        assert_eq!(q.offer('s'), Err('s'));
        assert!(q.offer('x').is_ok());
        assert_eq!(q.pending(), 2);
    }

    #[test]
    fn offer_refuses_when_full() {
        let q = Rendezvous::with_capacity(1);
        q.send(0u8);
        assert_eq!(q.offer(1), Err(1));
    }

    #[test]
    fn receive_timeout_expires_when_empty() {
        let q: Rendezvous<u8> = Rendezvous::mailbox();
        assert_eq!(q.receive_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn blocked_sender_proceeds_once_receiver_makes_room() {
        let q = Arc::new(Rendezvous::with_capacity(1));
        q.send(1);
        let bg = q.clone();
        let h = std::thread::spawn(move || bg.send_timeout(2, Duration::from_secs(2)));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(q.receive_blocking(), 1);
        assert_eq!(h.join().unwrap(), Ok(()));
        assert_eq!(q.receive_timeout(Duration::from_secs(2)), Some(2));
    }

    #[test]
    fn receiver_wakes_on_send() {
        let q = Arc::new(Rendezvous::mailbox());
        let bg = q.clone();
        let h = std::thread::spawn(move || bg.receive_blocking());
        std::thread::sleep(Duration::from_millis(10));
        q.send(7u32);
        assert_eq!(h.join().unwrap(), 7);
    }

    #[test]
    fn clear_drops_pending_values() {
        let q = Rendezvous::with_capacity(2);
        q.send(1);
        q.send(2);
        q.clear();
        assert_eq!(q.try_receive(), None);
    }
}
