use crate::error::{MonitorError, Result};
use crate::rendezvous::Rendezvous;
use crate::status::MonitorStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Command delivered to a session worker through its command rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Arm sampling (monitor) or a drain sequence.
    Start,
    /// Disarm; idempotent. Recovers from ERROR.
    Stop,
    /// Disarm and zero the collected data. Recovers from ERROR.
    Clear,
    /// One trigger tick. Only the periodic trigger sends this.
    Sample,
    /// Leave the command loop so the thread can be joined.
    Exit,
}

/// Controller/worker link shared by both session kinds.
///
/// Control commands are serialized by `sent` and each is acknowledged with a
/// sequence number, so a late acknowledgement from a timed-out request is
/// never mistaken for the current one.
#[derive(Debug)]
pub(crate) struct CommandLink {
    commands: Rendezvous<Command>,
    acks: Rendezvous<(u64, MonitorStatus)>,
    sent: Mutex<u64>,
    acked: AtomicU64,
}

impl CommandLink {
    pub(crate) fn new(queue_depth: usize) -> Self {
        Self {
            commands: Rendezvous::with_capacity(queue_depth),
            acks: Rendezvous::mailbox(),
            sent: Mutex::new(0),
            acked: AtomicU64::new(0),
        }
    }

    /// Send a control command and wait for the worker's acknowledgement.
    pub(crate) fn request(
        &self,
        cmd: Command,
        timeout: Duration,
        worker_gone: impl Fn() -> bool,
    ) -> Result<MonitorStatus> {
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        if worker_gone() {
            return Err(MonitorError::Disconnected);
        }
        self.commands
            .send_timeout(cmd, timeout)
            .map_err(|_| MonitorError::Timeout)?;
        *sent += 1;
        let expected = *sent;

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(if worker_gone() {
                    MonitorError::Disconnected
                } else {
                    MonitorError::Timeout
                });
            }
            match self.acks.receive_timeout(deadline - now) {
                Some((seq, status)) if seq == expected => return Ok(status),
                Some((seq, _)) => {
                    tracing::trace!(seq, expected, "discarding stale acknowledgement");
                }
                None => {}
            }
        }
    }

    /// Offer a trigger tick; false if one is already pending or the queue is full.
    pub(crate) fn offer_sample(&self) -> bool {
        self.commands.offer(Command::Sample).is_ok()
    }

    /// Worker side: block for the next command.
    pub(crate) fn next(&self) -> Command {
        self.commands.receive_blocking()
    }

    /// Worker side: take a pending command without blocking.
    pub(crate) fn poll(&self) -> Option<Command> {
        self.commands.try_receive()
    }

    /// Worker side: acknowledge the oldest unacknowledged control command.
    pub(crate) fn acknowledge(&self, status: MonitorStatus) {
        let seq = self.acked.fetch_add(1, Ordering::AcqRel) + 1;
        self.acks.send((seq, status));
    }

    /// Drop pending work and queue EXIT.
    pub(crate) fn exit(&self) {
        self.commands.clear();
        self.commands.send(Command::Exit);
    }
}
