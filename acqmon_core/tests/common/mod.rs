#![allow(dead_code)]

use acqmon_core::{ManualTicker, MonitorSession};
use std::time::{Duration, Instant};

/// Fire one tick and wait until the worker has handled it.
pub fn step(session: &MonitorSession, ticker: &ManualTicker) {
    let before = session.ticks_processed();
    assert!(ticker.tick(), "trigger is not armed");
    let deadline = Instant::now() + Duration::from_secs(2);
    while session.ticks_processed() == before {
        assert!(Instant::now() < deadline, "tick was not processed");
        std::thread::yield_now();
    }
}

/// Poll `cond` for up to two seconds.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
