//! Common time and polling helpers for acqmon_core.

use acqmon_traits::Clock;
use std::time::Duration;

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Poll `ready` every `poll_interval` until it returns `Ok(true)`.
///
/// - `timeout == None` waits forever.
/// - Errors from `ready` are returned immediately.
/// - On timeout the error built by `on_timeout` is returned.
///
/// Time is taken from `clock`, so a manual clock makes the loop deterministic.
pub fn wait_until<C, E>(
    clock: &C,
    timeout: Option<Duration>,
    poll_interval: Duration,
    mut ready: impl FnMut() -> Result<bool, E>,
    on_timeout: impl FnOnce() -> E,
) -> Result<(), E>
where
    C: Clock + ?Sized,
{
    let deadline = timeout.map(|t| clock.now() + t);
    loop {
        if ready()? {
            return Ok(());
        }
        if let Some(d) = deadline
            && clock.now() >= d
        {
            return Err(on_timeout());
        }
        clock.sleep(poll_interval);
    }
}
