//! Purpose: Move directories with a bounded, exponential-backoff retry on transient failures.
//! Exports: `RetryPolicy`, `DirMover`, `FsMover`, `Sleeper`, `ThreadSleeper`, `move_with_retry`.
//! Role: Used by the convert stage to partition items without losing data.
//! Invariants: At most `max_attempts` moves are attempted; only transient errors are retried.
//! Invariants: A failed move leaves the source directory in place.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::core::error::{Error, ErrorKind};
use crate::core::paths::copy_dir_recursive;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

pub trait DirMover {
    fn move_dir(&self, from: &Path, to: &Path) -> io::Result<()>;
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Rename-based mover; replaces an existing destination and copies across devices.
#[derive(Copy, Clone, Debug, Default)]
pub struct FsMover;

impl DirMover for FsMover {
    fn move_dir(&self, from: &Path, to: &Path) -> io::Result<()> {
        if to.exists() {
            fs::remove_dir_all(to)?;
        }
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                copy_dir_recursive(from, to).map_err(io::Error::other)?;
                fs::remove_dir_all(from)
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ResourceBusy
    )
}

/// Move `from` to `to`, retrying transient failures per `policy`. Returns attempts used.
pub fn move_with_retry(
    mover: &dyn DirMover,
    sleeper: &dyn Sleeper,
    policy: RetryPolicy,
    from: &Path,
    to: &Path,
) -> Result<u32, Error> {
    let max_attempts = policy.max_attempts.max(1);
    let mut waited = Duration::ZERO;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match mover.move_dir(from, to) {
            Ok(()) => return Ok(attempt),
            Err(err) if is_transient(&err) && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    from = %from.display(),
                    attempt,
                    delay = ?delay,
                    error = %err,
                    "move failed; retrying"
                );
                sleeper.sleep(delay);
                waited += delay;
            }
            Err(err) if is_transient(&err) => {
                return Err(Error::new(ErrorKind::Busy)
                    .with_message("directory stayed locked")
                    .with_path(from)
                    .with_hint(format!(
                        "Retry attempts: {attempt} (waited {}ms).",
                        waited.as_millis()
                    ))
                    .with_source(err));
            }
            Err(err) => return Err(Error::io(err, "failed to move directory").with_path(from)),
        }
    }
}
