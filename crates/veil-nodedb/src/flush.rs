//! Periodic snapshot of the table to disk

use std::time::Duration;

/// Default time between two flushes
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Decides when the owner thread writes the whole table out.
///
/// Each due tick moves the deadline forward by exactly one interval, so a
/// node that ticks rarely flushes at most once per tick and catches up over
/// the following ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSchedule {
    /// `None` disables flushing
    next_flush_at: Option<u64>,
    interval_ms: u64,
}

impl FlushSchedule {
    /// First flush one interval after `now`
    pub fn new(now: u64, interval: Duration) -> Self {
        let interval_ms = interval.as_millis() as u64;
        Self {
            next_flush_at: Some(now.saturating_add(interval_ms)),
            interval_ms,
        }
    }

    pub fn disabled() -> Self {
        Self {
            next_flush_at: None,
            interval_ms: FLUSH_INTERVAL.as_millis() as u64,
        }
    }

    pub fn next_flush_at(&self) -> Option<u64> {
        self.next_flush_at
    }

    /// Returns true if a flush is due at `now`, advancing the deadline
    pub fn on_tick(&mut self, now: u64) -> bool {
        match self.next_flush_at {
            Some(deadline) if now > deadline => {
                self.next_flush_at = Some(deadline.saturating_add(self.interval_ms));
                true
            }
            _ => false,
        }
    }
}
