//! Deadline timers for the ergometer event loop
//!
//! Both timers are polled by the loop with the current instant; neither owns
//! a thread, so at most one callback runs at a time.

use std::time::{Duration, Instant};

/// Fires once after being armed
#[derive(Debug, Default)]
pub struct OneShotTimer {
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) to fire `delay` after `now`
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True exactly once when the deadline has passed
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Fires every `interval` while running
#[derive(Debug)]
pub struct RepeatingTimer {
    interval: Duration,
    next: Option<Instant>,
}

impl RepeatingTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn is_running(&self) -> bool {
        self.next.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Change the interval; a running timer restarts from `now`
    pub fn set_interval(&mut self, now: Instant, interval: Duration) {
        self.interval = interval;
        if self.is_running() {
            self.start(now);
        }
    }

    /// True when a tick is due
    ///
    /// Missed ticks are not queued: after a late check the next tick is one
    /// interval from `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if next <= now => {
                let following = next + self.interval;
                self.next = Some(if following > now {
                    following
                } else {
                    now + self.interval
                });
                true
            }
            _ => false,
        }
    }
}

/// How long the loop may sleep before the earliest deadline, capped at `cap`
pub fn next_wait(now: Instant, deadlines: &[Option<Instant>], cap: Duration) -> Duration {
    deadlines
        .iter()
        .flatten()
        .map(|deadline| deadline.saturating_duration_since(now))
        .fold(cap, Duration::min)
}
