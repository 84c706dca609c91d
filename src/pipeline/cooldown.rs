//! Cooldown governor: standard inter-reply cooldown plus punitive lockout.

use crate::clock::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Why a dequeue was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// Punitive lockout after throttling.
    Lockout { remaining_secs: u64 },
    /// Inside the standard cooldown window.
    Cooldown { remaining_secs: u64 },
}

/// Observable cooldown state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownView {
    pub locked: bool,
    pub lockout_remaining_secs: u64,
    pub cooldown_remaining_secs: u64,
}

/// Tracks two independent timers:
///
/// - the standard cooldown, measured from the last successful reply
/// - the punitive lockout, entered on throttling and reset (not extended) on re-entry
///
/// Only the response worker mutates it.
pub struct CooldownGovernor<C: Clock = SystemClock> {
    clock: C,
    lockout: Duration,
    last_success: Option<Instant>,
    lockout_until: Option<Instant>,
}

impl<C: Clock> CooldownGovernor<C> {
    pub fn with_clock(lockout: Duration, clock: C) -> Self {
        Self {
            clock,
            lockout,
            last_success: None,
            lockout_until: None,
        }
    }

    /// Starts the standard cooldown window.
    pub fn record_success(&mut self) {
        self.last_success = Some(self.clock.now());
    }

    /// Enters (or restarts) the punitive lockout.
    pub fn enter_lockout(&mut self) {
        self.lockout_until = Some(self.clock.now() + self.lockout);
    }

    /// Clears an expired lockout. Returns true exactly once per expiry.
    pub fn poll_expiry(&mut self) -> bool {
        match self.lockout_until {
            Some(until) if self.clock.now() >= until => {
                self.lockout_until = None;
                true
            }
            _ => false,
        }
    }

    /// Whole seconds left in the lockout, rounded up.
    pub fn lockout_remaining_secs(&self) -> Option<u64> {
        let until = self.lockout_until?;
        let remaining = until.saturating_duration_since(self.clock.now());
        if remaining.is_zero() {
            None
        } else {
            Some(ceil_secs(remaining))
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lockout_remaining_secs().is_some()
    }

    fn cooldown_remaining(&self, cooldown: Duration) -> Duration {
        match self.last_success {
            Some(last) => {
                let elapsed = self.clock.now().saturating_duration_since(last);
                cooldown.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        }
    }

    /// Decide whether a new attempt may start.
    ///
    /// `cooldown` is passed per call because it is a live setting.
    pub fn may_start(&self, cooldown: Duration) -> Result<(), Refusal> {
        if let Some(remaining_secs) = self.lockout_remaining_secs() {
            return Err(Refusal::Lockout { remaining_secs });
        }
        let remaining = self.cooldown_remaining(cooldown);
        if !remaining.is_zero() {
            return Err(Refusal::Cooldown {
                remaining_secs: ceil_secs(remaining),
            });
        }
        Ok(())
    }

    pub fn view(&self, cooldown: Duration) -> CooldownView {
        let lockout = self.lockout_remaining_secs();
        CooldownView {
            locked: lockout.is_some(),
            lockout_remaining_secs: lockout.unwrap_or(0),
            cooldown_remaining_secs: ceil_secs(self.cooldown_remaining(cooldown)),
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
