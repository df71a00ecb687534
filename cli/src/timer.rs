//! Expiry policy and one-shot timer gate
//!
//! A deposit becomes withdrawable at the first UTC midnight after the
//! deposit's UTC calendar day. Development setups can instead use a short
//! fixed delay counted from activation. The expiry instant and the
//! "already past" classification are fixed when the gate is built; only the
//! countdown shown to the user is recomputed.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// Upper bound on the development delay (one year)
const MAX_FIXED_DELAY_SECONDS: u64 = 365 * 86_400;

/// Start of the UTC day following `ts`'s UTC day
pub fn next_utc_midnight(ts: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = ts.date_naive().succ_opt().unwrap_or(NaiveDate::MAX);
    Utc.from_utc_datetime(&next_day.and_time(NaiveTime::default()))
}

/// Which expiry rule a gate follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub use_midnight_policy: bool,
    pub fixed_delay_seconds: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            use_midnight_policy: true,
            fixed_delay_seconds: 30,
        }
    }
}

/// Remaining time split for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn from_duration(remaining: Duration) -> Self {
        let total = remaining.num_seconds().max(0);
        Self {
            days: total / 86_400,
            hours: (total % 86_400) / 3_600,
            minutes: (total % 3_600) / 60,
            seconds: total % 60,
        }
    }

    pub fn total_seconds(&self) -> i64 {
        self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days > 0 {
            write!(f, "{}d ", self.days)?;
        }
        write!(f, "{:02}h {:02}m {:02}s", self.hours, self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryEvent {
    /// Remaining time reached zero while the gate was being watched
    Reached { at: DateTime<Utc> },
    /// The gate was built after the deposit's midnight boundary
    AlreadyPast { expired_at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct TimerGate {
    expiry: DateTime<Utc>,
    observed_at: DateTime<Utc>,
    already_past: bool,
    fired: bool,
}

impl TimerGate {
    pub fn new(deposit_ts: DateTime<Utc>, observed_at: DateTime<Utc>, config: GateConfig) -> Self {
        let midnight = next_utc_midnight(deposit_ts);
        // Already past midnight beats fixed-delay re-arming
        let already_past = observed_at > midnight;

        let expiry = if already_past || config.use_midnight_policy {
            midnight
        } else {
            let delay = config.fixed_delay_seconds.min(MAX_FIXED_DELAY_SECONDS) as i64;
            observed_at
                .checked_add_signed(Duration::seconds(delay))
                .unwrap_or(midnight)
        };

        Self {
            expiry,
            observed_at,
            already_past,
            fired: false,
        }
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn is_already_past(&self) -> bool {
        self.already_past
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Countdown to expiry, `None` once there is nothing left to count
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Countdown> {
        if self.already_past {
            return None;
        }
        let remaining = self.expiry - now;
        if remaining <= Duration::zero() {
            return None;
        }
        Some(Countdown::from_duration(remaining))
    }

    /// Emit the expiry event at most once
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<ExpiryEvent> {
        if self.fired {
            return None;
        }

        if self.already_past {
            self.fired = true;
            return Some(ExpiryEvent::AlreadyPast {
                expired_at: self.expiry,
            });
        }

        if now >= self.expiry {
            self.fired = true;
            return Some(ExpiryEvent::Reached { at: now });
        }

        None
    }
}

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
