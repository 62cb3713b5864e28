// src/policy.rs
//! # Rate / quiet-hours policy
//! Pure gate answering "may we publish right now, and if not, when next?".
//! No hidden state: the posting-window counters live in
//! [`PostingWindowState`], owned and mutated only by the scheduler, and are
//! passed in explicitly so the gate stays independently testable.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Quiet interval start hour, 24h clock. Wrapping past midnight is
    /// supported (start 23, end 7).
    pub quiet_start_hour: u32,
    /// Quiet interval end hour (exclusive).
    pub quiet_end_hour: u32,
    /// Rolling rate window length, seconds.
    pub window_secs: i64,
    /// Max posts inside one rate window.
    pub max_posts_per_window: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            quiet_start_hour: 23,
            quiet_end_hour: 7,
            window_secs: 3600,
            max_posts_per_window: 4,
        }
    }
}

/// Process-wide posting counters. Mutated only by the scheduler; persisted
/// on every mutation and reloaded at restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingWindowState {
    pub window_started_at: Option<DateTime<Utc>>,
    pub posts_in_window: u32,
    pub last_post_at: Option<DateTime<Utc>>,
}

impl PostingWindowState {
    /// Posts counted against the window containing `now`. An elapsed window
    /// counts as empty.
    pub fn effective_count(&self, now: DateTime<Utc>, window_secs: i64) -> u32 {
        match self.window_started_at {
            Some(start) if now - start < Duration::seconds(window_secs) => self.posts_in_window,
            _ => 0,
        }
    }

    /// Record a successful post at `now`, rolling the window over when the
    /// previous one has elapsed.
    pub fn record_post(&mut self, now: DateTime<Utc>, window_secs: i64) {
        match self.window_started_at {
            Some(start) if now - start < Duration::seconds(window_secs) => {
                self.posts_in_window += 1;
            }
            _ => {
                self.window_started_at = Some(now);
                self.posts_in_window = 1;
            }
        }
        self.last_post_at = Some(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    QuietHours,
    RateLimited,
}

/// Outcome of a gate evaluation. These are control flow, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostGate {
    Allowed,
    Denied {
        reason: DenyReason,
        next_eligible: DateTime<Utc>,
    },
}

impl PostGate {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PostGate::Allowed)
    }
}

/// Evaluate the gate. Quiet hours are checked first, then the rate window.
pub fn may_post(now: DateTime<Utc>, state: &PostingWindowState, cfg: &PolicyConfig) -> PostGate {
    if in_quiet_hours(now.hour(), cfg.quiet_start_hour, cfg.quiet_end_hour) {
        return PostGate::Denied {
            reason: DenyReason::QuietHours,
            next_eligible: quiet_hours_end(now, cfg),
        };
    }

    if state.effective_count(now, cfg.window_secs) >= cfg.max_posts_per_window {
        // effective_count > 0 implies window_started_at is set and current.
        let start = state.window_started_at.unwrap_or(now);
        return PostGate::Denied {
            reason: DenyReason::RateLimited,
            next_eligible: start + Duration::seconds(cfg.window_secs),
        };
    }

    PostGate::Allowed
}

fn in_quiet_hours(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        return false; // zero-length interval disables quiet hours
    }
    if start < end {
        start <= hour && hour < end
    } else {
        // Overnight interval, e.g. 23 -> 7.
        hour >= start || hour < end
    }
}

/// First instant past the quiet interval containing `now`: today's end hour
/// when it is still ahead, otherwise tomorrow's.
fn quiet_hours_end(now: DateTime<Utc>, cfg: &PolicyConfig) -> DateTime<Utc> {
    let today_end = now
        .date_naive()
        .and_hms_opt(cfg.quiet_end_hour, 0, 0)
        .expect("valid quiet end hour")
        .and_utc();
    if today_end > now {
        today_end
    } else {
        today_end + Duration::days(1)
    }
}
