use std::time::{Duration, SystemTime};

/// Time allowed for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeBudget {
    Bounded(Duration),
    /// Runs until the whole target is typed; the display counts up instead of down.
    Unbounded,
}

impl TimeBudget {
    /// Accepted timer codes, in menu order.
    pub const CODES: [&'static str; 7] = ["15", "30", "60", "120", "300", "600", "full"];

    pub fn parse(code: &str) -> Option<TimeBudget> {
        match code {
            "full" => Some(TimeBudget::Unbounded),
            "15" | "30" | "60" | "120" | "300" | "600" => code
                .parse::<u64>()
                .ok()
                .map(|secs| TimeBudget::Bounded(Duration::from_secs(secs))),
            _ => None,
        }
    }

    /// Unknown codes fall back to 60 seconds.
    pub fn normalize(code: &str) -> TimeBudget {
        Self::parse(code).unwrap_or_default()
    }

    pub fn code(&self) -> String {
        match self {
            TimeBudget::Bounded(limit) => limit.as_secs().to_string(),
            TimeBudget::Unbounded => "full".to_string(),
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        match self {
            TimeBudget::Bounded(limit) => Some(*limit),
            TimeBudget::Unbounded => None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self, TimeBudget::Bounded(_))
    }
}

impl Default for TimeBudget {
    fn default() -> Self {
        TimeBudget::Bounded(Duration::from_secs(60))
    }
}

/// Wall-clock bookkeeping for one session.
///
/// The clock starts on the first keystroke, not when the session is created, so idle time
/// before typing begins never counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionClock {
    started_at: Option<SystemTime>,
    budget: TimeBudget,
}

impl SessionClock {
    pub fn new(budget: TimeBudget) -> Self {
        Self {
            started_at: None,
            budget,
        }
    }

    /// Sets the start timestamp. Later calls leave the first one in place.
    pub fn start(&mut self, now: SystemTime) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn budget(&self) -> TimeBudget {
        self.budget
    }

    /// Zero before the first keystroke. A clock stepping backwards also reads as zero.
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        self.started_at
            .map(|start| now.duration_since(start).unwrap_or_default())
            .unwrap_or_default()
    }

    /// Remaining budget, or `None` when unbounded. Never negative.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        self.budget
            .limit()
            .map(|limit| limit.saturating_sub(self.elapsed(now)))
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.has_started() && self.remaining(now) == Some(Duration::ZERO)
    }
}

/// Formats whole seconds as `S`, `M:SS` or `H:MM:SS`.
pub fn format_seconds(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else if m > 0 {
        format!("{m}:{s:02}")
    } else {
        s.to_string()
    }
}
