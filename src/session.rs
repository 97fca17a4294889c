use std::time::SystemTime;
use tracing::{debug, info};

use crate::catalog::Mode;
use crate::clock::{format_seconds, SessionClock, TimeBudget};
use crate::diff::{self, Verdict};
use crate::error::{Error, Result};
use crate::metrics::{self, ScoreSnapshot};
use crate::reporter::{self, ResultRecord};
use crate::snippet::Snippet;
use crate::timer::{Scheduler, TimerHandle, COUNTDOWN_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    /// Terminal. Only replacing the whole session leaves it.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    /// The buffer reached the end of the target.
    Completed,
    /// The countdown ran out.
    TimedOut,
}

/// What an input event or tick did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Nothing changed, e.g. input after the session finished.
    Ignored,
    /// First keystroke: the clock started.
    Started,
    Updated,
    /// The session just finished. Carries the one and only result record.
    Finished(ResultRecord),
}

impl Step {
    pub fn into_record(self) -> Option<ResultRecord> {
        match self {
            Step::Finished(record) => Some(record),
            _ => None,
        }
    }
}

/// Frozen outcome of a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct Finish {
    pub reason: FinishReason,
    pub snapshot: ScoreSnapshot,
    pub record: ResultRecord,
}

/// One attempt at typing one snippet.
///
/// The target text is fixed for the lifetime of the value; a new snippet means a new
/// session.
#[derive(Debug)]
pub struct Session {
    snippet: Snippet,
    target: Vec<char>,
    typed: Vec<char>,
    clock: SessionClock,
    mode: Mode,
    state: SessionState,
    countdown: Option<TimerHandle>,
    finish: Option<Finish>,
}

impl Session {
    /// Fails with [`Error::EmptyTarget`] rather than scoring a zero-length completion.
    pub fn new(snippet: Snippet, budget: TimeBudget, mode: Mode) -> Result<Self> {
        if snippet.text.is_empty() {
            return Err(Error::EmptyTarget);
        }

        Ok(Self {
            target: snippet.text.chars().collect(),
            snippet,
            typed: Vec::new(),
            clock: SessionClock::new(budget),
            mode,
            state: SessionState::Idle,
            countdown: None,
            finish: None,
        })
    }

    pub fn snippet(&self) -> &Snippet {
        &self.snippet
    }

    pub fn target(&self) -> &[char] {
        &self.target
    }

    pub fn typed(&self) -> &[char] {
        &self.typed
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_started(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn has_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    pub fn finish(&self) -> Option<&Finish> {
        self.finish.as_ref()
    }

    pub fn is_countdown_armed(&self) -> bool {
        self.countdown.is_some()
    }

    pub fn verdicts(&self) -> Vec<Verdict> {
        diff::classify(&self.target, &self.typed)
    }

    /// Live score while running; the frozen final score once finished.
    pub fn snapshot(&self, now: SystemTime) -> ScoreSnapshot {
        match &self.finish {
            Some(finish) => finish.snapshot,
            None => metrics::compute_snapshot(&self.target, &self.typed, &self.clock, now),
        }
    }

    /// Fraction of the target covered by the buffer, capped at 1.
    pub fn progress(&self) -> f64 {
        (self.typed.len() as f64 / self.target.len() as f64).min(1.0)
    }

    /// Countdown for bounded budgets, count-up for unbounded ones.
    pub fn time_display(&self, now: SystemTime) -> String {
        if let Some(finish) = &self.finish {
            return format_seconds(finish.snapshot.elapsed_seconds);
        }
        match self.clock.remaining(now) {
            Some(remaining) => {
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                format_seconds(secs)
            }
            None if !self.clock.has_started() => "∞".to_string(),
            None => format_seconds(self.clock.elapsed(now).as_secs()),
        }
    }

    /// Replaces the whole buffer, the way a host input widget reports its value.
    pub fn set_input(&mut self, value: &str, now: SystemTime, scheduler: &dyn Scheduler) -> Step {
        self.apply(value.chars().collect(), now, scheduler)
    }

    pub fn type_char(&mut self, c: char, now: SystemTime, scheduler: &dyn Scheduler) -> Step {
        let mut typed = self.typed.clone();
        typed.push(c);
        self.apply(typed, now, scheduler)
    }

    pub fn backspace(&mut self, now: SystemTime, scheduler: &dyn Scheduler) -> Step {
        if self.typed.is_empty() {
            return Step::Ignored;
        }
        let mut typed = self.typed.clone();
        typed.pop();
        self.apply(typed, now, scheduler)
    }

    /// Countdown tick. Finishes the session once the budget is spent.
    pub fn on_tick(&mut self, now: SystemTime) -> Step {
        if self.state != SessionState::Running {
            return Step::Ignored;
        }
        if self.clock.is_expired(now) {
            return self.conclude(FinishReason::TimedOut, now);
        }
        Step::Updated
    }

    /// Cancels the countdown of a session that is being replaced before it finished.
    pub fn close(&mut self) {
        if let Some(mut countdown) = self.countdown.take() {
            countdown.cancel();
        }
    }

    fn apply(&mut self, typed: Vec<char>, now: SystemTime, scheduler: &dyn Scheduler) -> Step {
        match self.state {
            SessionState::Finished => return Step::Ignored,
            // a tick may be late; input past the deadline must not extend the session
            SessionState::Running if self.clock.is_expired(now) => {
                return self.conclude(FinishReason::TimedOut, now);
            }
            SessionState::Idle if typed.is_empty() => return Step::Ignored,
            _ => {}
        }

        let started = self.state == SessionState::Idle;
        if started {
            self.clock.start(now);
            self.state = SessionState::Running;
            if self.clock.budget().is_bounded() {
                self.countdown = Some(scheduler.every(COUNTDOWN_INTERVAL));
            }
            debug!(
                snippet_id = self.snippet.id,
                budget = %self.clock.budget().code(),
                "session started"
            );
        }

        self.typed = typed;

        if self.typed.len() >= self.target.len() {
            return self.conclude(FinishReason::Completed, now);
        }

        if started {
            Step::Started
        } else {
            Step::Updated
        }
    }

    /// The single exit into `Finished`. Runs at most once per session.
    fn conclude(&mut self, reason: FinishReason, now: SystemTime) -> Step {
        if self.state == SessionState::Finished {
            return Step::Ignored;
        }

        self.close();
        self.state = SessionState::Finished;

        // a late tick must not stretch the scored time past the budget
        let now = match (reason, self.clock.started_at(), self.clock.budget().limit()) {
            (FinishReason::TimedOut, Some(started), Some(limit)) => now.min(started + limit),
            _ => now,
        };

        let snapshot = metrics::compute_snapshot(&self.target, &self.typed, &self.clock, now);
        let record = reporter::report(self, &snapshot, now);

        info!(
            %reason,
            snippet_id = self.snippet.id,
            wpm = snapshot.wpm,
            accuracy = snapshot.accuracy,
            elapsed_seconds = snapshot.elapsed_seconds,
            "session finished"
        );

        self.finish = Some(Finish {
            reason,
            snapshot,
            record: record.clone(),
        });
        Step::Finished(record)
    }
}
