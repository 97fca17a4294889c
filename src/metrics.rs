use serde::Serialize;
use std::time::SystemTime;

use crate::clock::SessionClock;
use crate::diff;

/// One "word" is five correct characters.
pub const CHARS_PER_WORD: f64 = 5.0;

/// Floor for elapsed minutes once any time has passed (one millisecond).
const MIN_ELAPSED_MINUTES: f64 = 1.0 / 60_000.0;

/// Live or final score of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreSnapshot {
    pub wpm: u32,
    /// Whole percent, 0..=100.
    pub accuracy: u32,
    pub correct_count: usize,
    pub elapsed_seconds: u64,
}

/// Elapsed minutes since the clock started.
///
/// Zero before the first keystroke or when no time has passed at all; otherwise floored at
/// one millisecond so rates stay finite.
pub fn elapsed_minutes(clock: &SessionClock, now: SystemTime) -> f64 {
    let elapsed = clock.elapsed(now);
    if elapsed.is_zero() {
        0.0
    } else {
        (elapsed.as_secs_f64() / 60.0).max(MIN_ELAPSED_MINUTES)
    }
}

pub fn wpm(correct_count: usize, minutes: f64) -> u32 {
    if minutes <= 0.0 {
        return 0;
    }
    ((correct_count as f64 / CHARS_PER_WORD) / minutes).round() as u32
}

pub fn cpm(correct_count: usize, minutes: f64) -> u32 {
    if minutes <= 0.0 {
        return 0;
    }
    (correct_count as f64 / minutes).round() as u32
}

/// Share of typed characters that were correct. An untouched buffer is 100 by convention.
pub fn accuracy(correct_count: usize, typed_len: usize) -> u32 {
    if typed_len == 0 {
        return 100;
    }
    ((correct_count as f64 / typed_len as f64) * 100.0)
        .round()
        .min(100.0) as u32
}

/// Derives the score from the current buffer. Pure and cheap enough for every keystroke.
///
/// Overtyped characters past the end of the target count toward the typed length, so they
/// lower accuracy without ever counting as correct.
pub fn compute_snapshot(
    target: &[char],
    typed: &[char],
    clock: &SessionClock,
    now: SystemTime,
) -> ScoreSnapshot {
    let verdicts = diff::classify(target, typed);
    let correct_count = diff::correct_count(&verdicts);
    let minutes = elapsed_minutes(clock, now);

    ScoreSnapshot {
        wpm: wpm(correct_count, minutes),
        accuracy: accuracy(correct_count, typed.len()),
        correct_count,
        elapsed_seconds: clock.elapsed(now).as_secs_f64().round() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TimeBudget;
    use std::time::Duration;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn started_clock(budget: TimeBudget) -> (SessionClock, SystemTime) {
        let t0 = SystemTime::now();
        let mut clock = SessionClock::new(budget);
        clock.start(t0);
        (clock, t0)
    }

    #[test]
    fn idle_snapshot_is_zero_wpm_and_perfect_accuracy() {
        let clock = SessionClock::new(TimeBudget::default());
        let snapshot = compute_snapshot(&chars("abc"), &[], &clock, SystemTime::now());
        assert_eq!(
            snapshot,
            ScoreSnapshot {
                wpm: 0,
                accuracy: 100,
                correct_count: 0,
                elapsed_seconds: 0,
            }
        );
    }

    #[test]
    fn wpm_is_zero_when_no_time_has_passed() {
        let (clock, t0) = started_clock(TimeBudget::Unbounded);
        let snapshot = compute_snapshot(&chars("abcde"), &chars("abcde"), &clock, t0);
        assert_eq!(snapshot.wpm, 0);
        assert_eq!(snapshot.correct_count, 5);
        assert_eq!(cpm(5, elapsed_minutes(&clock, t0)), 0);
    }

    #[test]
    fn timeout_scenario_scores_four_wpm() {
        let (clock, t0) = started_clock(TimeBudget::Bounded(Duration::from_secs(15)));
        let target = chars("abcdefghijklmnopqrst");
        let snapshot = compute_snapshot(
            &target,
            &chars("abcde"),
            &clock,
            t0 + Duration::from_secs(15),
        );
        assert_eq!(snapshot.wpm, 4);
        assert_eq!(snapshot.accuracy, 100);
        assert_eq!(snapshot.correct_count, 5);
        assert_eq!(snapshot.elapsed_seconds, 15);
    }

    #[test]
    fn accuracy_rounds_half_up() {
        assert_eq!(accuracy(1, 2), 50);
        assert_eq!(accuracy(2, 3), 67);
        assert_eq!(accuracy(1, 8), 13);
        assert_eq!(accuracy(0, 4), 0);
        assert_eq!(accuracy(0, 0), 100);
    }

    #[test]
    fn overtype_lowers_accuracy() {
        let (clock, t0) = started_clock(TimeBudget::Unbounded);
        let snapshot = compute_snapshot(
            &chars("ab"),
            &chars("abcd"),
            &clock,
            t0 + Duration::from_secs(6),
        );
        assert_eq!(snapshot.correct_count, 2);
        assert_eq!(snapshot.accuracy, 50);
    }

    #[test]
    fn accuracy_stays_in_range() {
        let target = chars("let x = 1;");
        for typed in ["", "l", "lex", "let x = 1;", "zzzzzzzzzzzzzz", "let x = 1;;;;"] {
            let (clock, t0) = started_clock(TimeBudget::Unbounded);
            let snapshot =
                compute_snapshot(&target, &chars(typed), &clock, t0 + Duration::from_secs(1));
            assert!(snapshot.accuracy <= 100, "accuracy for {typed:?}");
        }
    }

    #[test]
    fn cpm_and_wpm_from_minutes() {
        assert_eq!(wpm(300, 1.0), 60);
        assert_eq!(cpm(300, 1.0), 300);
        assert_eq!(wpm(10, 0.5), 4);
        assert_eq!(cpm(10, 0.0), 0);
    }

    #[test]
    fn elapsed_minutes_has_a_floor() {
        let (clock, t0) = started_clock(TimeBudget::Unbounded);
        let minutes = elapsed_minutes(&clock, t0 + Duration::from_nanos(10));
        assert_eq!(minutes, MIN_ELAPSED_MINUTES);
        assert_eq!(elapsed_minutes(&clock, t0 + Duration::from_secs(90)), 1.5);
    }
}
