//! Turns finished sessions into result records and shapes the read side: per-user
//! statistics and the cross-user leaderboard.
//!
//! Persistence itself belongs to a [`ResultSink`]; [`Submitter`] runs one on a worker
//! thread so a slow or failing store never holds up input or the result screen.

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::catalog::{Language, Mode};
use crate::error::{Error, Result};
use crate::metrics::{self, ScoreSnapshot};
use crate::session::Session;
use crate::wire::{ResultSubmission, SubmitResponse};

/// Most recent results shown in a user's history.
pub const HISTORY_LIMIT: usize = 10;
/// Rows returned by the leaderboard.
pub const LEADERBOARD_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Final outcome of one completed or timed-out session. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub snippet_id: i64,
    pub wpm: u32,
    pub cpm: u32,
    pub accuracy: f64,
    pub time_taken_seconds: u64,
    pub language: Language,
    pub mode: Mode,
    pub timestamp: DateTime<Local>,
}

/// Packages the final score of `session`. `now` is the moment of the finishing transition.
pub fn report(session: &Session, snapshot: &ScoreSnapshot, now: SystemTime) -> ResultRecord {
    let minutes = metrics::elapsed_minutes(session.clock(), now);
    ResultRecord {
        snippet_id: session.snippet().id,
        wpm: snapshot.wpm,
        cpm: metrics::cpm(snapshot.correct_count, minutes),
        accuracy: f64::from(snapshot.accuracy),
        time_taken_seconds: snapshot.elapsed_seconds,
        language: session.snippet().language,
        mode: session.mode(),
        timestamp: DateTime::<Local>::from(now),
    }
}

/// Accepts result submissions for a user and acknowledges each one.
pub trait ResultSink {
    fn submit(&self, user: UserId, submission: &ResultSubmission) -> SubmitResponse;
}

/// Raw aggregate over a user's results, as the store computes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub total_tests: u64,
    pub avg_wpm: Option<f64>,
    pub avg_accuracy: Option<f64>,
    pub avg_time: Option<f64>,
    pub best_wpm: Option<u32>,
    pub best_accuracy: Option<f64>,
    pub best_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub wpm: u32,
    pub accuracy: f64,
    pub time_taken: u64,
    pub language: String,
    pub mode: String,
    pub created_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    /// Absent when the result's user no longer exists.
    pub username: Option<String>,
    pub wpm: u32,
    pub accuracy: f64,
    pub time_taken: u64,
    pub language: String,
    pub mode: String,
    pub created_at: DateTime<Local>,
}

/// Read queries backing statistics and the leaderboard.
pub trait StatsStore {
    fn aggregate(&self, user: UserId, mode: Option<Mode>) -> Result<Aggregate>;
    /// Newest first.
    fn history(&self, user: UserId, mode: Option<Mode>, limit: usize) -> Result<Vec<HistoryRow>>;
    fn leaderboard(&self, mode: Option<Mode>, limit: usize) -> Result<Vec<LeaderboardRow>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub tests: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Averages {
    pub wpm: f64,
    pub accuracy: f64,
    pub time_taken: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestValues {
    pub wpm: u32,
    pub accuracy: f64,
    /// Shortest time taken.
    pub time_taken: u64,
}

/// Signed change from the previous result to the latest one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Improvement {
    pub wpm: i64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStatistics {
    pub mode_filter: Option<Mode>,
    pub totals: Totals,
    pub averages: Option<Averages>,
    pub best: Option<BestValues>,
    /// At most [`HISTORY_LIMIT`] rows, newest first.
    pub recent: Vec<HistoryRow>,
    /// Present only with at least two results in history.
    pub improvement: Option<Improvement>,
}

/// Latest minus previous, for history ordered newest first.
pub fn improvement(history: &[HistoryRow]) -> Option<Improvement> {
    match history {
        [latest, previous, ..] => Some(Improvement {
            wpm: i64::from(latest.wpm) - i64::from(previous.wpm),
            accuracy: latest.accuracy - previous.accuracy,
        }),
        _ => None,
    }
}

/// Ranking order: wpm descending, then accuracy descending, then time taken ascending.
pub fn leaderboard_order(a: &LeaderboardRow, b: &LeaderboardRow) -> Ordering {
    b.wpm
        .cmp(&a.wpm)
        .then_with(|| b.accuracy.total_cmp(&a.accuracy))
        .then_with(|| a.time_taken.cmp(&b.time_taken))
}

/// Sorts rows into ranking order and keeps the top [`LEADERBOARD_LIMIT`].
pub fn rank(rows: Vec<LeaderboardRow>) -> Vec<LeaderboardRow> {
    rows.into_iter()
        .sorted_by(leaderboard_order)
        .take(LEADERBOARD_LIMIT)
        .collect()
}

/// Statistics for `user`, optionally restricted to one mode. Unknown filters mean all modes.
pub fn user_statistics<S: StatsStore + ?Sized>(
    store: &S,
    user: UserId,
    mode_filter: Option<&str>,
) -> Result<UserStatistics> {
    let mode = Mode::filter(mode_filter);
    let aggregate = store.aggregate(user, mode)?;
    let mut recent = store.history(user, mode, HISTORY_LIMIT)?;
    recent.truncate(HISTORY_LIMIT);

    let averages = match (aggregate.avg_wpm, aggregate.avg_accuracy, aggregate.avg_time) {
        (Some(wpm), Some(accuracy), Some(time_taken)) if aggregate.total_tests > 0 => {
            Some(Averages {
                wpm,
                accuracy,
                time_taken,
            })
        }
        _ => None,
    };
    let best = match (aggregate.best_wpm, aggregate.best_accuracy, aggregate.best_time) {
        (Some(wpm), Some(accuracy), Some(time_taken)) if aggregate.total_tests > 0 => {
            Some(BestValues {
                wpm,
                accuracy,
                time_taken,
            })
        }
        _ => None,
    };

    Ok(UserStatistics {
        mode_filter: mode,
        totals: Totals {
            tests: aggregate.total_tests,
        },
        averages,
        best,
        improvement: improvement(&recent),
        recent,
    })
}

/// Top results across all users, optionally restricted to one mode.
pub fn leaderboard<S: StatsStore + ?Sized>(
    store: &S,
    mode_filter: Option<&str>,
) -> Result<Vec<LeaderboardRow>> {
    let mode = Mode::filter(mode_filter);
    Ok(rank(store.leaderboard(mode, LEADERBOARD_LIMIT)?))
}

struct Job {
    user: UserId,
    submission: ResultSubmission,
}

/// Runs a [`ResultSink`] on a worker thread.
///
/// Each record is submitted exactly once; failures are logged and acknowledged, never
/// retried.
pub struct Submitter {
    jobs: Option<Sender<Job>>,
    acks: Receiver<SubmitResponse>,
    worker: Option<JoinHandle<()>>,
}

impl Submitter {
    pub fn spawn<S: ResultSink + Send + 'static>(sink: S) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (acks_tx, acks_rx) = mpsc::channel();

        let worker = thread::spawn(move || {
            for job in jobs_rx {
                let response = sink.submit(job.user, &job.submission);
                if response.success {
                    debug!(
                        user = job.user.0,
                        snippet_id = job.submission.snippet_id,
                        "result saved"
                    );
                } else {
                    warn!(
                        user = job.user.0,
                        error = response.error.as_deref().unwrap_or("unknown"),
                        "result submission failed"
                    );
                }
                if acks_tx.send(response).is_err() {
                    break;
                }
            }
        });

        Self {
            jobs: Some(jobs_tx),
            acks: acks_rx,
            worker: Some(worker),
        }
    }

    /// Queues `record` for persistence and returns immediately.
    pub fn submit(&self, user: UserId, record: &ResultRecord) -> Result<()> {
        let job = Job {
            user,
            submission: ResultSubmission::from(record),
        };
        self.jobs
            .as_ref()
            .ok_or(Error::WorkerGone)?
            .send(job)
            .map_err(|_| Error::WorkerGone)
    }

    /// Next acknowledgement, if one has arrived.
    pub fn try_ack(&self) -> Option<SubmitResponse> {
        self.acks.try_recv().ok()
    }

    pub fn wait_ack(&self, timeout: Duration) -> Option<SubmitResponse> {
        self.acks.recv_timeout(timeout).ok()
    }

    /// Stops accepting work and waits for queued submissions to finish.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("result submission worker panicked");
            }
        }
    }
}

impl Drop for Submitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
