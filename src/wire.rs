//! JSON shapes exchanged with a result sink and returned by the read side.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::reporter::{HistoryRow, Improvement, LeaderboardRow, ResultRecord, UserStatistics};

/// Result payload as submitted for persistence. Field order is part of the contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSubmission {
    pub snippet_id: i64,
    pub wpm: i64,
    pub cpm: i64,
    #[serde(serialize_with = "compact_float")]
    pub accuracy: f64,
    pub time_taken: i64,
    pub selected_lang: String,
    pub mode: String,
}

impl Default for ResultSubmission {
    fn default() -> Self {
        Self {
            snippet_id: 0,
            wpm: 0,
            cpm: 0,
            accuracy: 0.0,
            time_taken: 0,
            selected_lang: "mixed".to_string(),
            mode: "normal".to_string(),
        }
    }
}

impl From<&ResultRecord> for ResultSubmission {
    fn from(record: &ResultRecord) -> Self {
        Self {
            snippet_id: record.snippet_id,
            wpm: i64::from(record.wpm),
            cpm: i64::from(record.cpm),
            accuracy: record.accuracy,
            time_taken: i64::try_from(record.time_taken_seconds).unwrap_or(i64::MAX),
            selected_lang: record.language.as_str().to_string(),
            mode: record.mode.as_str().to_string(),
        }
    }
}

/// Integral floats go out as integers (`67`, not `67.0`), matching what browsers send.
fn compact_float<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

/// Decodes a submission body without ever rejecting it.
///
/// Missing or malformed fields take their defaults; numeric fields accept numbers,
/// numeric strings and booleans and truncate toward zero. A body that is not a JSON
/// object decodes to all defaults.
pub fn decode_submission(body: &str) -> ResultSubmission {
    let defaults = ResultSubmission::default();
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) else {
        return defaults;
    };

    let int = |key: &str| fields.get(key).map(coerce_int).unwrap_or(0);
    let text = |key: &str, default: String| match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => if *b { "1".to_string() } else { String::new() },
        _ => default,
    };

    ResultSubmission {
        snippet_id: int("snippet_id"),
        wpm: int("wpm"),
        cpm: int("cpm"),
        accuracy: fields.get("accuracy").map(coerce_float).unwrap_or(0.0),
        time_taken: int("time_taken"),
        selected_lang: text("selected_lang", defaults.selected_lang),
        mode: text("mode", defaults.mode),
    }
}

fn coerce_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => leading_number(s),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

fn coerce_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().map(|f| f.trunc() as i64).unwrap_or(0)),
        other => coerce_float(other).trunc() as i64,
    }
}

/// Numeric prefix of `s` after leading whitespace, or 0 when there is none.
fn leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => {}
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    s[..end].parse().unwrap_or(0.0)
}

/// Acknowledgement for a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl SubmitResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsBody {
    pub total_tests: u64,
    pub avg_wpm: Option<f64>,
    pub avg_accuracy: Option<f64>,
    pub avg_time: Option<f64>,
    pub best_wpm: Option<u32>,
    pub best_accuracy: Option<f64>,
    pub best_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: StatsBody,
    pub history: Vec<HistoryRow>,
    /// Zero when fewer than two results exist.
    pub improvement: Improvement,
}

impl From<&UserStatistics> for StatsResponse {
    fn from(stats: &UserStatistics) -> Self {
        Self {
            success: true,
            stats: StatsBody {
                total_tests: stats.totals.tests,
                avg_wpm: stats.averages.map(|a| a.wpm),
                avg_accuracy: stats.averages.map(|a| a.accuracy),
                avg_time: stats.averages.map(|a| a.time_taken),
                best_wpm: stats.best.map(|b| b.wpm),
                best_accuracy: stats.best.map(|b| b.accuracy),
                best_time: stats.best.map(|b| b.time_taken),
            },
            history: stats.recent.clone(),
            improvement: stats.improvement.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardResponse {
    pub success: bool,
    pub results: Vec<LeaderboardRow>,
}

impl From<Vec<LeaderboardRow>> for LeaderboardResponse {
    fn from(results: Vec<LeaderboardRow>) -> Self {
        Self {
            success: true,
            results,
        }
    }
}
