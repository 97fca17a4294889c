use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::catalog::{Language, LanguageFilter, Mode};
use crate::error::Result;
use crate::reporter::{Aggregate, HistoryRow, LeaderboardRow, ResultSink, StatsStore, UserId};
use crate::snippet::Snippet;
use crate::wire::{ResultSubmission, SubmitResponse};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS snippets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code_text TEXT NOT NULL,
        language TEXT NOT NULL,
        difficulty TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        snippet_id INTEGER NOT NULL,
        wpm INTEGER NOT NULL,
        cpm INTEGER NOT NULL,
        language TEXT NOT NULL,
        mode TEXT NOT NULL,
        accuracy REAL NOT NULL,
        time_taken INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_snippets_lookup ON snippets(difficulty, language);
    CREATE INDEX IF NOT EXISTS idx_results_user ON results(user_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_results_rank ON results(mode, wpm, accuracy, time_taken);
"#;

impl ToSql for Mode {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Mode {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_str()?;
        Mode::parse(code).ok_or_else(|| FromSqlError::Other(format!("unknown mode {code:?}").into()))
    }
}

impl ToSql for Language {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Language {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_str()?;
        Language::parse(code)
            .ok_or_else(|| FromSqlError::Other(format!("unknown language {code:?}").into()))
    }
}

/// Sortable UTC timestamp text.
fn timestamp_text(at: DateTime<Local>) -> String {
    at.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Local>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|at| at.with_timezone(&Local))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

/// Speed columns are `u32` on the read side; negative or oversized rows saturate.
fn speed(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn seconds(value: i64) -> u64 {
    value.max(0).unsigned_abs()
}

/// SQLite persistence for users, snippets and results.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`, including its parent directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened result store");
        Self::init(conn)
    }

    /// Opens the database under the state directory.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        AppDirs::db_path().unwrap_or_else(|| PathBuf::from("typepro_results.db"))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Id of the user called `username`, creating the user on first use.
    pub fn ensure_user(&self, username: &str) -> Result<UserId> {
        self.conn.execute(
            "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, timestamp_text(Local::now())],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )?;
        Ok(UserId(id))
    }

    pub fn insert_snippet(&self, text: &str, language: Language, mode: Mode) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO snippets (code_text, language, difficulty) VALUES (?1, ?2, ?3)",
            params![text, language, mode],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn snippet_count(&self) -> Result<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM snippets", [], |row| row.get(0))?)
    }

    /// A random snippet of `mode` in one of the languages `filter` admits.
    pub fn random_snippet(&self, filter: LanguageFilter, mode: Mode) -> Result<Option<Snippet>> {
        let languages = filter.languages();
        let placeholders = vec!["?"; languages.len()].join(", ");
        let sql = format!(
            "SELECT id, code_text, language FROM snippets \
             WHERE difficulty = ? AND language IN ({placeholders}) \
             ORDER BY RANDOM() LIMIT 1"
        );

        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(languages.len() + 1);
        values.push(&mode);
        for language in &languages {
            values.push(language);
        }

        let snippet = self
            .conn
            .query_row(&sql, params_from_iter(values), |row| {
                Ok(Snippet {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    language: row.get(2)?,
                })
            })
            .optional()?;
        Ok(snippet)
    }

    pub fn insert_result(&self, user: UserId, submission: &ResultSubmission) -> Result<i64> {
        self.insert_result_at(user, submission, Local::now())
    }

    pub fn insert_result_at(
        &self,
        user: UserId,
        submission: &ResultSubmission,
        at: DateTime<Local>,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO results
            (user_id, snippet_id, wpm, cpm, language, mode, accuracy, time_taken, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                user.0,
                submission.snippet_id,
                submission.wpm.clamp(0, i64::from(u32::MAX)),
                submission.cpm.clamp(0, i64::from(u32::MAX)),
                submission.selected_lang,
                submission.mode,
                submission.accuracy,
                submission.time_taken.max(0),
                timestamp_text(at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

impl ResultSink for SqliteStore {
    fn submit(&self, user: UserId, submission: &ResultSubmission) -> SubmitResponse {
        match self.insert_result(user, submission) {
            Ok(id) => {
                debug!(id, user = user.0, "result stored");
                SubmitResponse::ok()
            }
            Err(err) => {
                warn!(error = %err, user = user.0, "failed to store result");
                SubmitResponse::failure(err.to_string())
            }
        }
    }
}

impl StatsStore for SqliteStore {
    fn aggregate(&self, user: UserId, mode: Option<Mode>) -> Result<Aggregate> {
        let aggregate = self.conn.query_row(
            r#"
            SELECT
                COUNT(*),
                AVG(wpm),
                AVG(accuracy),
                AVG(time_taken),
                MAX(wpm),
                MAX(accuracy),
                MIN(time_taken)
            FROM results
            WHERE user_id = ?1 AND (?2 IS NULL OR mode = ?2)
            "#,
            params![user.0, mode],
            |row| {
                Ok(Aggregate {
                    total_tests: row.get(0)?,
                    avg_wpm: row.get(1)?,
                    avg_accuracy: row.get(2)?,
                    avg_time: row.get(3)?,
                    best_wpm: row.get::<_, Option<i64>>(4)?.map(speed),
                    best_accuracy: row.get(5)?,
                    best_time: row.get::<_, Option<i64>>(6)?.map(seconds),
                })
            },
        )?;
        Ok(aggregate)
    }

    fn history(&self, user: UserId, mode: Option<Mode>, limit: usize) -> Result<Vec<HistoryRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT wpm, accuracy, time_taken, language, mode, created_at
            FROM results
            WHERE user_id = ?1 AND (?2 IS NULL OR mode = ?2)
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            "#,
        )?;

        let rows = stmt.query_map(params![user.0, mode, limit], |row| {
            Ok(HistoryRow {
                wpm: speed(row.get(0)?),
                accuracy: row.get(1)?,
                time_taken: seconds(row.get(2)?),
                language: row.get(3)?,
                mode: row.get(4)?,
                created_at: timestamp_column(row, 5)?,
            })
        })?;

        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }

    fn leaderboard(&self, mode: Option<Mode>, limit: usize) -> Result<Vec<LeaderboardRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.username, r.wpm, r.accuracy, r.time_taken, r.language, r.mode, r.created_at
            FROM results r
            LEFT JOIN users u ON r.user_id = u.id
            WHERE (?1 IS NULL OR r.mode = ?1)
            ORDER BY r.wpm DESC, r.accuracy DESC, r.time_taken ASC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![mode, limit], |row| {
            Ok(LeaderboardRow {
                username: row.get(0)?,
                wpm: speed(row.get(1)?),
                accuracy: row.get(2)?,
                time_taken: seconds(row.get(3)?),
                language: row.get(4)?,
                mode: row.get(5)?,
                created_at: timestamp_column(row, 6)?,
            })
        })?;

        let mut board = Vec::new();
        for row in rows {
            board.push(row?);
        }
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter;
    use chrono::Duration;
    use tempfile::tempdir;

    fn submission(wpm: i64, accuracy: f64, time_taken: i64, mode: &str) -> ResultSubmission {
        ResultSubmission {
            snippet_id: 1,
            wpm,
            cpm: wpm * 5,
            accuracy,
            time_taken,
            selected_lang: "js".into(),
            mode: mode.into(),
        }
    }

    #[test]
    fn ensure_user_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.ensure_user("ada").unwrap();
        let again = store.ensure_user("ada").unwrap();
        let other = store.ensure_user("grace").unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("results.db");
        let store = SqliteStore::open(&path).unwrap();
        store.ensure_user("ada").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn random_snippet_respects_mode_and_language() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_snippet("a {}", Language::Css, Mode::Pro).unwrap();
        let id = store
            .insert_snippet("<p></p>", Language::Html, Mode::Normal)
            .unwrap();

        let picked = store
            .random_snippet(LanguageFilter::Only(Language::Html), Mode::Normal)
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, id);
        assert_eq!(picked.language, Language::Html);

        assert!(store
            .random_snippet(LanguageFilter::Only(Language::Css), Mode::Normal)
            .unwrap()
            .is_none());
        assert!(store
            .random_snippet(LanguageFilter::Mixed, Mode::Pro)
            .unwrap()
            .is_some());
        assert_eq!(store.snippet_count().unwrap(), 2);
    }

    #[test]
    fn submit_acknowledges_success() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = store.ensure_user("ada").unwrap();
        let response = store.submit(user, &submission(50, 95.0, 30, "normal"));
        assert_eq!(response, SubmitResponse::ok());
        assert_eq!(store.aggregate(user, None).unwrap().total_tests, 1);
    }

    #[test]
    fn submit_reports_storage_failure() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.conn.execute_batch("DROP TABLE results").unwrap();
        let response = store.submit(UserId(1), &submission(50, 95.0, 30, "normal"));
        assert!(!response.success);
        assert!(response.error.unwrap().contains("results"));
    }

    #[test]
    fn aggregate_over_user_results() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ada = store.ensure_user("ada").unwrap();
        let grace = store.ensure_user("grace").unwrap();
        store.insert_result(ada, &submission(40, 90.0, 60, "normal")).unwrap();
        store.insert_result(ada, &submission(60, 100.0, 20, "pro")).unwrap();
        store.insert_result(grace, &submission(99, 99.0, 10, "pro")).unwrap();

        let all = store.aggregate(ada, None).unwrap();
        assert_eq!(all.total_tests, 2);
        assert_eq!(all.avg_wpm, Some(50.0));
        assert_eq!(all.avg_accuracy, Some(95.0));
        assert_eq!(all.avg_time, Some(40.0));
        assert_eq!(all.best_wpm, Some(60));
        assert_eq!(all.best_accuracy, Some(100.0));
        assert_eq!(all.best_time, Some(20));

        let pro = store.aggregate(ada, Some(Mode::Pro)).unwrap();
        assert_eq!(pro.total_tests, 1);
        assert_eq!(pro.best_time, Some(20));

        let empty = store.aggregate(ada, Some(Mode::Expert)).unwrap();
        assert_eq!(empty.total_tests, 0);
        assert_eq!(empty.avg_wpm, None);
        assert_eq!(empty.best_wpm, None);
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ada = store.ensure_user("ada").unwrap();
        let base = Local::now();
        for i in 0..12 {
            store
                .insert_result_at(
                    ada,
                    &submission(30 + i, 90.0, 60, "normal"),
                    base + Duration::seconds(i),
                )
                .unwrap();
        }

        let history = store.history(ada, None, reporter::HISTORY_LIMIT).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].wpm, 41);
        assert_eq!(history[9].wpm, 32);

        let stats = reporter::user_statistics(&store, ada, None).unwrap();
        assert_eq!(stats.improvement.unwrap().wpm, 1);
    }

    #[test]
    fn leaderboard_orders_and_joins_usernames() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ada = store.ensure_user("ada").unwrap();
        let grace = store.ensure_user("grace").unwrap();
        store.insert_result(ada, &submission(80, 95.0, 30, "normal")).unwrap();
        store.insert_result(grace, &submission(80, 98.0, 25, "normal")).unwrap();
        store.insert_result(UserId(404), &submission(90, 50.0, 40, "pro")).unwrap();

        let board = reporter::leaderboard(&store, None).unwrap();
        let summary: Vec<_> = board
            .iter()
            .map(|r| (r.username.as_deref(), r.wpm, r.accuracy))
            .collect();
        assert_eq!(
            summary,
            vec![
                (None, 90, 50.0),
                (Some("grace"), 80, 98.0),
                (Some("ada"), 80, 95.0),
            ]
        );

        let normal_only = reporter::leaderboard(&store, Some("normal")).unwrap();
        assert_eq!(normal_only.len(), 2);
    }

    #[test]
    fn mode_and_language_columns_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (mode, language): (Mode, Language) = store
            .conn
            .query_row("SELECT ?1, ?2", params![Mode::Expert, Language::Cpp], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(mode, Mode::Expert);
        assert_eq!(language, Language::Cpp);

        let bad: rusqlite::Result<Mode> =
            store.conn.query_row("SELECT 'legendary'", [], |row| row.get(0));
        assert!(bad.is_err());
    }

    #[test]
    fn negative_submissions_are_stored_as_zero_and_still_rank() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ada = store.ensure_user("ada").unwrap();
        store.insert_result(ada, &submission(50, 95.0, 30, "normal")).unwrap();
        let ack = store.submit(
            ada,
            &crate::wire::decode_submission(
                r#"{"wpm":-5,"cpm":"-25","accuracy":90,"time_taken":-3,"mode":"normal"}"#,
            ),
        );
        assert!(ack.success);

        let (wpm, cpm, time_taken): (i64, i64, i64) = store
            .conn
            .query_row(
                "SELECT wpm, cpm, time_taken FROM results ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((wpm, cpm, time_taken), (0, 0, 0));

        let board = reporter::leaderboard(&store, None).unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[1].wpm, 0);

        let stats = reporter::user_statistics(&store, ada, Some("normal")).unwrap();
        assert_eq!(stats.totals.tests, 2);
        assert_eq!(stats.best.unwrap().time_taken, 0);
        assert_eq!(stats.improvement.unwrap().wpm, -50);
    }

    #[test]
    fn out_of_range_rows_already_on_disk_are_read_saturated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ada = store.ensure_user("ada").unwrap();
        store
            .conn
            .execute(
                "INSERT INTO results \
                 (user_id, snippet_id, wpm, cpm, language, mode, accuracy, time_taken, created_at) \
                 VALUES (?1, 0, -7, 0, 'js', 'normal', 80.0, -2, ?2), \
                        (?1, 0, 9999999999, 0, 'js', 'normal', 80.0, 5, ?2)",
                params![ada.0, timestamp_text(Local::now())],
            )
            .unwrap();

        let board = reporter::leaderboard(&store, Some("normal")).unwrap();
        let speeds: Vec<_> = board.iter().map(|r| (r.wpm, r.time_taken)).collect();
        assert_eq!(speeds, vec![(u32::MAX, 5), (0, 0)]);

        let aggregate = store.aggregate(ada, None).unwrap();
        assert_eq!(aggregate.best_wpm, Some(u32::MAX));
        assert_eq!(aggregate.best_time, Some(0));
    }
}
