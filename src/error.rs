use thiserror::Error;

/// Errors surfaced by the engine and its storage collaborators.
///
/// The diff engine and metrics calculator are total and never produce one of these.
#[derive(Debug, Error)]
pub enum Error {
    /// A session was requested against an empty target text.
    #[error("cannot start a session against an empty target text")]
    EmptyTarget,

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The embedded fallback snippet set is missing or malformed.
    #[error("invalid fallback snippet set: {0}")]
    InvalidSnippetSet(String),

    /// The background submission worker has shut down.
    #[error("result submission worker has stopped")]
    WorkerGone,
}

pub type Result<T> = std::result::Result<T, Error>;
