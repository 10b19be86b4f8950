//! Error taxonomy for the scrape pipeline
//!
//! Every variant is fatal. Stages never absorb an error locally: they hand it to
//! the coordinator, which ends the run. Restarting resumes from the last
//! committed watermark.

use chrono::{DateTime, Utc};

#[derive(Debug)]
pub enum ScrapeError {
    /// Connection failure, timeout, or a body that could not be read
    Transport(reqwest::Error),
    /// Unexpected HTTP status from the index or the proxy
    Protocol { url: String, status: u16 },
    /// Malformed index record
    Decode { line: usize, message: String },
    /// Open, query, exec or commit failure
    Storage(rusqlite::Error),
    /// Filesystem failure while preparing the database location
    Io(std::io::Error),
    /// Stored watermark that does not parse back into a timestamp
    InvalidTimestamp(String),
    /// A full page ended on the cursor it was requested with
    StalledCursor(DateTime<Utc>),
    /// Stage stopped because another stage failed first
    Aborted,
    /// Stage task panicked or was cancelled by the runtime
    Task(String),
}

impl ScrapeError {
    /// Errors raised in reaction to a failure elsewhere, not a root cause.
    pub fn is_abort(&self) -> bool {
        matches!(self, ScrapeError::Aborted)
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        ScrapeError::Transport(err)
    }
}

impl From<rusqlite::Error> for ScrapeError {
    fn from(err: rusqlite::Error) -> Self {
        ScrapeError::Storage(err)
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(err: std::io::Error) -> Self {
        ScrapeError::Io(err)
    }
}

impl From<tokio::task::JoinError> for ScrapeError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScrapeError::Task(err.to_string())
    }
}

impl std::fmt::Display for ScrapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeError::Transport(e) => write!(f, "Transport error: {}", e),
            ScrapeError::Protocol { url, status } => {
                write!(f, "Unexpected HTTP status {} from {}", status, url)
            }
            ScrapeError::Decode { line, message } => {
                write!(f, "Decode error on line {}: {}", line, message)
            }
            ScrapeError::Storage(e) => write!(f, "Storage error: {}", e),
            ScrapeError::Io(e) => write!(f, "IO error: {}", e),
            ScrapeError::InvalidTimestamp(raw) => write!(f, "Invalid stored timestamp: {}", raw),
            ScrapeError::StalledCursor(ts) => {
                write!(f, "Index cursor stalled at {} (full page with a single timestamp)", ts)
            }
            ScrapeError::Aborted => write!(f, "Stage aborted after a failure elsewhere"),
            ScrapeError::Task(msg) => write!(f, "Stage task failed: {}", msg),
        }
    }
}

impl std::error::Error for ScrapeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScrapeError::Transport(e) => Some(e),
            ScrapeError::Storage(e) => Some(e),
            ScrapeError::Io(e) => Some(e),
            _ => None,
        }
    }
}
