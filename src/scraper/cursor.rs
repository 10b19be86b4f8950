use crate::error::ScrapeError;
use crate::storage::Store;
use crate::version::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};

/// Oldest timestamp supported by the index API
pub const BEGINNING_OF_TIME: &str = "2019-04-10T19:08:52.997264Z";

pub fn beginning_of_time() -> DateTime<Utc> {
    parse_timestamp(BEGINNING_OF_TIME).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Resume point for the index poller.
///
/// A database the pipeline has run against carries a saved cursor, which only
/// ever covers fully committed pages. Without one, the newest stored timestamp
/// is used, and an empty database starts at the index epoch.
pub fn resolve_cursor(store: &Store) -> Result<DateTime<Utc>, ScrapeError> {
    if let Some(ts) = store.resume_cursor()? {
        log::info!("⏩ Resuming from saved cursor {}", format_timestamp(&ts));
        return Ok(ts);
    }

    match store.latest_timestamp()? {
        Some(ts) => {
            log::info!("⏩ Resuming from stored watermark {}", format_timestamp(&ts));
            Ok(ts)
        }
        None => {
            log::info!("🆕 Empty database, starting from {}", BEGINNING_OF_TIME);
            Ok(beginning_of_time())
        }
    }
}
