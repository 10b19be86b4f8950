//! Index poller
//!
//! Walks the append-only module index page by page from a starting cursor and
//! feeds every decoded entry, in page order, into the bounded enrichment queue.
//!
//! ## Endpoint
//!
//! `GET {base}/index?limit={L}&since={RFC3339}` returns newline-delimited JSON
//! objects `{Path, Version, Timestamp}` ordered by timestamp, at most `L` lines.
//!
//! ## Cursor rule
//!
//! The next `since` is always the timestamp of the last entry of the page as
//! the index returned it. Enrichment reorders entries downstream, so nothing
//! after this stage may influence the cursor. Each entry carries its
//! [`Position`] so the sink can tell when a page is fully committed.

use super::frontier::Position;
use crate::error::ScrapeError;
use crate::version::{format_timestamp, IndexEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Source of index pages
#[async_trait]
pub trait IndexSource: Send + Sync {
    /// Fetch up to `limit` entries published at or after `since`.
    async fn fetch_page(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>, ScrapeError>;
}

/// HTTP client for the module index
pub struct IndexClient {
    client: reqwest::Client,
    base_url: String,
}

impl IndexClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IndexSource for IndexClient {
    async fn fetch_page(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<IndexEntry>, ScrapeError> {
        let url = format!("{}/index", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit.to_string()), ("since", format_timestamp(&since))])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ScrapeError::Protocol {
                url: response.url().to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        decode_page(&body)
    }
}

/// Decode a newline-delimited JSON page. Blank lines are skipped.
pub fn decode_page(body: &str) -> Result<Vec<IndexEntry>, ScrapeError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<IndexEntry>(line).map_err(|e| ScrapeError::Decode {
                line: idx + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Settings for one poll run
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub page_limit: usize,
    pub scrape_delay: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub pages: u64,
    pub entries: u64,
    /// Cursor the final (short) page was requested with
    pub last_cursor: Option<DateTime<Utc>>,
}

/// Poll the index from `since` until a short page marks the head.
///
/// Entries are numbered from 0 in discovery order and the last entry of each
/// page is marked as closing it.
///
/// The caller owns `tx` and closes the enrichment queue by dropping it, which
/// lets a failure be reported before downstream stages see the end of input.
pub async fn poll_index<S>(
    source: &S,
    since: DateTime<Utc>,
    settings: &PollSettings,
    tx: &mpsc::Sender<(Position, IndexEntry)>,
    shutdown: &CancellationToken,
) -> Result<PollSummary, ScrapeError>
where
    S: IndexSource + ?Sized,
{
    log::info!("🔎 Begin scraping index since {}", format_timestamp(&since));

    let mut cursor = since;
    let mut summary = PollSummary::default();

    loop {
        if shutdown.is_cancelled() {
            return Err(ScrapeError::Aborted);
        }

        let page = source.fetch_page(cursor, settings.page_limit).await?;
        summary.pages += 1;
        summary.last_cursor = Some(cursor);

        let page_len = page.len();
        let next_cursor = page.last().map(|entry| entry.timestamp);

        log::debug!(
            "📄 Page {}: {} entries since {}",
            summary.pages,
            page_len,
            format_timestamp(&cursor)
        );

        for (idx, entry) in page.into_iter().enumerate() {
            let position = Position {
                seq: summary.entries + idx as u64,
                closes_page: idx + 1 == page_len,
            };
            // Blocks while the queue is full
            if tx.send((position, entry)).await.is_err() {
                return Err(ScrapeError::Aborted);
            }
        }
        summary.entries += page_len as u64;

        if summary.pages % 25 == 0 {
            log::info!("📊 Scraped {} pages ({} entries)", summary.pages, summary.entries);
        }

        if page_len < settings.page_limit {
            log::info!(
                "✅ Reached index head after {} pages ({} entries)",
                summary.pages,
                summary.entries
            );
            return Ok(summary);
        }

        match next_cursor {
            Some(next) if next > cursor => cursor = next,
            _ => return Err(ScrapeError::StalledCursor(cursor)),
        }

        if !settings.scrape_delay.is_zero() {
            tokio::time::sleep(settings.scrape_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::parse_timestamp;
    use std::sync::Mutex;

    /// Serves canned pages and records the cursor of every request
    struct ScriptedIndex {
        pages: Mutex<Vec<Vec<IndexEntry>>>,
        requests: Mutex<Vec<DateTime<Utc>>>,
    }

    impl ScriptedIndex {
        fn new(mut pages: Vec<Vec<IndexEntry>>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IndexSource for ScriptedIndex {
        async fn fetch_page(
            &self,
            since: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<IndexEntry>, ScrapeError> {
            self.requests.lock().unwrap().push(since);
            Ok(self.pages.lock().unwrap().pop().unwrap_or_default())
        }
    }

    fn entry(n: i64) -> IndexEntry {
        IndexEntry {
            path: format!("example.com/mod{}", n),
            version: "v1.0.0".to_string(),
            timestamp: DateTime::from_timestamp(1_600_000_000 + n, 0).unwrap(),
        }
    }

    fn settings(limit: usize) -> PollSettings {
        PollSettings {
            page_limit: limit,
            scrape_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_decode_page() {
        let body = concat!(
            r#"{"Path":"a","Version":"v1.0.0","Timestamp":"2019-04-10T19:08:52.997264Z"}"#,
            "\n",
            r#"{"Path":"b","Version":"v0.0.0-x","Timestamp":"2019-04-10T19:08:53Z"}"#,
            "\n"
        );
        let entries = decode_page(body).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "b");
        assert_eq!(entries[1].timestamp, parse_timestamp("2019-04-10T19:08:53Z").unwrap());
    }

    #[test]
    fn test_decode_page_rejects_malformed_line() {
        let body = "{\"Path\":\"a\",\"Version\":\"v1.0.0\",\"Timestamp\":\"2019-04-10T19:08:53Z\"}\nnot json\n";
        match decode_page(body) {
            Err(ScrapeError::Decode { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_page_advances_cursor_short_page_stops() {
        let full: Vec<IndexEntry> = (0..3).map(entry).collect();
        let short: Vec<IndexEntry> = (3..4).map(entry).collect();
        let source = ScriptedIndex::new(vec![full, short]);
        let (tx, mut rx) = mpsc::channel(16);
        let start = DateTime::from_timestamp(1_500_000_000, 0).unwrap();

        let summary = poll_index(&source, start, &settings(3), &tx, &CancellationToken::new())
            .await
            .unwrap();
        drop(tx);

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.entries, 4);
        let requests = source.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![start, entry(2).timestamp]);

        let mut received = Vec::new();
        while let Some((position, e)) = rx.recv().await {
            received.push((position.seq, position.closes_page, e.path));
        }
        let expected: Vec<(u64, bool, String)> = (0..4)
            .map(|n| (n as u64, n == 2 || n == 3, entry(n).path))
            .collect();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_empty_first_page_stops() {
        let source = ScriptedIndex::new(vec![]);
        let (tx, _rx) = mpsc::channel(4);
        let start = DateTime::from_timestamp(1_500_000_000, 0).unwrap();

        let summary = poll_index(&source, start, &settings(2000), &tx, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(summary.entries, 0);
    }

    #[tokio::test]
    async fn test_stalled_cursor_is_fatal() {
        let start = entry(5).timestamp;
        let same_ts: Vec<IndexEntry> = (0..2)
            .map(|n| IndexEntry {
                timestamp: start,
                ..entry(n)
            })
            .collect();
        let source = ScriptedIndex::new(vec![same_ts]);
        let (tx, _rx) = mpsc::channel(4);

        let result = poll_index(&source, start, &settings(2), &tx, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ScrapeError::StalledCursor(ts)) if ts == start));
    }

    #[tokio::test]
    async fn test_cancelled_poll_fetches_nothing() {
        let source = ScriptedIndex::new(vec![vec![entry(1)]]);
        let (tx, _rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        token.cancel();

        let result = poll_index(&source, entry(0).timestamp, &settings(10), &tx, &token).await;
        assert!(matches!(result, Err(ScrapeError::Aborted)));
        assert!(source.requests.lock().unwrap().is_empty());
    }
}
