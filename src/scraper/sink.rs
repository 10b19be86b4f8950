//! Persistence sink
//!
//! Single consumer of the enriched queue and sole owner of the store. Records
//! are grouped into commit batches of `K` inserts, one transaction each, which
//! bounds what a crash can lose to one batch. The tail batch is committed when
//! the queue is exhausted, but never after a failure elsewhere.
//!
//! Each commit also saves the resume cursor of the newest page that is fully
//! committed, as tracked by [`CommitFrontier`]. A record committed ahead of an
//! older one still in flight never moves that cursor past the older one.

use super::frontier::{CommitFrontier, Position};
use super::signal::FailureSignal;
use crate::error::ScrapeError;
use crate::storage::Store;
use crate::version::{format_timestamp, VersionRecord};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Records committed (including ones ignored as duplicates)
    pub written: u64,
    /// Rows that did not exist before
    pub inserted: u64,
    pub commits: u64,
    /// Table size after the final commit
    pub total_rows: u64,
}

/// Pending commit batch
struct Batch {
    records: Vec<VersionRecord>,
    positions: Vec<(Position, DateTime<Utc>)>,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, position: Position, record: VersionRecord) {
        self.positions.push((position, record.timestamp));
        self.records.push(record);
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Drain `rx` into `store` until the queue closes.
///
/// Blocks the calling thread; run it on the blocking pool.
pub fn run_sink(
    store: &mut Store,
    rx: &mut mpsc::Receiver<(Position, VersionRecord)>,
    commit_batch: usize,
    progress: &AtomicU64,
    shutdown: &CancellationToken,
) -> Result<SinkStats, ScrapeError> {
    let mut batch = Batch::with_capacity(commit_batch);
    let mut frontier = CommitFrontier::new();
    let mut stats = SinkStats::default();

    while let Some((position, record)) = rx.blocking_recv() {
        if shutdown.is_cancelled() {
            log::warn!("⚠️  Discarding {} uncommitted records after failure", batch.len());
            return Err(ScrapeError::Aborted);
        }

        batch.push(position, record);
        if batch.len() >= commit_batch {
            commit(store, &mut batch, &mut frontier, &mut stats, progress)?;
        }
    }

    if shutdown.is_cancelled() {
        log::warn!("⚠️  Discarding {} uncommitted records after failure", batch.len());
        return Err(ScrapeError::Aborted);
    }

    commit(store, &mut batch, &mut frontier, &mut stats, progress)?;
    stats.total_rows = store.row_count()?;

    log::info!(
        "✅ Queue drained: {} records written in {} commits ({} new)",
        stats.written,
        stats.commits,
        stats.inserted
    );
    Ok(stats)
}

fn commit(
    store: &mut Store,
    batch: &mut Batch,
    frontier: &mut CommitFrontier,
    stats: &mut SinkStats,
    progress: &AtomicU64,
) -> Result<(), ScrapeError> {
    if batch.is_empty() {
        return Ok(());
    }

    let resume_from = frontier.advance(batch.positions.drain(..));
    let inserted = store.commit_batch(&batch.records, resume_from)?;
    let written = batch.len() as u64;
    batch.records.clear();

    stats.written += written;
    stats.inserted += inserted as u64;
    stats.commits += 1;
    let total = progress.fetch_add(written, Ordering::Relaxed) + written;

    log::info!("💾 Stored {} items ({} new in last batch)", total, inserted);
    match resume_from {
        Some(since) => log::debug!("📌 Resume cursor now {}", format_timestamp(&since)),
        None => log::debug!(
            "📌 Resume cursor held back, {} records wait on an earlier one",
            frontier.waiting()
        ),
    }
    Ok(())
}

/// Move the store onto the blocking pool and drain `rx` there.
///
/// A storage failure is reported through `failures` before the queue is
/// dropped, so it reaches the coordinator ahead of the aborts it causes.
pub fn spawn_sink(
    mut store: Store,
    mut rx: mpsc::Receiver<(Position, VersionRecord)>,
    commit_batch: usize,
    progress: Arc<AtomicU64>,
    failures: FailureSignal,
) -> JoinHandle<Result<SinkStats, ScrapeError>> {
    tokio::task::spawn_blocking(move || {
        let result = run_sink(&mut store, &mut rx, commit_batch, &progress, failures.token());
        match result {
            Err(ScrapeError::Aborted) => Err(ScrapeError::Aborted),
            Err(e) => {
                failures.report("Persistence sink", e);
                Err(ScrapeError::Aborted)
            }
            Ok(stats) => Ok(stats),
        }
    })
}
