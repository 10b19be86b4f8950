//! Pipeline coordinator
//!
//! Wires index poller → bounded queue → enrichment pool → bounded queue →
//! persistence sink and decides when the run is over:
//! - the sink drained the final queue: success
//! - any stage reported a failure: the first error ends the run
//!
//! There is no retry and no partial cancellation protocol. On failure the
//! shared token stops every stage from taking new work; requests already in
//! flight are left to finish on their own.

use super::cursor::resolve_cursor;
use super::enrich::{spawn_pool, Enricher, WorkerStats};
use super::frontier::Position;
use super::index::{poll_index, IndexSource, PollSettings};
use super::proxy::ManifestSource;
use super::signal::FailureSignal;
use super::sink::spawn_sink;
use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::storage::Store;
use crate::version::{format_timestamp, IndexEntry, VersionClassifier, VersionRecord};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Fixed operational constants for one run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub page_limit: usize,
    pub workers: usize,
    pub commit_batch: usize,
    pub queue_capacity: usize,
    pub scrape_delay: Duration,
}

impl From<&ScraperConfig> for PipelineSettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            page_limit: config.page_limit,
            workers: config.workers,
            commit_batch: config.commit_batch,
            queue_capacity: config.queue_capacity,
            scrape_delay: config.scrape_delay,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Cursor the run started from
    pub since: DateTime<Utc>,
    pub pages: u64,
    pub discovered: u64,
    pub enriched: u64,
    pub manifests_fetched: u64,
    pub written: u64,
    pub inserted: u64,
    pub total_rows: u64,
}

pub struct Pipeline {
    index: Arc<dyn IndexSource>,
    manifests: Arc<dyn ManifestSource>,
    classifier: Arc<VersionClassifier>,
    settings: PipelineSettings,
    progress: Arc<AtomicU64>,
}

impl Pipeline {
    pub fn new(
        index: Arc<dyn IndexSource>,
        manifests: Arc<dyn ManifestSource>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            index,
            manifests,
            classifier: Arc::new(VersionClassifier::new()),
            settings,
            progress: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records committed so far; only ever grows.
    pub fn progress(&self) -> Arc<AtomicU64> {
        self.progress.clone()
    }

    /// Resolve the cursor from `store`, then scrape, enrich and persist until
    /// the index head is reached or a stage fails.
    pub async fn run(&self, store: Store) -> Result<PipelineReport, ScrapeError> {
        // Storage errors here abort before any stage starts
        let since = resolve_cursor(&store)?;
        // Later commits only move the saved cursor over fully committed pages
        store.save_cursor(&since)?;

        let (failures, mut fail_rx) = FailureSignal::new(self.settings.workers + 3);
        let capacity = self.settings.queue_capacity;
        let (entry_tx, entry_rx) = mpsc::channel::<(Position, IndexEntry)>(capacity);
        let (record_tx, record_rx) = mpsc::channel::<(Position, VersionRecord)>(capacity);

        log::info!("🚀 Starting pipeline");
        log::info!("   ├─ Since: {}", format_timestamp(&since));
        log::info!("   ├─ Page limit: {}", self.settings.page_limit);
        log::info!("   ├─ Workers: {}", self.settings.workers);
        log::info!("   ├─ Commit batch: {}", self.settings.commit_batch);
        log::info!("   └─ Queue capacity: {}", self.settings.queue_capacity);

        let mut sink = spawn_sink(
            store,
            record_rx,
            self.settings.commit_batch,
            self.progress.clone(),
            failures.clone(),
        );

        let enricher = Arc::new(Enricher::new(self.manifests.clone(), self.classifier.clone()));
        let workers = spawn_pool(
            self.settings.workers,
            enricher,
            entry_rx,
            record_tx,
            &failures,
        );

        let poller = {
            let index = self.index.clone();
            let failures = failures.clone();
            let poll_settings = PollSettings {
                page_limit: self.settings.page_limit,
                scrape_delay: self.settings.scrape_delay,
            };
            tokio::spawn(async move {
                let shutdown = failures.token();
                match poll_index(&*index, since, &poll_settings, &entry_tx, shutdown).await {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        failures.report("Index poller", e);
                        None
                    }
                }
                // entry_tx dropped here, after any failure is reported
            })
        };

        let outcome = tokio::select! {
            biased;
            Some(err) = fail_rx.recv() => Err(err),
            joined = &mut sink => joined.map_err(ScrapeError::from).and_then(|result| result),
        };

        let sink_stats = match outcome {
            Ok(stats) => stats,
            Err(err) => {
                failures.token().cancel();
                let root = if err.is_abort() {
                    fail_rx.try_recv().unwrap_or(err)
                } else {
                    err
                };
                log::error!("❌ Pipeline stopped: {}", root);
                return Err(root);
            }
        };

        // The sink only drains after every upstream sender is gone
        let poll = poller.await?.ok_or(ScrapeError::Aborted)?;
        let mut worker_stats = WorkerStats::default();
        for handle in workers {
            worker_stats += handle.await?.ok_or(ScrapeError::Aborted)?;
        }

        let report = PipelineReport {
            since,
            pages: poll.pages,
            discovered: poll.entries,
            enriched: worker_stats.enriched,
            manifests_fetched: worker_stats.manifests_fetched,
            written: sink_stats.written,
            inserted: sink_stats.inserted,
            total_rows: sink_stats.total_rows,
        };

        log::info!("✅ Finished successfully");
        log::info!("   ├─ Pages: {}", report.pages);
        log::info!("   ├─ Discovered: {}", report.discovered);
        log::info!("   ├─ Manifests fetched: {}", report.manifests_fetched);
        log::info!(
            "   ├─ New rows: {} (progress counter {})",
            report.inserted,
            self.progress.load(Ordering::Relaxed)
        );
        log::info!("   └─ Total rows: {}", report.total_rows);

        Ok(report)
    }
}
