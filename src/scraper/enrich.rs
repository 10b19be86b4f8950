//! Enrichment pool
//!
//! `W` independent workers pull index entries from one shared bounded queue,
//! classify the version and, for releases only, fetch the manifest from the
//! proxy. Workers race each other, so output order is not input order; every
//! record keeps the [`Position`] its entry was discovered at.

use super::frontier::Position;
use super::proxy::ManifestSource;
use super::signal::FailureSignal;
use crate::error::ScrapeError;
use crate::version::{IndexEntry, VersionClassifier, VersionRecord};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Classifies and enriches a single entry
pub struct Enricher {
    manifests: Arc<dyn ManifestSource>,
    classifier: Arc<VersionClassifier>,
}

impl Enricher {
    pub fn new(manifests: Arc<dyn ManifestSource>, classifier: Arc<VersionClassifier>) -> Self {
        Self {
            manifests,
            classifier,
        }
    }

    pub async fn enrich(&self, entry: IndexEntry) -> Result<VersionRecord, ScrapeError> {
        let is_pre_release = self.classifier.is_pre_release(&entry.version);

        let manifest = if is_pre_release {
            None
        } else {
            let manifest = self
                .manifests
                .fetch_manifest(&entry.path, &entry.version)
                .await?;
            Some(manifest.into_stored())
        };

        Ok(VersionRecord::from_entry(entry, is_pre_release, manifest))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub enriched: u64,
    pub manifests_fetched: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.enriched += other.enriched;
        self.manifests_fetched += other.manifests_fetched;
    }
}

/// Spawn `workers` enrichment tasks sharing `rx`.
///
/// The output queue closes once every worker has returned. A worker error is
/// reported through `failures` and the worker's handle yields `None`.
pub fn spawn_pool(
    workers: usize,
    enricher: Arc<Enricher>,
    rx: mpsc::Receiver<(Position, IndexEntry)>,
    tx: mpsc::Sender<(Position, VersionRecord)>,
    failures: &FailureSignal,
) -> Vec<JoinHandle<Option<WorkerStats>>> {
    let rx = Arc::new(Mutex::new(rx));

    (0..workers)
        .map(|id| {
            let enricher = enricher.clone();
            let rx = rx.clone();
            let tx = tx.clone();
            let failures = failures.clone();
            tokio::spawn(async move {
                let shutdown = failures.token().clone();
                match run_worker(&enricher, &rx, &tx, &shutdown).await {
                    Ok(stats) => {
                        log::trace!("worker {} done: {:?}", id, stats);
                        Some(stats)
                    }
                    Err(e) => {
                        failures.report(&format!("Enrichment worker {}", id), e);
                        None
                    }
                }
            })
        })
        .collect()
}

async fn run_worker(
    enricher: &Enricher,
    rx: &Mutex<mpsc::Receiver<(Position, IndexEntry)>>,
    tx: &mpsc::Sender<(Position, VersionRecord)>,
    shutdown: &CancellationToken,
) -> Result<WorkerStats, ScrapeError> {
    let mut stats = WorkerStats::default();

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return Err(ScrapeError::Aborted),
            next = async { rx.lock().await.recv().await } => next,
        };

        let Some((position, entry)) = next else {
            return Ok(stats);
        };

        // In-flight fetches are not interrupted by a shutdown
        let record = enricher.enrich(entry).await?;
        stats.enriched += 1;
        if !record.is_pre_release {
            stats.manifests_fetched += 1;
        }

        if tx.send((position, record)).await.is_err() {
            return Err(ScrapeError::Aborted);
        }
    }
}
