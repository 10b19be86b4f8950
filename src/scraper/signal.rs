use crate::error::ScrapeError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Shared failure channel between stages and the coordinator
///
/// The first error sent is the root cause. Reporting cancels the shared token
/// so every other stage stops taking new work.
#[derive(Clone)]
pub struct FailureSignal {
    tx: mpsc::Sender<ScrapeError>,
    shutdown: CancellationToken,
}

impl FailureSignal {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ScrapeError>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                shutdown: CancellationToken::new(),
            },
            rx,
        )
    }

    pub fn report(&self, stage: &str, err: ScrapeError) {
        if err.is_abort() {
            log::debug!("⏹️  {} stopped after failure elsewhere", stage);
        } else {
            log::error!("❌ {} failed: {}", stage, err);
        }

        // Send before cancelling so the root cause is queued ahead of the
        // aborts it triggers. A full channel already holds an earlier error.
        let _ = self.tx.try_send(err);
        self.shutdown.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_raised(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
