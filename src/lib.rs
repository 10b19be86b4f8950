//! # modwatch
//!
//! Incrementally mirrors the Go module index into SQLite. Each newly published
//! module version is classified as release or pre-release, releases are
//! enriched with their `go.mod` from the module proxy, and everything is stored
//! keyed by `(path, version)`. Restarts resume from the newest stored
//! timestamp.

pub mod config;
pub mod error;
pub mod scraper;
pub mod sqlite_pragma;
pub mod storage;
pub mod version;

pub use config::ScraperConfig;
pub use error::ScrapeError;
pub use scraper::{Pipeline, PipelineReport, PipelineSettings};
pub use storage::Store;
pub use version::{IndexEntry, VersionClassifier, VersionRecord};
