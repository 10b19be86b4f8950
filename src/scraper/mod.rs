//! # Scrape pipeline
//!
//! ```text
//! resolve_cursor → poll_index → [queue] → enrichment pool (W) → [queue]
//!                → sink → SQLite
//! ```
//!
//! - `cursor` - watermark lookup at startup
//! - `index` - paginated index poller and its HTTP source
//! - `proxy` - manifest fetches and case encoding
//! - `enrich` - classification + manifest worker pool
//! - `sink` - single-writer batched persistence
//! - `frontier` - resume cursor over fully committed pages
//! - `signal` - shared failure channel
//! - `coordinator` - wiring and termination

pub mod coordinator;
pub mod cursor;
pub mod enrich;
pub mod frontier;
pub mod index;
pub mod proxy;
pub mod signal;
pub mod sink;

pub use coordinator::{Pipeline, PipelineReport, PipelineSettings};
pub use cursor::{resolve_cursor, BEGINNING_OF_TIME};
pub use frontier::{CommitFrontier, Position};
pub use index::{IndexClient, IndexSource};
pub use proxy::{case_encode, Manifest, ManifestSource, ProxyClient};
