//! Module version events and pre-release classification

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Go pre-release versions carry a hyphen suffix right after the patch number,
/// see https://go.dev/ref/mod#glos-pre-release-version
pub const PRE_RELEASE_PATTERN: &str = r"^v[0-9]+\.[0-9]+\.[0-9]+-";

/// Manifest value stored when the proxy reports a version as withdrawn (410)
pub const GONE_MANIFEST: &str = "gone";

/// Raw event as published by the index, one JSON object per line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Enriched event ready for storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub path: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub is_pre_release: bool,
    /// `None` for pre-releases, `Some("gone")` for withdrawn versions
    pub manifest: Option<String>,
}

impl VersionRecord {
    /// Classified entry; the manifest is filled in by the caller when fetched.
    pub fn from_entry(entry: IndexEntry, is_pre_release: bool, manifest: Option<String>) -> Self {
        Self {
            path: entry.path,
            version: entry.version,
            timestamp: entry.timestamp,
            is_pre_release,
            manifest,
        }
    }
}

/// Sortable string form of a timestamp: UTC, fixed nanosecond precision, `Z` suffix.
///
/// Lexicographic order of the output equals chronological order, which the
/// watermark query relies on.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Compiled pre-release matcher
///
/// Built once when the pipeline is assembled and shared read-only between workers.
#[derive(Debug, Clone)]
pub struct VersionClassifier {
    pattern: Regex,
}

impl VersionClassifier {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(PRE_RELEASE_PATTERN).expect("pre-release pattern is a valid regex"),
        }
    }

    pub fn is_pre_release(&self, version: &str) -> bool {
        self.pattern.is_match(version)
    }
}

impl Default for VersionClassifier {
    fn default() -> Self {
        Self::new()
    }
}
