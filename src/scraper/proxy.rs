//! Module proxy client
//!
//! Fetches `go.mod` manifests from `{base}/{module}/@v/{version}.mod`.
//! See https://go.dev/ref/mod#goproxy-protocol

use crate::error::ScrapeError;
use crate::version::GONE_MANIFEST;
use async_trait::async_trait;
use regex::{Captures, Regex};
use reqwest::StatusCode;
use std::sync::OnceLock;
use std::time::Duration;

/// Non-standard header honoured by proxy.golang.org: serve only cached
/// modules, never fetch from origin on demand.
pub const DISABLE_MODULE_FETCH_HEADER: &str = "Disable-Module-Fetch";

/// Outcome of a manifest fetch that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    Found(String),
    /// The version existed but was withdrawn (410)
    Gone,
}

impl Manifest {
    /// Value stored in the manifest column
    pub fn into_stored(self) -> String {
        match self {
            Manifest::Found(text) => text,
            Manifest::Gone => GONE_MANIFEST.to_string(),
        }
    }
}

/// Source of manifest documents
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(&self, path: &str, version: &str) -> Result<Manifest, ScrapeError>;
}

/// General category Lu, which excludes uppercase symbols like circled capitals
const UPPERCASE_LETTER_PATTERN: &str = r"\p{Lu}";

fn uppercase_letter() -> &'static Regex {
    static UPPERCASE_LETTER: OnceLock<Regex> = OnceLock::new();
    UPPERCASE_LETTER.get_or_init(|| {
        Regex::new(UPPERCASE_LETTER_PATTERN).expect("uppercase letter pattern is a valid regex")
    })
}

/// Case-encode a module path or version element.
///
/// Every uppercase letter becomes `!` followed by its lowercase form, so that
/// paths stay unambiguous on case-insensitive file systems. Lowercasing maps
/// one character to exactly one character.
pub fn case_encode(s: &str) -> String {
    uppercase_letter()
        .replace_all(s, |caps: &Captures| {
            let mut encoded = String::from("!");
            encoded.extend(caps[0].chars().flat_map(|c| c.to_lowercase().take(1)));
            encoded
        })
        .into_owned()
}

pub fn manifest_url(base_url: &str, path: &str, version: &str) -> String {
    format!(
        "{}/{}/@v/{}.mod",
        base_url.trim_end_matches('/'),
        case_encode(path),
        case_encode(version)
    )
}

/// HTTP client for the module proxy
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
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
impl ManifestSource for ProxyClient {
    async fn fetch_manifest(&self, path: &str, version: &str) -> Result<Manifest, ScrapeError> {
        let url = manifest_url(&self.base_url, path, version);

        let response = self
            .client
            .get(&url)
            .header(DISABLE_MODULE_FETCH_HEADER, "true")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Manifest::Found(response.text().await?)),
            StatusCode::GONE => {
                log::debug!("🪦 {}@{} is gone", path, version);
                Ok(Manifest::Gone)
            }
            status => Err(ScrapeError::Protocol {
                url,
                status: status.as_u16(),
            }),
        }
    }
}
