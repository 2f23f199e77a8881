//! Category blocklist downloads.
//!
//! Each category can be refreshed from one or more public hosts files.
//! Sources are fetched one after another, parsed with the same rules as
//! local imports, and merged into a single sorted, deduplicated list.

use std::collections::BTreeSet;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{error, info};

use super::hosts;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("none of the {0} blocklist sources could be fetched")]
    NoSources(usize),
}

pub struct BlocklistDownloader {
    client: Client,
}

impl BlocklistDownloader {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(concat!("nxguard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch every source and merge the parsed domains.
    ///
    /// A source that fails is logged and skipped. Fails only when no
    /// source could be fetched, so a dead mirror never empties a category.
    pub async fn fetch<S: AsRef<str>>(&self, sources: &[S]) -> Result<Vec<String>, DownloadError> {
        let mut domains = BTreeSet::new();
        let mut fetched = 0;

        for url in sources {
            let url = url.as_ref();
            info!("Fetching blocklist from {}", url);
            match self.fetch_one(url).await {
                Ok(parsed) => {
                    info!("Parsed {} entries from {}", parsed.len(), url);
                    domains.extend(parsed);
                    fetched += 1;
                }
                Err(e) => error!("Failed to fetch {}: {}", url, e),
            }
        }

        if fetched == 0 {
            return Err(DownloadError::NoSources(sources.len()));
        }
        Ok(domains.into_iter().collect())
    }

    async fn fetch_one(&self, url: &str) -> Result<Vec<String>, reqwest::Error> {
        let text = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(hosts::parse_list(&text))
    }
}
