use anyhow::{Context, Result};
use camino::Utf8Path;
use std::time::Duration;

/// Fetches a remote file to a local path.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    async fn fetch(&self, url: &str, dest: &Utf8Path) -> Result<()>;
}

/// HTTP(S) fetcher for the resolver binary. One request, no resume or retry.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Utf8Path) -> Result<()> {
        tracing::info!("Downloading {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Download refused: {}", url))?;

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read response body: {}", url))?;

        // Overwrites whatever a previous, interrupted attempt left behind.
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest))?;

        tracing::info!("File downloaded to: {} ({} bytes)", dest, bytes.len());
        Ok(())
    }
}
