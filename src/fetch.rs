//! Retrying HTTP fetcher and the remote content provider seam
//!
//! [`RetryingFetcher`] issues single GET requests through [`with_retry`]:
//! transient statuses (429, 500, 502, 503, 504) and transport failures are
//! retried, any other status returns the body as-is. [`PackProvider`] is the
//! trait the acquisition stage talks to; the Telegram implementation lives in
//! [`crate::telegram`].

use crate::config::{ProviderConfig, RetryConfig};
use crate::error::{AcquisitionError, Error, FetchError, Result};
use crate::retry::with_retry;
use crate::types::AssetDescriptor;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// Remote content provider
///
/// Resolves a pack manifest, turns opaque item locators into download URLs and
/// downloads bytes. Implementations must be shareable across fetch tasks.
#[async_trait]
pub trait PackProvider: Send + Sync {
    /// List the items of a pack in manifest order
    ///
    /// A provider-reported failure (unknown pack, bad name) is
    /// [`AcquisitionError::InvalidPack`].
    async fn get_manifest(
        &self,
        identifier: &str,
    ) -> std::result::Result<Vec<AssetDescriptor>, AcquisitionError>;

    /// Turn an item locator into a download URL
    async fn resolve_location(&self, locator: &str) -> std::result::Result<String, FetchError>;

    /// Download one URL
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError>;
}

/// HTTP GET with bounded retries
#[derive(Clone)]
pub struct RetryingFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl RetryingFetcher {
    /// Build a fetcher with connect, read and total timeouts from `provider`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(provider: &ProviderConfig, retry: RetryConfig) -> Result<Self> {
        Ok(Self::with_client(build_client(provider)?, retry))
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Underlying HTTP client, for non-retried calls (uploads, edits)
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Download `url`, retrying transient failures
    pub async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let url = Url::parse(url)?;
        with_retry(&self.retry, || fetch_once(&self.client, url.clone())).await
    }

    /// Download `url` and decode the body as JSON
    ///
    /// Decoding failures are not retried.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> std::result::Result<T, FetchError> {
        let body = self.fetch(url).await?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed {
            url: redact(url),
            reason: e.to_string(),
        })
    }
}

/// HTTP client with the provider's connect, read and total timeouts
pub(crate) fn build_client(provider: &ProviderConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(provider.connect_timeout)
        .read_timeout(provider.read_timeout)
        .timeout(provider.total_timeout)
        .user_agent(concat!("stickerpack-dl/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))
}

async fn fetch_once(client: &reqwest::Client, url: Url) -> std::result::Result<Vec<u8>, FetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::Network(e.without_url()))?;
    let status = response.status().as_u16();

    if FetchError::is_transient_status(status) {
        return Err(FetchError::TransientStatus {
            status,
            url: redact(url.as_str()),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Network(e.without_url()))?;
    debug!(status, bytes = body.len(), "fetched");
    Ok(body.to_vec())
}

/// Strip credentials embedded in a Bot API path (`/bot<token>/`, `/file/bot<token>/`)
pub(crate) fn redact(url: &str) -> String {
    let Some(start) = url.find("/bot") else {
        return url.to_string();
    };
    let token_start = start + "/bot".len();
    match url[token_start..].find('/') {
        Some(len) => format!("{}/bot***{}", &url[..start], &url[token_start + len..]),
        None => url.to_string(),
    }
}
