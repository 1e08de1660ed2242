//! Sticker pack provider over `getStickerSet` / `getFile`

use super::{ApiResponse, BotApi};
use crate::config::Config;
use crate::error::{AcquisitionError, FetchError, Result};
use crate::fetch::{PackProvider, RetryingFetcher, redact};
use crate::types::{AssetDescriptor, AssetKind};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct StickerSet {
    #[serde(default)]
    stickers: Vec<Sticker>,
}

#[derive(Debug, Deserialize)]
struct Sticker {
    file_id: String,
    #[serde(default)]
    is_animated: bool,
    #[serde(default)]
    is_video: bool,
}

impl Sticker {
    fn kind(&self) -> AssetKind {
        if self.is_animated {
            AssetKind::VectorAnimation
        } else if self.is_video {
            AssetKind::VideoAnimation
        } else {
            AssetKind::Image
        }
    }
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

/// Telegram sticker sets as a [`PackProvider`]
///
/// Every request goes through the retrying fetcher; item locators are
/// `file_id`s.
#[derive(Clone)]
pub struct TelegramProvider {
    api: BotApi,
    fetcher: RetryingFetcher,
}

impl TelegramProvider {
    /// Build from the provider and retry settings
    pub fn new(config: &Config) -> Result<Self> {
        let api = BotApi::new(&config.provider)?;
        let fetcher = RetryingFetcher::with_client(api.client().clone(), config.retry.clone());
        Ok(Self { api, fetcher })
    }

    /// Build from an existing API handle and fetcher
    pub fn with_fetcher(api: BotApi, fetcher: RetryingFetcher) -> Self {
        Self { api, fetcher }
    }

    fn query_url(&self, method: &str, key: &str, value: &str) -> std::result::Result<String, FetchError> {
        let url = Url::parse_with_params(&self.api.method_url(method), &[(key, value)])?;
        Ok(url.into())
    }
}

#[async_trait]
impl PackProvider for TelegramProvider {
    async fn get_manifest(
        &self,
        identifier: &str,
    ) -> std::result::Result<Vec<AssetDescriptor>, AcquisitionError> {
        let manifest_error = |source| AcquisitionError::Manifest {
            identifier: identifier.to_string(),
            source,
        };

        let url = self
            .query_url("getStickerSet", "name", identifier)
            .map_err(manifest_error)?;
        let response: ApiResponse<StickerSet> = self
            .fetcher
            .fetch_json(&url)
            .await
            .map_err(manifest_error)?;

        let set = response
            .into_result()
            .map_err(|reason| AcquisitionError::InvalidPack {
                identifier: identifier.to_string(),
                reason,
            })?;

        debug!(identifier, items = set.stickers.len(), "sticker set resolved");

        Ok(set
            .stickers
            .into_iter()
            .enumerate()
            .map(|(sequence_index, sticker)| AssetDescriptor {
                sequence_index,
                kind: sticker.kind(),
                remote_locator: sticker.file_id,
            })
            .collect())
    }

    async fn resolve_location(&self, locator: &str) -> std::result::Result<String, FetchError> {
        let url = self.query_url("getFile", "file_id", locator)?;
        let response: ApiResponse<File> = self.fetcher.fetch_json(&url).await?;

        let file_path = response
            .into_result()
            .ok()
            .and_then(|file| file.file_path)
            .ok_or_else(|| FetchError::Malformed {
                url: redact(&url),
                reason: format!("no file_path for {}", locator),
            })?;

        Ok(self.api.file_url(&file_path))
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        self.fetcher.fetch(url).await
    }
}
