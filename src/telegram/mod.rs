//! Telegram Bot API collaborators
//!
//! - [`TelegramProvider`]: pack manifests and sticker files (`getStickerSet`, `getFile`)
//! - [`TelegramChat`]: archive and notice delivery (`sendDocument`, `sendMessage`)
//! - [`TelegramStatusMessage`]: the editable status message of a run (`editMessageText`)

mod chat;
mod provider;

pub use chat::{TelegramChat, TelegramStatusMessage};
pub use provider::TelegramProvider;

use crate::config::ProviderConfig;
use crate::error::{DeliveryError, Result};
use crate::fetch::build_client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    /// The result, or the API-supplied description of the failure
    pub(crate) fn into_result(self) -> std::result::Result<T, String> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err("response has no result".to_string()),
            (false, _) => Err(self
                .description
                .unwrap_or_else(|| "request failed".to_string())),
        }
    }
}

/// Base URL, token and HTTP client shared by every Bot API call
#[derive(Clone)]
pub struct BotApi {
    base: String,
    token: String,
    client: reqwest::Client,
}

impl BotApi {
    /// Build from provider settings, with the configured timeouts
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self::with_client(&config.api_base, &config.bot_token, client))
    }

    /// Use an existing client
    pub fn with_client(base: &str, token: &str, client: reqwest::Client) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        }
    }

    /// Shared HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, self.token, method)
    }

    pub(crate) fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base, self.token, file_path)
    }

    /// POST a JSON body and unwrap the envelope
    pub(crate) async fn post_json<T: DeserializeOwned>(
        &self,
        method: &str,
        what: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<T, DeliveryError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.without_url()))?;
        unwrap_envelope(response, what).await
    }

    /// POST a multipart form and unwrap the envelope
    pub(crate) async fn post_form<T: DeserializeOwned>(
        &self,
        method: &str,
        what: &str,
        form: reqwest::multipart::Form,
    ) -> std::result::Result<T, DeliveryError> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.without_url()))?;
        unwrap_envelope(response, what).await
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> std::result::Result<T, DeliveryError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| DeliveryError::Network(e.without_url()))?;
    let envelope: ApiResponse<T> =
        serde_json::from_slice(&body).map_err(|e| DeliveryError::Rejected {
            what: what.to_string(),
            reason: format!("HTTP {}: undecodable response ({})", status, e),
        })?;

    envelope.into_result().map_err(|reason| DeliveryError::Rejected {
        what: what.to_string(),
        reason,
    })
}
