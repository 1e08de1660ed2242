//! Delivery and status updates in one Telegram chat

use super::BotApi;
use crate::error::DeliveryError;
use crate::packaging::DeliveryChannel;
use crate::progress::StatusSink;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
}

/// One chat as a [`DeliveryChannel`]
#[derive(Clone)]
pub struct TelegramChat {
    api: BotApi,
    chat_id: i64,
}

impl TelegramChat {
    /// Deliver into `chat_id`
    pub fn new(api: BotApi, chat_id: i64) -> Self {
        Self { api, chat_id }
    }

    /// Post a new message and return it as the status message of a run
    pub async fn post_status(&self, text: &str) -> Result<TelegramStatusMessage, DeliveryError> {
        let message_id = self.send_message(text).await?;
        Ok(TelegramStatusMessage {
            api: self.api.clone(),
            chat_id: self.chat_id,
            message_id,
        })
    }

    async fn send_message(&self, text: &str) -> Result<i64, DeliveryError> {
        let message: Message = self
            .api
            .post_json(
                "sendMessage",
                "message",
                &json!({ "chat_id": self.chat_id, "text": text }),
            )
            .await?;
        Ok(message.message_id)
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChat {
    async fn send_archive(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let size = bytes.len();
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/zip")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.to_string())
            .text("caption", caption.to_string())
            .part("document", part);

        let _: Message = self.api.post_form("sendDocument", file_name, form).await?;
        debug!(file_name, size, chat_id = self.chat_id, "archive sent");
        Ok(())
    }

    async fn send_notice(&self, text: &str) -> Result<(), DeliveryError> {
        self.send_message(text).await.map(|_| ())
    }
}

/// The editable status message of a run, as a [`StatusSink`]
#[derive(Clone)]
pub struct TelegramStatusMessage {
    api: BotApi,
    chat_id: i64,
    message_id: i64,
}

impl TelegramStatusMessage {
    /// Edit an existing message
    pub fn new(api: BotApi, chat_id: i64, message_id: i64) -> Self {
        Self {
            api,
            chat_id,
            message_id,
        }
    }
}

#[async_trait]
impl StatusSink for TelegramStatusMessage {
    async fn set_status(&self, text: &str) -> Result<(), DeliveryError> {
        // Result is the edited Message, or `true` for inline messages
        let _: serde_json::Value = self
            .api
            .post_json(
                "editMessageText",
                "status",
                &json!({
                    "chat_id": self.chat_id,
                    "message_id": self.message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }
}
