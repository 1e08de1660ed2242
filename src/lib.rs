//! # stickerpack-dl
//!
//! Fetch a remote sticker pack, convert every item to WebP and deliver the
//! result as size-bounded ZIP archives that sticker maker apps import directly.
//!
//! ## Design Philosophy
//!
//! stickerpack-dl is designed to be:
//! - **Library-first** - No CLI or bot loop, purely a Rust crate for embedding
//! - **Pluggable** - Provider, delivery channel and status message are traits
//! - **Tolerant** - A bad item is skipped, never the whole pack
//! - **Sensible defaults** - Works out of the box with only a bot token
//!
//! ## Quick Start
//!
//! ```no_run
//! use stickerpack_dl::telegram::{BotApi, TelegramChat};
//! use stickerpack_dl::{Config, ConversionMode, PackRequest, Pipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.provider.bot_token = std::env::var("BOT_TOKEN")?;
//!
//!     let pipeline = Pipeline::new(config.clone())?;
//!     let chat = TelegramChat::new(BotApi::new(&config.provider)?, 123456789);
//!     let status = chat.post_status("🔎 Checking …").await?;
//!
//!     let request = PackRequest::parse("https://t.me/addstickers/demo", ConversionMode::Static)?;
//!     let summary = pipeline.run(&request, Arc::new(status), &chat).await?;
//!     println!("delivered {} archives", summary.archives.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Concurrent download of pack items
pub mod acquisition;
/// Configuration types
pub mod config;
/// Conversion of downloaded items to WebP
pub mod convert;
/// Error types
pub mod error;
/// Retrying HTTP fetcher and the provider trait
pub mod fetch;
/// Archive building and delivery
pub mod packaging;
/// End-to-end pack runs
pub mod pipeline;
/// Throttled progress reporting
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Telegram Bot API collaborators
pub mod telegram;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use convert::{AssetConverter, ConversionEngine};
pub use error::{AcquisitionError, DeliveryError, Error, FetchError, Result};
pub use fetch::PackProvider;
pub use packaging::DeliveryChannel;
pub use pipeline::Pipeline;
pub use progress::{ConsoleSink, StatusSink};
pub use types::{
    ArchivePart, AssetDescriptor, AssetKind, ConversionMode, ConvertedAsset, DeliveredArchive,
    LocalAsset, PackRequest, RawFormat, RunSummary, TargetCodec,
};
