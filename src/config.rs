//! Configuration types for stickerpack-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote content provider settings (Telegram Bot API)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Bot API base URL (default: "https://api.telegram.org")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bot token used for every API and file URL
    #[serde(default)]
    pub bot_token: String,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Timeout for a single socket read (default: 300 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// Total request timeout (default: 600 seconds)
    #[serde(default = "default_total_timeout", with = "duration_serde")]
    pub total_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            bot_token: String::new(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            total_timeout: default_total_timeout(),
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 1.6)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Download behavior (working directory, concurrency)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Base working directory; each pack gets `<base_dir>/<identifier>` (default: "./stickers")
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Maximum concurrent item fetches (default: 8)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

/// Conversion parameters shared by the still-image and animation converters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Bounding box edge for converted items, in pixels (default: 512)
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Frame rate for transcoded video stickers (default: 15)
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,

    /// Lossy quality passed to img2webp for vector animations (default: 80)
    #[serde(default = "default_animation_quality")]
    pub animation_quality: u8,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            video_fps: default_video_fps(),
            animation_quality: default_animation_quality(),
        }
    }
}

/// External tool paths (ffmpeg, img2webp, rlottie-convert)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to img2webp executable (auto-detected if None)
    #[serde(default)]
    pub img2webp_path: Option<PathBuf>,

    /// Path to rlottie-convert executable (auto-detected if None)
    #[serde(default)]
    pub rlottie_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            img2webp_path: None,
            rlottie_path: None,
            search_path: true,
        }
    }
}

/// Archive packaging and delivery pacing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackagingConfig {
    /// Items per archive (default: 30)
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Largest archive the delivery channel accepts, in bytes (default: 48 MiB)
    #[serde(default = "default_payload_ceiling")]
    pub payload_ceiling: u64,

    /// Groups with at most this many members are never split (default: 15)
    #[serde(default = "default_min_split_members")]
    pub min_split_members: usize,

    /// Edge of the generated `icon.png`, in pixels (default: 96)
    #[serde(default = "default_icon_size")]
    pub icon_size: u32,

    /// Pause after every send (default: 700 ms)
    #[serde(default = "default_send_delay", with = "duration_ms_serde")]
    pub send_delay: Duration,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            payload_ceiling: default_payload_ceiling(),
            min_split_members: default_min_split_members(),
            icon_size: default_icon_size(),
            send_delay: default_send_delay(),
        }
    }
}

/// Main configuration for the pack pipeline
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote content provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retry policy for every provider request
    #[serde(default)]
    pub retry: RetryConfig,

    /// Working directory and fetch concurrency
    #[serde(default)]
    pub download: DownloadConfig,

    /// Conversion parameters
    #[serde(default)]
    pub convert: ConvertConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Archive packaging and delivery pacing
    #[serde(default)]
    pub packaging: PackagingConfig,
}

impl Config {
    /// Reject settings the Telegram-backed pipeline cannot run with
    ///
    /// Runs [`Config::validate_pipeline`] and additionally requires a bot token.
    pub fn validate(&self) -> Result<()> {
        if self.provider.bot_token.trim().is_empty() {
            return Err(config_error("bot token is not set", "bot_token"));
        }
        self.validate_pipeline()
    }

    /// Reject stage settings the pipeline cannot run with, whatever the provider
    pub fn validate_pipeline(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(config_error(
                "at least one attempt is required",
                "max_attempts",
            ));
        }
        if !(self.retry.backoff_multiplier.is_finite() && self.retry.backoff_multiplier >= 1.0) {
            return Err(config_error(
                "backoff multiplier must be a finite value >= 1.0",
                "backoff_multiplier",
            ));
        }
        if self.download.max_concurrent_fetches == 0 {
            return Err(config_error(
                "fetch concurrency must be at least 1",
                "max_concurrent_fetches",
            ));
        }
        if self.packaging.group_size == 0 {
            return Err(config_error("group size must be at least 1", "group_size"));
        }
        if self.convert.max_dimension == 0 || self.packaging.icon_size == 0 {
            return Err(config_error(
                "image dimensions must be non-zero",
                "max_dimension",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_total_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    1.6
}

fn default_true() -> bool {
    true
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("stickers")
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_max_dimension() -> u32 {
    512
}

fn default_video_fps() -> u32 {
    15
}

fn default_animation_quality() -> u8 {
    80
}

fn default_group_size() -> usize {
    30
}

fn default_payload_ceiling() -> u64 {
    48 * 1024 * 1024
}

fn default_min_split_members() -> usize {
    15
}

fn default_icon_size() -> u32 {
    96
}

fn default_send_delay() -> Duration {
    Duration::from_millis(700)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second pacing)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
