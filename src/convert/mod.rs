//! Conversion of downloaded items to WebP
//!
//! Each raw kind has its own [`AssetConverter`] that reports whether the
//! tools it needs are present:
//!
//! - [`StillImageConverter`]: in-process re-encode, always available
//! - [`VectorAnimationConverter`]: `rlottie-convert` + `img2webp`
//! - [`VideoAnimationConverter`]: `ffmpeg`
//!
//! [`ConversionEngine`] picks the items the requested mode handles, checks
//! capabilities up front and converts one item at a time on the blocking
//! pool. A failing item is logged and left out; the stage itself only fails
//! when none of the kinds it needs can be converted.

mod still;
mod tools;
mod vector;
mod video;

pub use still::StillImageConverter;
pub use tools::ToolPaths;
pub use vector::VectorAnimationConverter;
pub use video::VideoAnimationConverter;

pub(crate) use still::fit_within;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::{ProgressReporter, StatusHandle};
use crate::types::{AssetKind, ConversionMode, ConvertedAsset, LocalAsset, TargetCodec};
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tracing::{info, warn};

/// Converter for one raw kind
///
/// `convert` blocks (decoding, encoding, child processes) and must only be
/// called from the blocking pool.
pub trait AssetConverter: Send + Sync {
    /// Raw kind this converter accepts
    fn kind(&self) -> AssetKind;

    /// External binaries this converter needs but could not find
    fn missing_tools(&self) -> Vec<String>;

    /// Whether every required tool is present
    fn is_available(&self) -> bool {
        self.missing_tools().is_empty()
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Convert `source` into `out_dir`, returning the output path
    ///
    /// # Errors
    /// [`Error::ToolInvocation`] when decoding, encoding or a tool fails.
    fn convert(&self, source: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Output file for a source: same stem, `.webp`
pub(crate) fn output_path(source: &Path, out_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    out_dir.join(format!("{}.{}", stem, TargetCodec::Webp.extension()))
}

/// Converts a pack's local assets for one mode
pub struct ConversionEngine {
    converters: Vec<Arc<dyn AssetConverter>>,
}

impl ConversionEngine {
    /// Build the default converters from the convert and tools settings
    pub fn new(config: &Config) -> Self {
        let tools = ToolPaths::resolve(&config.tools);
        let convert = &config.convert;

        let converters: Vec<Arc<dyn AssetConverter>> = vec![
            Arc::new(StillImageConverter::new(convert.max_dimension)),
            Arc::new(VectorAnimationConverter::new(
                tools.rlottie,
                tools.img2webp,
                convert.animation_quality,
            )),
            Arc::new(VideoAnimationConverter::new(
                tools.ffmpeg,
                convert.video_fps,
                convert.max_dimension,
            )),
        ];

        for converter in &converters {
            info!(
                converter = converter.name(),
                available = converter.is_available(),
                "Converter initialized"
            );
        }

        Self::with_converters(converters)
    }

    /// Use a custom converter set; the first converter for a kind wins
    pub fn with_converters(converters: Vec<Arc<dyn AssetConverter>>) -> Self {
        Self { converters }
    }

    /// Output directory of a mode inside a pack directory
    pub fn output_dir(pack_dir: &Path, mode: ConversionMode) -> PathBuf {
        match mode {
            ConversionMode::Static => pack_dir.join("converted_static"),
            ConversionMode::Animated => pack_dir.join("converted_anim"),
        }
    }

    fn converter_for(&self, kind: AssetKind) -> Option<Arc<dyn AssetConverter>> {
        self.converters.iter().find(|c| c.kind() == kind).cloned()
    }

    /// Convert every asset the mode handles, in ascending source order
    ///
    /// # Errors
    /// - [`Error::ToolMissing`] when no kind present in the input can be converted
    /// - [`Error::Io`] when the output directory cannot be created
    pub async fn convert(
        &self,
        mode: ConversionMode,
        pack_dir: &Path,
        assets: Vec<LocalAsset>,
        status: StatusHandle,
    ) -> Result<Vec<ConvertedAsset>> {
        let mut items: Vec<LocalAsset> = assets
            .into_iter()
            .filter(|asset| mode.accepts(asset.raw_format.kind()))
            .collect();
        items.sort_by_key(|asset| asset.sequence_index);

        let plan = self.plan(&items)?;
        let out_dir = Self::output_dir(pack_dir, mode);
        tokio::fs::create_dir_all(&out_dir).await?;

        let (label, console_label) = match mode {
            ConversionMode::Static => ("🛠️ Converting to WebP …", "Convert"),
            ConversionMode::Animated => ("🎞️ Converting animations …", "Convert-Anim"),
        };
        let reporter = ProgressReporter::new(label, items.len(), status, console_label);

        info!(?mode, items = items.len(), out_dir = %out_dir.display(), "converting");

        let converted = spawn_blocking(move || convert_all(&plan, &items, &out_dir, &reporter))
            .await
            .map_err(|e| Error::Other(format!("conversion task panicked: {}", e)))?;

        info!(?mode, converted = converted.len(), "conversion finished");
        Ok(converted)
    }

    /// Pick an available converter per kind present in `items`
    fn plan(&self, items: &[LocalAsset]) -> Result<ConversionPlan> {
        let kinds: BTreeSet<AssetKind> =
            items.iter().map(|asset| asset.raw_format.kind()).collect();

        let mut plan = ConversionPlan::default();
        let mut missing = BTreeSet::new();

        for kind in kinds {
            match self.converter_for(kind) {
                Some(converter) if converter.is_available() => plan.converters.push(converter),
                Some(converter) => {
                    let tools = converter.missing_tools();
                    warn!(?kind, tools = ?tools, "converter unavailable, items of this kind will be skipped");
                    missing.extend(tools);
                    plan.skipped.push(kind);
                }
                None => {
                    warn!(?kind, "no converter registered, items of this kind will be skipped");
                    plan.skipped.push(kind);
                }
            }
        }

        if plan.converters.is_empty() && !plan.skipped.is_empty() {
            return Err(Error::ToolMissing {
                tools: missing.into_iter().collect(),
            });
        }
        Ok(plan)
    }
}

#[derive(Default)]
struct ConversionPlan {
    converters: Vec<Arc<dyn AssetConverter>>,
    skipped: Vec<AssetKind>,
}

impl ConversionPlan {
    fn converter_for(&self, kind: AssetKind) -> Option<&Arc<dyn AssetConverter>> {
        self.converters.iter().find(|c| c.kind() == kind)
    }
}

/// Run one conversion, turning a converter panic into a per-item failure
fn convert_isolated(
    converter: &dyn AssetConverter,
    source: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    panic::catch_unwind(AssertUnwindSafe(|| converter.convert(source, out_dir))).unwrap_or_else(
        |payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(Error::tool_invocation(
                source,
                converter.name(),
                format!("panicked: {}", reason),
            ))
        },
    )
}

fn convert_all(
    plan: &ConversionPlan,
    items: &[LocalAsset],
    out_dir: &Path,
    reporter: &ProgressReporter,
) -> Vec<ConvertedAsset> {
    let mut converted = Vec::with_capacity(items.len());

    for (done, asset) in items.iter().enumerate() {
        if let Some(converter) = plan.converter_for(asset.raw_format.kind()) {
            match convert_isolated(converter.as_ref(), &asset.path, out_dir) {
                Ok(path) => converted.push(ConvertedAsset {
                    source_index: asset.sequence_index,
                    path,
                    target_format: TargetCodec::Webp,
                }),
                Err(e) => warn!(
                    item = %asset.path.display(),
                    converter = converter.name(),
                    error = %e,
                    "conversion failed, skipping item"
                ),
            }
        }
        reporter.report(done + 1);
    }

    reporter.complete(&format!("Total converted: {}", converted.len()));
    converted
}
