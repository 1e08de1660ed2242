//! Video (`.webm`) to animated WebP via `ffmpeg`

use super::tools::{FFMPEG, run_tool};
use super::{AssetConverter, output_path};
use crate::error::{Error, Result};
use crate::types::AssetKind;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Transcodes video stickers into a looping, padded square animated WebP
pub struct VideoAnimationConverter {
    ffmpeg: Option<PathBuf>,
    fps: u32,
    size: u32,
}

impl VideoAnimationConverter {
    /// Create a converter; a `None` path makes it unavailable
    pub fn new(ffmpeg: Option<PathBuf>, fps: u32, size: u32) -> Self {
        Self { ffmpeg, fps, size }
    }

    /// Filter graph: resample, fit inside the square, pad with transparency
    fn filter(&self) -> String {
        format!(
            "fps={fps},scale={s}:{s}:force_original_aspect_ratio=decrease,\
             pad={s}:{s}:(ow-iw)/2:(oh-ih)/2:color=0x00000000",
            fps = self.fps,
            s = self.size
        )
    }
}

impl AssetConverter for VideoAnimationConverter {
    fn kind(&self) -> AssetKind {
        AssetKind::VideoAnimation
    }

    fn missing_tools(&self) -> Vec<String> {
        if self.ffmpeg.is_none() {
            vec![FFMPEG.to_string()]
        } else {
            Vec::new()
        }
    }

    fn name(&self) -> &'static str {
        "video-animation"
    }

    fn convert(&self, source: &Path, out_dir: &Path) -> Result<PathBuf> {
        let Some(ffmpeg) = &self.ffmpeg else {
            return Err(Error::ToolMissing {
                tools: self.missing_tools(),
            });
        };

        let destination = output_path(source, out_dir);
        let filter = self.filter();
        let args = [
            OsStr::new("-y"),
            OsStr::new("-i"),
            source.as_os_str(),
            OsStr::new("-vf"),
            OsStr::new(&filter),
            OsStr::new("-loop"),
            OsStr::new("0"),
            destination.as_os_str(),
        ];
        run_tool(ffmpeg, &args, source, FFMPEG)?;

        Ok(destination)
    }
}
