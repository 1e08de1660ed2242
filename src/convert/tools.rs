//! External tool discovery and invocation

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Binary name of the Lottie frame renderer
pub const RLOTTIE: &str = "rlottie-convert";
/// Binary name of the animated WebP assembler
pub const IMG2WEBP: &str = "img2webp";
/// Binary name of the video transcoder
pub const FFMPEG: &str = "ffmpeg";

/// Lines of stderr kept in tool failure reports
const STDERR_TAIL_LINES: usize = 5;

/// Resolved locations of the external binaries
///
/// A `None` entry means the tool is not installed (or PATH search is
/// disabled and no explicit path was configured).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolPaths {
    /// `rlottie-convert`
    pub rlottie: Option<PathBuf>,
    /// `img2webp`
    pub img2webp: Option<PathBuf>,
    /// `ffmpeg`
    pub ffmpeg: Option<PathBuf>,
}

impl ToolPaths {
    /// Resolve every tool from explicit paths, then PATH
    pub fn resolve(config: &ToolsConfig) -> Self {
        let paths = Self {
            rlottie: locate(config.rlottie_path.as_ref(), RLOTTIE, config.search_path),
            img2webp: locate(config.img2webp_path.as_ref(), IMG2WEBP, config.search_path),
            ffmpeg: locate(config.ffmpeg_path.as_ref(), FFMPEG, config.search_path),
        };

        tracing::info!(
            rlottie = paths.rlottie.is_some(),
            img2webp = paths.img2webp.is_some(),
            ffmpeg = paths.ffmpeg.is_some(),
            "External tools resolved"
        );
        paths
    }
}

fn locate(explicit: Option<&PathBuf>, name: &str, search_path: bool) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.clone());
    }
    if search_path {
        return which::which(name).ok();
    }
    None
}

/// Run a tool to completion; a spawn failure or non-zero exit is a
/// [`Error::ToolInvocation`] for `item`
pub(crate) fn run_tool(program: &Path, args: &[&std::ffi::OsStr], item: &Path, tool: &str) -> Result<()> {
    debug!(tool, item = %item.display(), "running external tool");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::tool_invocation(item, tool, format!("failed to execute: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_invocation(
            item,
            tool,
            format!("{}: {}", output.status, stderr_tail(&stderr)),
        ));
    }
    Ok(())
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}
