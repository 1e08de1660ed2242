//! Lottie (`.tgs`) to animated WebP via `rlottie-convert` and `img2webp`

use super::tools::{IMG2WEBP, RLOTTIE, run_tool};
use super::{AssetConverter, output_path};
use crate::error::{Error, Result};
use crate::types::AssetKind;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Renders frames with `rlottie-convert`, then assembles them with `img2webp`
pub struct VectorAnimationConverter {
    rlottie: Option<PathBuf>,
    img2webp: Option<PathBuf>,
    quality: u8,
}

impl VectorAnimationConverter {
    /// Create a converter; `None` paths make it unavailable
    pub fn new(rlottie: Option<PathBuf>, img2webp: Option<PathBuf>, quality: u8) -> Self {
        Self {
            rlottie,
            img2webp,
            quality,
        }
    }
}

impl AssetConverter for VectorAnimationConverter {
    fn kind(&self) -> AssetKind {
        AssetKind::VectorAnimation
    }

    fn missing_tools(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.rlottie.is_none() {
            missing.push(RLOTTIE.to_string());
        }
        if self.img2webp.is_none() {
            missing.push(IMG2WEBP.to_string());
        }
        missing
    }

    fn name(&self) -> &'static str {
        "vector-animation"
    }

    fn convert(&self, source: &Path, out_dir: &Path) -> Result<PathBuf> {
        let (Some(rlottie), Some(img2webp)) = (&self.rlottie, &self.img2webp) else {
            return Err(Error::ToolMissing {
                tools: self.missing_tools(),
            });
        };

        let destination = output_path(source, out_dir);
        let frames = FrameDir::create(&destination)?;

        let pattern = frames.path().join("%03d.png");
        run_tool(
            rlottie,
            &[source.as_os_str(), pattern.as_os_str()],
            source,
            RLOTTIE,
        )?;

        let rendered = frames.list_png()?;
        if rendered.is_empty() {
            return Err(Error::tool_invocation(source, RLOTTIE, "no frames rendered"));
        }
        debug!(item = %source.display(), frames = rendered.len(), "frames rendered");

        let quality = self.quality.to_string();
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-loop"),
            OsStr::new("0"),
            OsStr::new("-lossy"),
            OsStr::new("-q"),
            OsStr::new(&quality),
            OsStr::new("-o"),
            destination.as_os_str(),
        ];
        args.extend(rendered.iter().map(|frame| frame.as_os_str()));
        run_tool(img2webp, &args, source, IMG2WEBP)?;

        Ok(destination)
    }
}

/// Per-item frame directory, removed on drop
struct FrameDir(PathBuf);

impl FrameDir {
    fn create(destination: &Path) -> Result<Self> {
        let path = destination.with_extension("frames");
        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        std::fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }

    /// Rendered frames in name order
    fn list_png(&self) -> Result<Vec<PathBuf>> {
        let mut frames: Vec<PathBuf> = std::fs::read_dir(&self.0)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "png"))
            .collect();
        frames.sort();
        Ok(frames)
    }
}

impl Drop for FrameDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            debug!(dir = %self.0.display(), error = %e, "failed to remove frame directory");
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reports_each_missing_tool() {
        let converter = VectorAnimationConverter::new(None, Some(PathBuf::from("/usr/bin/img2webp")), 80);
        assert_eq!(converter.missing_tools(), vec!["rlottie-convert".to_string()]);
        assert!(!converter.is_available());

        let converter = VectorAnimationConverter::new(None, None, 80);
        assert_eq!(converter.missing_tools().len(), 2);
    }

    #[test]
    fn frame_dir_is_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let destination = temp.path().join("003.webp");
        let path = {
            let frames = FrameDir::create(&destination).unwrap();
            std::fs::write(frames.path().join("002.png"), b"x").unwrap();
            std::fs::write(frames.path().join("001.png"), b"x").unwrap();
            std::fs::write(frames.path().join("notes.txt"), b"x").unwrap();

            let listed = frames.list_png().unwrap();
            assert_eq!(
                listed,
                vec![frames.path().join("001.png"), frames.path().join("002.png")]
            );
            frames.path().to_path_buf()
        };
        assert_eq!(path, temp.path().join("003.frames"));
        assert!(!path.exists());
    }

    #[test]
    fn failing_renderer_cleans_up_frames() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("001.tgs");
        std::fs::write(&source, b"not lottie").unwrap();

        // `false` exits non-zero without reading its arguments
        let Ok(false_bin) = which::which("false") else {
            return;
        };
        let converter = VectorAnimationConverter::new(Some(false_bin.clone()), Some(false_bin), 80);
        let err = converter.convert(&source, temp.path()).unwrap_err();

        assert!(matches!(err, Error::ToolInvocation { ref tool, .. } if tool == RLOTTIE));
        assert!(!temp.path().join("001.frames").exists());
        assert!(!temp.path().join("001.webp").exists());
    }

    #[test]
    #[cfg_attr(not(feature = "tool-tests"), ignore)]
    fn converts_with_installed_tools() {
        let tools = super::super::tools::ToolPaths::resolve(&Default::default());
        let converter = VectorAnimationConverter::new(tools.rlottie, tools.img2webp, 80);
        assert!(converter.is_available(), "rlottie-convert and img2webp must be installed");

        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample.tgs");
        let temp = TempDir::new().unwrap();
        let output = converter.convert(&fixture, temp.path()).unwrap();

        let bytes = std::fs::read(output).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }
}
