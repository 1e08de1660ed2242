//! In-process still image re-encode

use super::{AssetConverter, output_path};
use crate::error::{Error, Result};
use crate::types::AssetKind;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::{Path, PathBuf};

/// Encoder name used in failure reports
const ENCODER: &str = "image";

/// Re-encodes still images to WebP, fitted within a square bounding box
///
/// The source format is sniffed from content. Alpha is kept. The WebP
/// encoder is lossless.
pub struct StillImageConverter {
    max_dimension: u32,
}

impl StillImageConverter {
    /// Fit output within `max_dimension` x `max_dimension`
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl AssetConverter for StillImageConverter {
    fn kind(&self) -> AssetKind {
        AssetKind::Image
    }

    fn missing_tools(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "still-image"
    }

    fn convert(&self, source: &Path, out_dir: &Path) -> Result<PathBuf> {
        let bytes = std::fs::read(source).map_err(|e| Error::tool_invocation(source, ENCODER, e))?;
        let image =
            image::load_from_memory(&bytes).map_err(|e| Error::tool_invocation(source, ENCODER, e))?;

        let fitted = fit_within(image, self.max_dimension);
        let destination = output_path(source, out_dir);
        DynamicImage::ImageRgba8(fitted.to_rgba8())
            .save_with_format(&destination, ImageFormat::WebP)
            .map_err(|e| Error::tool_invocation(source, ENCODER, e))?;

        Ok(destination)
    }
}

/// Scale down to fit within `bound` x `bound`, preserving aspect ratio
///
/// Images already inside the box are returned unchanged.
pub(crate) fn fit_within(image: DynamicImage, bound: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= bound && height <= bound {
        return image;
    }
    image.resize(bound, bound, FilterType::Lanczos3)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let mut image = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        image.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let path = dir.join(name);
        image.save_with_format(&path, ImageFormat::Png).unwrap();
        path
    }

    #[test]
    fn fit_never_upscales() {
        let small = DynamicImage::new_rgba8(100, 40);
        assert_eq!(fit_within(small, 512).dimensions(), (100, 40));
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        let wide = DynamicImage::new_rgba8(1024, 512);
        assert_eq!(fit_within(wide, 512).dimensions(), (512, 256));

        let tall = DynamicImage::new_rgba8(300, 900);
        assert_eq!(fit_within(tall, 96).dimensions(), (32, 96));
    }

    #[test]
    fn converts_png_to_webp_with_alpha() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "004.png", 1024, 768);

        let output = StillImageConverter::new(512)
            .convert(&source, temp.path())
            .unwrap();

        assert_eq!(output, temp.path().join("004.webp"));
        let decoded = image::open(&output).unwrap();
        assert_eq!(decoded.dimensions(), (512, 384));
        assert_eq!(
            image::guess_format(&std::fs::read(&output).unwrap()).unwrap(),
            ImageFormat::WebP
        );
        assert!(decoded.color().has_alpha());
    }

    #[test]
    fn format_is_sniffed_not_taken_from_extension() {
        let temp = TempDir::new().unwrap();
        // WebP bytes stored under a .png name, as providers often do
        let webp = temp.path().join("raw.webp");
        RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255]))
            .save_with_format(&webp, ImageFormat::WebP)
            .unwrap();
        let disguised = temp.path().join("000.png");
        std::fs::rename(&webp, &disguised).unwrap();

        let out_dir = temp.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let output = StillImageConverter::new(512)
            .convert(&disguised, &out_dir)
            .unwrap();
        assert_eq!(image::open(output).unwrap().dimensions(), (8, 8));
    }

    #[test]
    fn undecodable_input_is_tool_invocation() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("009.png");
        std::fs::write(&source, b"definitely not an image").unwrap();

        let err = StillImageConverter::new(512)
            .convert(&source, temp.path())
            .unwrap_err();
        match err {
            Error::ToolInvocation { item, tool, .. } => {
                assert_eq!(item, "009.png");
                assert_eq!(tool, "image");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
