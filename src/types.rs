//! Core types flowing through the pack pipeline

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

// Literal patterns, checked by the tests below
#[allow(clippy::expect_used)]
static PACK_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"addstickers/([A-Za-z0-9_]+)").expect("valid regex"));

#[allow(clippy::expect_used)]
static PACK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));

/// Which conversion variant a request asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    /// Still images re-encoded in process
    Static,
    /// Vector and video animations converted with external tools
    Animated,
}

impl ConversionMode {
    /// Whether this mode converts assets of the given kind
    #[must_use]
    pub fn accepts(self, kind: AssetKind) -> bool {
        match self {
            ConversionMode::Static => kind == AssetKind::Image,
            ConversionMode::Animated => {
                matches!(kind, AssetKind::VectorAnimation | AssetKind::VideoAnimation)
            }
        }
    }
}

/// A validated request to convert one pack
///
/// Only [`PackRequest::parse`] builds one, so the identifier is always a bare
/// pack name that is safe to use as a directory name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PackRequest {
    identifier: String,
    mode: ConversionMode,
}

impl PackRequest {
    /// Validate a pack reference and pair it with a mode
    ///
    /// Accepts a share link such as `https://t.me/addstickers/some_pack` or the
    /// bare pack name.
    ///
    /// ```
    /// use stickerpack_dl::{ConversionMode, PackRequest};
    ///
    /// let request = PackRequest::parse("https://t.me/addstickers/demo", ConversionMode::Static).unwrap();
    /// assert_eq!(request.identifier(), "demo");
    /// assert!(PackRequest::parse("https://t.me/joinchat/xyz", ConversionMode::Static).is_err());
    /// ```
    pub fn parse(reference: &str, mode: ConversionMode) -> Result<Self> {
        let reference = reference.trim();
        let identifier = if let Some(captures) = PACK_LINK.captures(reference) {
            captures[1].to_string()
        } else if PACK_NAME.is_match(reference) {
            reference.to_string()
        } else {
            return Err(Error::InvalidIdentifier(format!(
                "{:?} is not a pack link; use the form https://t.me/addstickers/<pack_name>",
                reference
            )));
        };

        Ok(Self { identifier, mode })
    }

    /// Pack name as known to the provider
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Conversion variant
    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    /// Build a request without validation, for exercising the file-system guards
    #[cfg(test)]
    pub(crate) fn unchecked(identifier: &str, mode: ConversionMode) -> Self {
        Self {
            identifier: identifier.to_string(),
            mode,
        }
    }
}

/// Reject identifiers that are not a bare pack name
///
/// Pack identifiers become directory names under the working directory, so
/// anything but `[A-Za-z0-9_]+` (empty, `..`, separators, absolute paths) is
/// refused before the file system is touched.
pub(crate) fn ensure_pack_name(identifier: &str) -> Result<()> {
    if PACK_NAME.is_match(identifier) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(format!(
            "{:?} is not a valid pack name",
            identifier
        )))
    }
}

/// Kind of a remote item, as reported by the manifest
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Still image
    Image,
    /// Lottie vector animation (gzip-compressed archive)
    VectorAnimation,
    /// Video animation
    VideoAnimation,
}

impl AssetKind {
    /// Raw format the item is stored in after download
    #[must_use]
    pub fn raw_format(self) -> RawFormat {
        match self {
            AssetKind::Image => RawFormat::Png,
            AssetKind::VectorAnimation => RawFormat::Tgs,
            AssetKind::VideoAnimation => RawFormat::Webm,
        }
    }
}

/// On-disk format of a downloaded item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawFormat {
    /// Raw still image
    Png,
    /// Vector animation archive
    Tgs,
    /// Raw video
    Webm,
}

impl RawFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            RawFormat::Png => "png",
            RawFormat::Tgs => "tgs",
            RawFormat::Webm => "webm",
        }
    }

    /// Asset kind stored in this format
    #[must_use]
    pub fn kind(self) -> AssetKind {
        match self {
            RawFormat::Png => AssetKind::Image,
            RawFormat::Tgs => AssetKind::VectorAnimation,
            RawFormat::Webm => AssetKind::VideoAnimation,
        }
    }
}

/// Output codec required by the downstream consumer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCodec {
    /// WebP (still or animated)
    #[default]
    Webp,
}

impl TargetCodec {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            TargetCodec::Webp => "webp",
        }
    }
}

/// One remote item as listed in a pack manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Position in the manifest (0-based)
    pub sequence_index: usize,
    /// Item kind
    pub kind: AssetKind,
    /// Provider-specific reference used to resolve the download URL
    pub remote_locator: String,
}

/// A downloaded item on disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalAsset {
    /// Manifest position of the source item
    pub sequence_index: usize,
    /// Path of the stored file
    pub path: PathBuf,
    /// Format the file is stored in
    pub raw_format: RawFormat,
}

impl LocalAsset {
    /// File name for an item: zero-padded index plus raw extension
    #[must_use]
    pub fn file_name(sequence_index: usize, raw_format: RawFormat) -> String {
        format!("{:03}.{}", sequence_index, raw_format.extension())
    }
}

/// A successfully converted item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedAsset {
    /// Manifest position of the source item
    pub source_index: usize,
    /// Path of the converted file
    pub path: PathBuf,
    /// Codec of the converted file
    pub target_format: TargetCodec,
}

/// Which part of a group an archive carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchivePart {
    /// The whole group
    Whole,
    /// First half of a split group
    A,
    /// Second half of a split group
    B,
}

impl ArchivePart {
    /// Suffix used in labels and file names (`""`, `"_A"`, `"_B"`)
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            ArchivePart::Whole => "",
            ArchivePart::A => "_A",
            ArchivePart::B => "_B",
        }
    }
}

/// An archive that was handed to the delivery channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveredArchive {
    /// 1-based group ordinal
    pub ordinal: usize,
    /// Whole group or one half of it
    pub part: ArchivePart,
    /// File name used for the upload
    pub file_name: String,
    /// Archive size in bytes
    pub size_bytes: u64,
    /// Source indices of the members, in archive order
    pub members: Vec<usize>,
}

/// Outcome of a successful pipeline run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Pack identifier
    pub identifier: String,
    /// Conversion variant used
    pub mode: ConversionMode,
    /// Items downloaded
    pub fetched: usize,
    /// Items converted
    pub converted: usize,
    /// Archives delivered, in send order
    pub archives: Vec<DeliveredArchive>,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_share_link() {
        let request = PackRequest::parse(
            "  https://t.me/addstickers/Cute_Cats2  ",
            ConversionMode::Animated,
        )
        .unwrap();
        assert_eq!(request.identifier(), "Cute_Cats2");
        assert_eq!(request.mode(), ConversionMode::Animated);
    }

    #[test]
    fn parse_accepts_bare_name() {
        let request = PackRequest::parse("demo", ConversionMode::Static).unwrap();
        assert_eq!(request.identifier(), "demo");
    }

    #[test]
    fn parse_rejects_malformed_reference() {
        for reference in ["", "https://t.me/joinchat/abc", "two words", "pack-with-dash"] {
            let err = PackRequest::parse(reference, ConversionMode::Static).unwrap_err();
            assert!(
                matches!(err, Error::InvalidIdentifier(_)),
                "{reference:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn pack_name_guard_rejects_path_like_identifiers() {
        for identifier in ["", "..", "../x", "a/b", "/etc", "C:\\x", "demo pack"] {
            let err = ensure_pack_name(identifier).unwrap_err();
            assert!(matches!(err, Error::InvalidIdentifier(_)), "{identifier:?}");
        }
        ensure_pack_name("Cute_Cats2").unwrap();
    }

    #[test]
    fn mode_filters_kinds() {
        assert!(ConversionMode::Static.accepts(AssetKind::Image));
        assert!(!ConversionMode::Static.accepts(AssetKind::VideoAnimation));
        assert!(ConversionMode::Animated.accepts(AssetKind::VectorAnimation));
        assert!(ConversionMode::Animated.accepts(AssetKind::VideoAnimation));
        assert!(!ConversionMode::Animated.accepts(AssetKind::Image));
    }

    #[test]
    fn local_file_names_are_zero_padded() {
        assert_eq!(LocalAsset::file_name(0, RawFormat::Png), "000.png");
        assert_eq!(LocalAsset::file_name(35, RawFormat::Webm), "035.webm");
        assert_eq!(LocalAsset::file_name(7, AssetKind::VectorAnimation.raw_format()), "007.tgs");
    }
}
