//! Archive packaging and delivery
//!
//! Converted items are grouped (30 per archive by default). Each group becomes
//! one ZIP that sticker maker apps import directly:
//!
//! ```text
//! author.txt       pack label
//! title.txt        "<label> (Pack NN)"
//! icon.png         first member fitted into the icon box
//! sticker_0.webp … sticker_{n-1}.webp
//! ```
//!
//! An archive over the payload ceiling is rebuilt as two halves when the group
//! is large enough to split; otherwise it is sent as-is.

use crate::config::PackagingConfig;
use crate::convert::fit_within;
use crate::error::{DeliveryError, Error, Result};
use crate::progress::{ProgressReporter, StatusHandle};
use crate::types::{ArchivePart, ConvertedAsset, DeliveredArchive};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Status label of the packaging stage
pub const PACKING_LABEL: &str = "📦 Building archive packs …";

/// Final notice once every archive is delivered
pub const ALL_DELIVERED: &str =
    "🎉 Done! All packs delivered. Share a ZIP straight to a sticker maker app, or extract and import it.";

/// Where finished archives go
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send one archive as a document
    async fn send_archive(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> std::result::Result<(), DeliveryError>;

    /// Send a plain text notice
    async fn send_notice(&self, text: &str) -> std::result::Result<(), DeliveryError>;
}

/// Split `items` into consecutive groups of `size` (the last may be smaller)
///
/// ```
/// use stickerpack_dl::packaging::chunk;
///
/// let items: Vec<u32> = (0..65).collect();
/// let sizes: Vec<usize> = chunk(&items, 30).iter().map(|g| g.len()).collect();
/// assert_eq!(sizes, vec![30, 30, 5]);
/// ```
pub fn chunk<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

/// Build one archive in memory
///
/// `members` are written as `sticker_<i>.webp` in the given order. When the
/// first member cannot be decoded the icon is left transparent.
///
/// # Errors
/// [`Error::Io`] when a member cannot be read, [`Error::Archive`] or
/// [`Error::Image`] when the archive or icon cannot be written.
pub fn build_archive(label: &str, ordinal: usize, members: &[PathBuf], icon_size: u32) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("author.txt", options)?;
    zip.write_all(label.as_bytes())?;

    zip.start_file("title.txt", options)?;
    zip.write_all(format!("{} ({})", label, pack_tag(ordinal)).as_bytes())?;

    if let Some(first) = members.first() {
        zip.start_file("icon.png", options)?;
        zip.write_all(&render_icon(first, icon_size)?)?;
    }

    for (i, member) in members.iter().enumerate() {
        zip.start_file(format!("sticker_{}.webp", i), options)?;
        zip.write_all(&std::fs::read(member)?)?;
    }

    Ok(zip.finish()?.into_inner())
}

fn pack_tag(ordinal: usize) -> String {
    format!("Pack {:02}", ordinal)
}

fn render_icon(source: &Path, icon_size: u32) -> Result<Vec<u8>> {
    let decoded = ImageReader::open(source)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.decode());

    let icon = match decoded {
        Ok(image) => fit_within(image, icon_size),
        Err(e) => {
            warn!(source = %source.display(), error = %e, "icon source undecodable, using blank icon");
            DynamicImage::new_rgba8(icon_size, icon_size)
        }
    };

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(icon.to_rgba8()).write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}

async fn build_archive_blocking(
    label: String,
    ordinal: usize,
    members: Vec<PathBuf>,
    icon_size: u32,
) -> Result<Vec<u8>> {
    spawn_blocking(move || build_archive(&label, ordinal, &members, icon_size))
        .await
        .map_err(|e| Error::Other(format!("archive task panicked: {}", e)))?
}

/// Groups converted items into archives and sends them
pub struct Packager {
    config: PackagingConfig,
}

impl Packager {
    /// Create a packager
    pub fn new(config: PackagingConfig) -> Self {
        Self { config }
    }

    /// Package and deliver every converted item of a pack
    ///
    /// Archives go out in group order, each followed by the configured pause.
    /// A delivery failure stops the stage.
    pub async fn package(
        &self,
        identifier: &str,
        converted: &[ConvertedAsset],
        channel: &dyn DeliveryChannel,
        status: StatusHandle,
    ) -> Result<Vec<DeliveredArchive>> {
        let groups = chunk(converted, self.config.group_size);
        let total = groups.len();
        let reporter = ProgressReporter::new(PACKING_LABEL, total, status, "Packing");
        let mut delivered = Vec::new();

        info!(identifier, items = converted.len(), groups = total, "packaging");

        for (i, group) in groups.into_iter().enumerate() {
            let ordinal = i + 1;
            let paths: Vec<PathBuf> = group.iter().map(|asset| asset.path.clone()).collect();
            let indices: Vec<usize> = group.iter().map(|asset| asset.source_index).collect();

            let whole =
                build_archive_blocking(identifier.to_string(), ordinal, paths.clone(), self.config.icon_size)
                    .await?;
            let size = whole.len() as u64;

            if size > self.config.payload_ceiling && group.len() > self.config.min_split_members {
                info!(ordinal, size, ceiling = self.config.payload_ceiling, "archive too large, splitting");
                drop(whole);

                let half = group.len() / 2;
                for (part, range) in [(ArchivePart::A, 0..half), (ArchivePart::B, half..group.len())] {
                    let label = format!("{}{}", identifier, part.suffix());
                    let bytes = build_archive_blocking(
                        label,
                        ordinal,
                        paths[range.clone()].to_vec(),
                        self.config.icon_size,
                    )
                    .await?;
                    let archive = self
                        .deliver(channel, identifier, ordinal, total, part, bytes, &indices[range])
                        .await?;
                    delivered.push(archive);
                }
            } else {
                let archive = self
                    .deliver(channel, identifier, ordinal, total, ArchivePart::Whole, whole, &indices)
                    .await?;
                delivered.push(archive);
            }

            reporter.report(ordinal);
        }

        reporter.complete("");
        channel.send_notice(ALL_DELIVERED).await?;

        info!(identifier, archives = delivered.len(), "all archives delivered");
        Ok(delivered)
    }

    #[allow(clippy::too_many_arguments)]
    async fn deliver(
        &self,
        channel: &dyn DeliveryChannel,
        identifier: &str,
        ordinal: usize,
        total: usize,
        part: ArchivePart,
        bytes: Vec<u8>,
        members: &[usize],
    ) -> Result<DeliveredArchive> {
        let file_name = format!("{}_pack{:02}{}.zip", identifier, ordinal, part.suffix());
        let size_bytes = bytes.len() as u64;

        if size_bytes > self.config.payload_ceiling {
            warn!(
                file_name,
                size_bytes,
                ceiling = self.config.payload_ceiling,
                "archive exceeds payload ceiling, sending anyway"
            );
        }

        let caption = caption(identifier, ordinal, total, part, members.len());
        channel.send_archive(&file_name, bytes, &caption).await?;
        debug!(file_name, size_bytes, "archive delivered");
        tokio::time::sleep(self.config.send_delay).await;

        Ok(DeliveredArchive {
            ordinal,
            part,
            file_name,
            size_bytes,
            members: members.to_vec(),
        })
    }
}

fn caption(identifier: &str, ordinal: usize, total: usize, part: ArchivePart, members: usize) -> String {
    let part = match part {
        ArchivePart::Whole => String::new(),
        ArchivePart::A => " (part A)".to_string(),
        ArchivePart::B => " (part B)".to_string(),
    };
    format!(
        "📦 {} — Pack {}/{}{}\nFormat: author.txt, title.txt, icon.png, sticker_0.webp..sticker_{}.webp",
        identifier,
        ordinal,
        total,
        part,
        members.saturating_sub(1)
    )
}
