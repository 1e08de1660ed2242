//! Concurrent download of every item in a pack
//!
//! The manifest is resolved with one provider call, the pack directory is
//! recreated empty, then all items are fetched with a bounded number in
//! flight. Results land in slots keyed by manifest index, so the returned
//! assets are in manifest order no matter which fetch finishes first. The
//! first fetch that exhausts its retries aborts the whole stage.

use crate::config::DownloadConfig;
use crate::error::{AcquisitionError, Error, Result};
use crate::fetch::PackProvider;
use crate::progress::{ProgressReporter, StatusHandle};
use crate::types::{AssetDescriptor, LocalAsset, PackRequest, ensure_pack_name};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Status label of the download stage
pub const DOWNLOAD_LABEL: &str = "⬇️ Downloading stickers …";

/// Downloads packs into `<base_dir>/<identifier>`
pub struct AcquisitionService {
    provider: Arc<dyn PackProvider>,
    base_dir: PathBuf,
    max_concurrent_fetches: usize,
}

impl AcquisitionService {
    /// Create a service over `provider`
    pub fn new(provider: Arc<dyn PackProvider>, config: &DownloadConfig) -> Self {
        Self {
            provider,
            base_dir: config.base_dir.clone(),
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
        }
    }

    /// Working directory of a pack
    pub fn pack_dir(&self, identifier: &str) -> PathBuf {
        self.base_dir.join(identifier)
    }

    /// Download every item of the requested pack
    ///
    /// # Errors
    /// - [`Error::InvalidIdentifier`] when the identifier is not a bare pack name
    /// - [`AcquisitionError::InvalidPack`] when the provider rejects the pack
    /// - [`AcquisitionError::Fetch`] when any item exhausts its retries
    /// - [`Error::Io`] when the pack directory cannot be prepared or written
    pub async fn acquire(
        &self,
        request: &PackRequest,
        status: StatusHandle,
    ) -> Result<Vec<LocalAsset>> {
        let identifier = request.identifier();
        ensure_pack_name(identifier)?;
        let manifest = self.provider.get_manifest(identifier).await?;
        let total = manifest.len();
        info!(identifier, total, "downloading pack");

        let dir = self.pack_dir(identifier);
        prepare_dir(&dir).await?;

        let reporter = ProgressReporter::new(DOWNLOAD_LABEL, total, status, "Download");
        let slots: Mutex<Vec<Option<LocalAsset>>> = Mutex::new(vec![None; total]);
        let limit = Semaphore::new(self.max_concurrent_fetches);

        let fetches = manifest.iter().map(|descriptor| {
            self.fetch_into_slot(descriptor, &dir, &limit, &slots, &reporter)
        });
        try_join_all(fetches).await?;

        let assets: Vec<LocalAsset> = slots
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .into_iter()
            .flatten()
            .collect();

        reporter.complete(&format!("Total file: {}", assets.len()));
        info!(identifier, fetched = assets.len(), "pack downloaded");
        Ok(assets)
    }

    async fn fetch_into_slot(
        &self,
        descriptor: &AssetDescriptor,
        dir: &Path,
        limit: &Semaphore,
        slots: &Mutex<Vec<Option<LocalAsset>>>,
        reporter: &ProgressReporter,
    ) -> Result<()> {
        let index = descriptor.sequence_index;
        let _permit = limit
            .acquire()
            .await
            .map_err(|e| Error::Other(format!("fetch limiter closed: {}", e)))?;

        let fetch_error = |source| AcquisitionError::Fetch { index, source };
        let url = self
            .provider
            .resolve_location(&descriptor.remote_locator)
            .await
            .map_err(fetch_error)?;
        let bytes = self.provider.fetch(&url).await.map_err(fetch_error)?;

        let raw_format = descriptor.kind.raw_format();
        let path = dir.join(LocalAsset::file_name(index, raw_format));
        tokio::fs::write(&path, &bytes).await?;
        debug!(index, bytes = bytes.len(), path = %path.display(), "item stored");

        let filled = {
            let mut slots = slots.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(LocalAsset {
                    sequence_index: index,
                    path,
                    raw_format,
                });
            }
            slots.iter().filter(|slot| slot.is_some()).count()
        };
        reporter.report(filled);

        Ok(())
    }
}

/// Remove whatever a previous run left and recreate the directory
async fn prepare_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "removed previous pack directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::progress::StatusDispatcher;
    use crate::progress::tests::RecordingSink;
    use crate::types::{AssetKind, ConversionMode};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory provider; later items finish first
    pub(crate) struct FakeProvider {
        pub(crate) items: Vec<(AssetKind, Vec<u8>)>,
        pub(crate) failing: HashSet<usize>,
        pub(crate) in_flight: AtomicUsize,
        pub(crate) peak_in_flight: AtomicUsize,
    }

    impl FakeProvider {
        pub(crate) fn new(items: Vec<(AssetKind, Vec<u8>)>) -> Self {
            Self {
                items,
                failing: HashSet::new(),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PackProvider for FakeProvider {
        async fn get_manifest(
            &self,
            identifier: &str,
        ) -> std::result::Result<Vec<AssetDescriptor>, AcquisitionError> {
            if identifier == "missing" {
                return Err(AcquisitionError::InvalidPack {
                    identifier: identifier.to_string(),
                    reason: "STICKERSET_INVALID".into(),
                });
            }
            Ok(self
                .items
                .iter()
                .enumerate()
                .map(|(i, (kind, _))| AssetDescriptor {
                    sequence_index: i,
                    kind: *kind,
                    remote_locator: i.to_string(),
                })
                .collect())
        }

        async fn resolve_location(
            &self,
            locator: &str,
        ) -> std::result::Result<String, FetchError> {
            Ok(format!("mem://{}", locator))
        }

        async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            let index: usize = url.trim_start_matches("mem://").parse().unwrap();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = (self.items.len() - index) as u64;
            tokio::time::sleep(Duration::from_millis(delay * 2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&index) {
                return Err(FetchError::TransientStatus {
                    status: 503,
                    url: url.to_string(),
                });
            }
            Ok(self.items[index].1.clone())
        }
    }

    fn service(provider: Arc<FakeProvider>, base: &Path) -> AcquisitionService {
        let config = DownloadConfig {
            base_dir: base.to_path_buf(),
            max_concurrent_fetches: 8,
        };
        AcquisitionService::new(provider, &config)
    }

    fn request(identifier: &str) -> PackRequest {
        PackRequest::parse(identifier, ConversionMode::Static).unwrap()
    }

    #[tokio::test]
    async fn assets_come_back_in_manifest_order() {
        let items: Vec<_> = (0..20u8)
            .map(|i| {
                let kind = if i % 5 == 0 {
                    AssetKind::VideoAnimation
                } else {
                    AssetKind::Image
                };
                (kind, vec![i; 4])
            })
            .collect();
        let provider = Arc::new(FakeProvider::new(items));
        let temp = TempDir::new().unwrap();

        let sink = Arc::new(RecordingSink::default());
        let dispatcher = StatusDispatcher::spawn(sink.clone());
        let assets = service(provider.clone(), temp.path())
            .acquire(&request("demo"), dispatcher.handle())
            .await
            .unwrap();
        dispatcher.close().await;

        assert_eq!(assets.len(), 20);
        for (i, asset) in assets.iter().enumerate() {
            assert_eq!(asset.sequence_index, i);
            assert_eq!(std::fs::read(&asset.path).unwrap(), vec![i as u8; 4]);
        }
        assert_eq!(assets[5].path, temp.path().join("demo").join("005.webm"));
        assert_eq!(assets[6].path, temp.path().join("demo").join("006.png"));

        assert!(provider.peak_in_flight.load(Ordering::SeqCst) <= 8);
        let texts = sink.texts.lock().unwrap();
        assert!(texts.last().unwrap().ends_with("Total file: 20"));
    }

    #[tokio::test]
    async fn previous_run_leftovers_are_removed() {
        let temp = TempDir::new().unwrap();
        let stale = temp.path().join("demo").join("stale.png");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"old").unwrap();

        let provider = Arc::new(FakeProvider::new(vec![(AssetKind::Image, b"x".to_vec())]));
        let dispatcher = StatusDispatcher::spawn(Arc::new(RecordingSink::default()));
        service(provider, temp.path())
            .acquire(&request("demo"), dispatcher.handle())
            .await
            .unwrap();
        dispatcher.close().await;

        assert!(!stale.exists());
        assert!(temp.path().join("demo").join("000.png").exists());
    }

    #[tokio::test]
    async fn exhausted_fetch_aborts_acquisition() {
        let mut provider = FakeProvider::new(vec![(AssetKind::Image, b"x".to_vec()); 6]);
        provider.failing.insert(3);
        let temp = TempDir::new().unwrap();

        let dispatcher = StatusDispatcher::spawn(Arc::new(RecordingSink::default()));
        let err = service(Arc::new(provider), temp.path())
            .acquire(&request("demo"), dispatcher.handle())
            .await
            .unwrap_err();
        dispatcher.close().await;

        match err {
            Error::Acquisition(AcquisitionError::Fetch { index, .. }) => assert_eq!(index, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_pack_surfaces_invalid_pack() {
        let provider = Arc::new(FakeProvider::new(vec![]));
        let temp = TempDir::new().unwrap();

        let dispatcher = StatusDispatcher::spawn(Arc::new(RecordingSink::default()));
        let err = service(provider, temp.path())
            .acquire(&request("missing"), dispatcher.handle())
            .await
            .unwrap_err();
        dispatcher.close().await;

        assert_eq!(err.error_code(), "invalid_pack");
        assert!(!temp.path().join("missing").exists());
    }

    #[tokio::test]
    async fn path_like_identifiers_never_touch_the_file_system() {
        let root = TempDir::new().unwrap();
        let base = root.path().join("stickers");
        let sibling = root.path().join("x").join("keep.txt");
        let other_pack = base.join("other_pack").join("000.png");
        for file in [&sibling, &other_pack] {
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, b"keep").unwrap();
        }

        let provider = Arc::new(FakeProvider::new(vec![(AssetKind::Image, b"x".to_vec())]));
        for identifier in ["../x", "", "..", "/tmp"] {
            let dispatcher = StatusDispatcher::spawn(Arc::new(RecordingSink::default()));
            let err = service(provider.clone(), &base)
                .acquire(
                    &PackRequest::unchecked(identifier, ConversionMode::Static),
                    dispatcher.handle(),
                )
                .await
                .unwrap_err();
            dispatcher.close().await;

            assert!(matches!(err, Error::InvalidIdentifier(_)), "{identifier:?} gave {err:?}");
        }

        assert!(sibling.exists());
        assert!(other_pack.exists());
    }
}
