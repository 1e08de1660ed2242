//! End-to-end pack run: acquire, convert, package, deliver
//!
//! A [`Pipeline`] is built once and shared; every [`Pipeline::run`] call owns
//! its own status dispatcher and pack directory. Two runs for the same pack
//! identifier never overlap.

use crate::acquisition::AcquisitionService;
use crate::config::Config;
use crate::convert::ConversionEngine;
use crate::error::{Error, Result};
use crate::fetch::PackProvider;
use crate::packaging::{DeliveryChannel, Packager};
use crate::progress::{StatusDispatcher, StatusHandle, StatusSink};
use crate::telegram::TelegramProvider;
use crate::types::{DeliveredArchive, LocalAsset, PackRequest, RunSummary};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Drives pack requests through every stage
pub struct Pipeline {
    config: Config,
    acquisition: AcquisitionService,
    engine: ConversionEngine,
    packager: Packager,
    active: Mutex<HashSet<String>>,
}

impl Pipeline {
    /// Create a pipeline backed by the Telegram Bot API
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let provider = Arc::new(TelegramProvider::new(&config)?);
        Ok(Self::assemble(config, provider))
    }

    /// Create a pipeline over any provider
    ///
    /// Provider credentials are not checked; they belong to the provider.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when the configuration is invalid
    pub fn with_provider(config: Config, provider: Arc<dyn PackProvider>) -> Result<Self> {
        config.validate_pipeline()?;
        Ok(Self::assemble(config, provider))
    }

    fn assemble(config: Config, provider: Arc<dyn PackProvider>) -> Self {
        Self {
            acquisition: AcquisitionService::new(provider, &config.download),
            engine: ConversionEngine::new(&config),
            packager: Packager::new(config.packaging.clone()),
            config,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the conversion engine
    #[must_use]
    pub fn with_engine(mut self, engine: ConversionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one pack request to completion
    ///
    /// Progress and the final outcome are written to `status_sink`; archives
    /// and the closing notice go to `channel`. On failure the status shows one
    /// line describing the error, and the error is returned. Every status
    /// update has been applied by the time this returns.
    pub async fn run(
        &self,
        request: &PackRequest,
        status_sink: Arc<dyn StatusSink>,
        channel: &dyn DeliveryChannel,
    ) -> Result<RunSummary> {
        let dispatcher = StatusDispatcher::spawn(status_sink);
        let status = dispatcher.handle();

        let result = match self.claim(request.identifier()) {
            Ok(_guard) => {
                status.set(format!("🔎 Checking pack {} …", request.identifier()));
                self.run_stages(request, channel, &status).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(summary) => info!(
                identifier = %summary.identifier,
                fetched = summary.fetched,
                converted = summary.converted,
                archives = summary.archives.len(),
                "run finished"
            ),
            Err(e) => {
                error!(identifier = request.identifier(), code = e.error_code(), error = %e, "run failed");
                status.set(e.user_message());
            }
        }

        dispatcher.close().await;
        result
    }

    async fn run_stages(
        &self,
        request: &PackRequest,
        channel: &dyn DeliveryChannel,
        status: &StatusHandle,
    ) -> Result<RunSummary> {
        let identifier = request.identifier();

        let assets = self.acquisition.acquire(request, status.clone()).await?;
        let fetched = assets.len();

        let pack_dir = self.acquisition.pack_dir(identifier);
        let out_dir = ConversionEngine::output_dir(&pack_dir, request.mode());
        let result = self
            .convert_and_package(request, &pack_dir, assets, channel, status)
            .await;
        remove_output_dir(&out_dir).await;

        let (converted, archives) = result?;
        Ok(RunSummary {
            identifier: identifier.to_string(),
            mode: request.mode(),
            fetched,
            converted,
            archives,
        })
    }

    async fn convert_and_package(
        &self,
        request: &PackRequest,
        pack_dir: &Path,
        assets: Vec<LocalAsset>,
        channel: &dyn DeliveryChannel,
        status: &StatusHandle,
    ) -> Result<(usize, Vec<DeliveredArchive>)> {
        let identifier = request.identifier();
        let converted = self
            .engine
            .convert(request.mode(), pack_dir, assets, status.clone())
            .await?;
        if converted.is_empty() {
            return Err(Error::EmptyResult {
                identifier: identifier.to_string(),
            });
        }

        let archives = self
            .packager
            .package(identifier, &converted, channel, status.clone())
            .await?;
        Ok((converted.len(), archives))
    }

    /// Mark `identifier` in flight until the guard drops
    fn claim(&self, identifier: &str) -> Result<RunGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(identifier.to_string()) {
            return Err(Error::RunInProgress(identifier.to_string()));
        }
        Ok(RunGuard {
            active: &self.active,
            identifier: identifier.to_string(),
        })
    }
}

/// Converted files only live for the duration of a run
async fn remove_output_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(dir = %dir.display(), "removed conversion output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "failed to remove conversion output"),
    }
}

struct RunGuard<'a> {
    active: &'a Mutex<HashSet<String>>,
    identifier: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.identifier);
    }
}
