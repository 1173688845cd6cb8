//! Full-library theme acquisition.
//!
//! One run walks every series lacking a theme track: resolve a URL through
//! the provider chain, download to a deterministic temp entry under the
//! cache root, normalize, and move the result into the series' storage root.
//! Failures are isolated per series; nothing below this module ever aborts
//! the batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::library::{SeriesRecord, SeriesSource};
use crate::normalize::Normalizer;
use crate::providers::{ResolutionChain, USER_AGENT};

/// Fixed subpath for theme temp entries under the cache root.
const CACHE_SUBDIR: &str = "theme_songs";

/// Per-series result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionOutcome {
    /// Theme track already present.
    Skipped,
    /// No provider produced a URL.
    NotFound,
    /// Downloaded, normalized, and placed.
    Placed,
    /// A step failed; the cause is for logging only.
    Failed(String),
    /// The run was cancelled while this series was in flight.
    Cancelled,
}

/// Summary of one full-library run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcquisitionReport {
    pub processed: usize,
    pub placed: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

/// Settings the acquirer needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct AcquirerSettings {
    /// Root under which the `theme_songs` temp directory is created.
    pub cache_root: PathBuf,
    /// Whether downloaded files are loudness-normalized before placement.
    pub normalize: bool,
    /// Target loudness in dB for normalization.
    pub target_db: i32,
    /// Timeout for each ffmpeg invocation.
    pub ffmpeg_timeout: Duration,
    /// Timeout for each download request.
    pub http_timeout: Duration,
}

/// Orchestrates theme acquisition across the whole library.
pub struct Acquirer {
    series_source: Arc<dyn SeriesSource>,
    chain: ResolutionChain,
    download_client: Client,
    normalizer: Option<Normalizer>,
    cache_root: PathBuf,
    running: AtomicBool,
}

impl Acquirer {
    pub fn new(
        series_source: Arc<dyn SeriesSource>,
        chain: ResolutionChain,
        settings: AcquirerSettings,
    ) -> Result<Self> {
        // The download may target the scrape host, which needs the same
        // trust-all override as its provider.
        let download_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.http_timeout)
            .danger_accept_invalid_certs(true)
            .build()?;

        let normalizer = settings
            .normalize
            .then(|| Normalizer::new(settings.target_db, settings.ffmpeg_timeout));

        Ok(Self {
            series_source,
            chain,
            download_client,
            normalizer,
            cache_root: settings.cache_root,
            running: AtomicBool::new(false),
        })
    }

    /// Run one full-library acquisition pass.
    ///
    /// At most one run per acquirer is in flight at a time; an overlapping
    /// call fails immediately. Cancellation is honored between series and
    /// interrupts an in-flight resolution or download.
    pub async fn run(&self, cancel: CancellationToken) -> Result<AcquisitionReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("an acquisition run is already in flight");
        }
        let result = self.run_inner(cancel).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, cancel: CancellationToken) -> Result<AcquisitionReport> {
        let series_list = self.series_source.list_series()?;
        info!(
            "starting theme acquisition for {} series with {} providers",
            series_list.len(),
            self.chain.len()
        );

        let mut report = AcquisitionReport::default();
        for series in &series_list {
            if cancel.is_cancelled() {
                info!("acquisition cancelled, stopping after {} series", report.processed);
                break;
            }
            report.processed += 1;

            match self.acquire_one(series, &cancel).await {
                AcquisitionOutcome::Skipped => {
                    report.skipped += 1;
                    debug!("{} already has a theme song", series.name);
                }
                AcquisitionOutcome::NotFound => {
                    report.not_found += 1;
                    info!("{} theme song not found", series.name);
                }
                AcquisitionOutcome::Placed => {
                    report.placed += 1;
                    info!("{} theme song successfully downloaded", series.name);
                }
                AcquisitionOutcome::Failed(cause) => {
                    report.failed += 1;
                    warn!("{} theme acquisition failed: {}", series.name, cause);
                }
                AcquisitionOutcome::Cancelled => {
                    info!("{} theme acquisition interrupted", series.name);
                    break;
                }
            }
        }

        info!(
            "theme acquisition finished: {} placed, {} not found, {} skipped, {} failed",
            report.placed, report.not_found, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn acquire_one(
        &self,
        series: &SeriesRecord,
        cancel: &CancellationToken,
    ) -> AcquisitionOutcome {
        if series.has_theme {
            return AcquisitionOutcome::Skipped;
        }

        let resolved = tokio::select! {
            url = self.chain.resolve(series) => url,
            _ = cancel.cancelled() => return AcquisitionOutcome::Cancelled,
        };
        let Some(url) = resolved else {
            return AcquisitionOutcome::NotFound;
        };

        match self.download_and_place(series, &url, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => AcquisitionOutcome::Failed(format!("{:#}", err)),
        }
    }

    async fn download_and_place(
        &self,
        series: &SeriesRecord,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionOutcome> {
        let cache_dir = self.cache_root.join(CACHE_SUBDIR);
        // Idempotent create; safe if several runs share the directory.
        tokio::fs::create_dir_all(&cache_dir)
            .await
            .context("creating theme cache directory")?;

        let temp_path = cache_dir.join(temp_file_name(series));
        info!(
            "downloading {} theme song from {} to {:?}",
            series.name, url, temp_path
        );

        // Cancellation drops the transfer mid-flight; the temp entry is
        // still cleaned up below either way.
        let result = tokio::select! {
            result = self.fetch_and_place(series, url, &temp_path) => {
                result.map(|()| AcquisitionOutcome::Placed)
            }
            _ = cancel.cancelled() => Ok(AcquisitionOutcome::Cancelled),
        };

        // The temp entry is removed on success and failure alike; entries are
        // deterministic per series and always overwritten, never appended.
        if temp_path.exists() {
            if let Err(err) = tokio::fs::remove_file(&temp_path).await {
                warn!("failed to remove temp file {:?}: {}", temp_path, err);
            }
        }

        result
    }

    async fn fetch_and_place(
        &self,
        series: &SeriesRecord,
        url: &str,
        temp_path: &Path,
    ) -> Result<()> {
        self.download(url, temp_path).await?;

        let placed_source = match &self.normalizer {
            Some(normalizer) => normalizer
                .normalize(temp_path)
                .await
                .context("normalizing audio")?,
            None => temp_path.to_path_buf(),
        };

        let theme_path = series.theme_path();
        replace_file(&placed_source, &theme_path)
            .await
            .with_context(|| format!("placing theme at {:?}", theme_path))?;
        Ok(())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .download_client
            .get(url)
            .send()
            .await
            .context("download request failed")?;

        if !response.status().is_success() {
            bail!("download failed with status {}", response.status());
        }

        let bytes = response.bytes().await.context("reading download body")?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("writing {:?}", dest))?;
        Ok(())
    }
}

/// Deterministic temp entry name: `<name>_<tvdb id>.mp3`, with path
/// separators in the display name replaced so the entry stays inside the
/// cache directory.
fn temp_file_name(series: &SeriesRecord) -> String {
    let id = series.tvdb_id.as_deref().unwrap_or("unknown");
    let name: String = series
        .name
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect();
    format!("{}_{}.mp3", name, id)
}

/// Move `source` over `dest`, replacing any prior file. Falls back to
/// copy-and-remove when the rename crosses filesystems.
async fn replace_file(source: &Path, dest: &Path) -> Result<()> {
    if tokio::fs::rename(source, dest).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(source, dest).await?;
    tokio::fs::remove_file(source).await?;
    Ok(())
}
