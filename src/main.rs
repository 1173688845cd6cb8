use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tokio_util::sync::CancellationToken;

use themetunes::acquisition::{Acquirer, AcquirerSettings};
use themetunes::config::{AppConfig, CliConfig, FileConfig};
use themetunes::library::ManifestSeriesSource;
use themetunes::providers::{
    ResolutionChain, TelevisionTunesProvider, ThemeProvider, TvThemesProvider,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the series library manifest (JSON).
    #[clap(value_parser = parse_path)]
    pub library_manifest: Option<PathBuf>,

    /// Path to a TOML config file. Values there override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Cache root for temporary theme downloads. Defaults to the system
    /// temp directory.
    #[clap(long, value_parser = parse_path)]
    pub cache_dir: Option<PathBuf>,

    /// Timeout in seconds for each HTTP request.
    #[clap(long, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Timeout in seconds for each ffmpeg invocation.
    #[clap(long, default_value_t = 120)]
    pub ffmpeg_timeout_secs: u64,

    /// Place downloaded themes as-is, without loudness normalization.
    #[clap(long)]
    pub skip_normalize: bool,

    /// Target loudness in dB for normalization.
    #[clap(long, default_value_t = -15, allow_hyphen_values = true)]
    pub target_db: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };

    let cli_config = CliConfig {
        library_manifest: cli_args.library_manifest,
        cache_dir: cli_args.cache_dir,
        http_timeout_secs: cli_args.http_timeout_secs,
        ffmpeg_timeout_secs: cli_args.ffmpeg_timeout_secs,
        skip_normalize: cli_args.skip_normalize,
        target_db: cli_args.target_db,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Reading series from {:?}", config.library_manifest);
    let series_source = Arc::new(ManifestSeriesSource::new(&config.library_manifest));

    let mut providers: Vec<Arc<dyn ThemeProvider>> = Vec::new();
    if config.providers.television_tunes.enabled {
        providers.push(Arc::new(TelevisionTunesProvider::new(
            config.providers.television_tunes.priority,
            config.http_timeout_secs,
        )?));
    }
    if config.providers.tvthemes.enabled {
        providers.push(Arc::new(TvThemesProvider::new(
            config.providers.tvthemes.priority,
            config.http_timeout_secs,
        )?));
    }
    if providers.is_empty() {
        warn!("No theme providers enabled; nothing will be resolved");
    }
    let chain = ResolutionChain::new(providers);

    let acquirer = Acquirer::new(
        series_source,
        chain,
        AcquirerSettings {
            cache_root: config.cache_dir.clone(),
            normalize: config.normalization.enabled,
            target_db: config.normalization.target_db,
            ffmpeg_timeout: Duration::from_secs(config.ffmpeg_timeout_secs),
            http_timeout: Duration::from_secs(config.http_timeout_secs),
        },
    )?;

    // Ctrl-C stops the batch between series.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, finishing current series...");
                cancel.cancel();
            }
        });
    }

    let report = acquirer.run(cancel).await?;
    info!(
        "Done: {} placed, {} not found, {} skipped, {} failed",
        report.placed, report.not_found, report.skipped, report.failed
    );
    Ok(())
}
