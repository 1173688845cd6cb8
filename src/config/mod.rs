mod file_config;

pub use file_config::{FileConfig, NormalizationConfig, ProviderConfig, ProvidersConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// Mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub library_manifest: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
    pub ffmpeg_timeout_secs: u64,
    pub skip_normalize: bool,
    pub target_db: i32,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub library_manifest: PathBuf,
    pub cache_dir: PathBuf,
    pub http_timeout_secs: u64,
    pub ffmpeg_timeout_secs: u64,
    pub normalization: NormalizationSettings,
    pub providers: ProvidersSettings,
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizationSettings {
    pub enabled: bool,
    /// Target loudness in dB, rendered with a "dB" suffix where ffmpeg
    /// filter arguments need it.
    pub target_db: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Lower values are tried earlier.
    pub priority: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ProvidersSettings {
    pub television_tunes: ProviderSettings,
    pub tvthemes: ProviderSettings,
}

impl Default for ProvidersSettings {
    fn default() -> Self {
        // The scrape source goes first; the id-probe host is the fallback.
        Self {
            television_tunes: ProviderSettings {
                enabled: true,
                priority: 1,
            },
            tvthemes: ProviderSettings {
                enabled: true,
                priority: 2,
            },
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let library_manifest = file
            .library_manifest
            .map(PathBuf::from)
            .or_else(|| cli.library_manifest.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("library manifest must be specified via CLI or in config file")
            })?;

        if !library_manifest.exists() {
            bail!("Library manifest does not exist: {:?}", library_manifest);
        }

        let cache_dir = file
            .cache_dir
            .map(PathBuf::from)
            .or_else(|| cli.cache_dir.clone())
            .unwrap_or_else(std::env::temp_dir);

        let http_timeout_secs = file.http_timeout_secs.unwrap_or(cli.http_timeout_secs);
        let ffmpeg_timeout_secs = file.ffmpeg_timeout_secs.unwrap_or(cli.ffmpeg_timeout_secs);

        let norm_file = file.normalization.unwrap_or_default();
        let normalization = NormalizationSettings {
            enabled: norm_file.enabled.unwrap_or(!cli.skip_normalize),
            target_db: norm_file.target_db.unwrap_or(cli.target_db),
        };

        let defaults = ProvidersSettings::default();
        let providers_file = file.providers.unwrap_or_default();
        let providers = ProvidersSettings {
            television_tunes: merge_provider(
                providers_file.television_tunes,
                defaults.television_tunes,
            ),
            tvthemes: merge_provider(providers_file.tvthemes, defaults.tvthemes),
        };

        Ok(Self {
            library_manifest,
            cache_dir,
            http_timeout_secs,
            ffmpeg_timeout_secs,
            normalization,
            providers,
        })
    }
}

fn merge_provider(file: Option<ProviderConfig>, defaults: ProviderSettings) -> ProviderSettings {
    let file = file.unwrap_or_default();
    ProviderSettings {
        enabled: file.enabled.unwrap_or(defaults.enabled),
        priority: file.priority.unwrap_or(defaults.priority),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_manifest(manifest: PathBuf) -> CliConfig {
        CliConfig {
            library_manifest: Some(manifest),
            cache_dir: None,
            http_timeout_secs: 30,
            ffmpeg_timeout_secs: 120,
            skip_normalize: false,
            target_db: -15,
        }
    }

    fn temp_manifest() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("library.json");
        std::fs::write(&manifest, "[]").unwrap();
        (dir, manifest)
    }

    #[test]
    fn defaults_match_the_original_plugin() {
        let (_dir, manifest) = temp_manifest();
        let config = AppConfig::resolve(&cli_with_manifest(manifest), None).unwrap();

        assert!(config.normalization.enabled);
        assert_eq!(config.normalization.target_db, -15);
        assert!(config.providers.television_tunes.enabled);
        assert!(config.providers.tvthemes.enabled);
        assert!(
            config.providers.television_tunes.priority < config.providers.tvthemes.priority
        );
    }

    #[test]
    fn toml_overrides_cli() {
        let (_dir, manifest) = temp_manifest();
        let file: FileConfig = toml::from_str(
            r#"
            http_timeout_secs = 10

            [normalization]
            enabled = false
            target_db = -20

            [providers.tvthemes]
            priority = 0
            "#,
        )
        .unwrap();

        let config = AppConfig::resolve(&cli_with_manifest(manifest), Some(file)).unwrap();
        assert_eq!(config.http_timeout_secs, 10);
        assert!(!config.normalization.enabled);
        assert_eq!(config.normalization.target_db, -20);
        assert_eq!(config.providers.tvthemes.priority, 0);
        // Untouched fields keep their defaults.
        assert_eq!(config.providers.television_tunes.priority, 1);
        assert_eq!(config.ffmpeg_timeout_secs, 120);
    }

    #[test]
    fn providers_can_be_disabled_individually() {
        let (_dir, manifest) = temp_manifest();
        let file: FileConfig = toml::from_str(
            r#"
            [providers.television_tunes]
            enabled = false
            "#,
        )
        .unwrap();

        let config = AppConfig::resolve(&cli_with_manifest(manifest), Some(file)).unwrap();
        assert!(!config.providers.television_tunes.enabled);
        assert!(config.providers.tvthemes.enabled);
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let cli = cli_with_manifest(PathBuf::from("/nowhere/library.json"));
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn skip_normalize_flag_disables_normalization() {
        let (_dir, manifest) = temp_manifest();
        let cli = CliConfig {
            skip_normalize: true,
            ..cli_with_manifest(manifest)
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert!(!config.normalization.enabled);
    }
}
