//! Read-only access to the series library.
//!
//! The library itself is an external collaborator; this module only defines
//! the record shape the acquisition pipeline needs and a JSON-manifest-backed
//! source for running against a library exported to disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[cfg(test)]
use mockall::automock;

/// Conventional theme-track file name inside a series' storage root.
pub const THEME_FILE_NAME: &str = "theme.mp3";

/// One series as seen by the acquisition pipeline.
#[derive(Debug, Clone)]
pub struct SeriesRecord {
    /// Display name.
    pub name: String,
    /// External catalog (TVDB) identifier, when known.
    pub tvdb_id: Option<String>,
    /// Storage root of the series.
    pub path: PathBuf,
    /// Whether a theme track is already present.
    pub has_theme: bool,
}

impl SeriesRecord {
    /// Final theme-track location for this series.
    pub fn theme_path(&self) -> PathBuf {
        self.path.join(THEME_FILE_NAME)
    }
}

/// Source of series records.
#[cfg_attr(test, automock)]
pub trait SeriesSource: Send + Sync {
    /// All non-virtual series with a known TVDB id.
    fn list_series(&self) -> Result<Vec<SeriesRecord>>;
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    path: String,
    tvdb_id: Option<String>,
    #[serde(default)]
    virtual_item: bool,
}

/// Series source backed by a JSON manifest file.
///
/// The manifest is an array of `{name, path, tvdb_id, virtual_item}` objects.
/// Theme presence is re-derived from the filesystem on every listing, so a
/// later run naturally retries series whose acquisition failed.
pub struct ManifestSeriesSource {
    manifest_path: PathBuf,
}

impl ManifestSeriesSource {
    pub fn new(manifest_path: &Path) -> Self {
        Self {
            manifest_path: manifest_path.to_path_buf(),
        }
    }
}

impl SeriesSource for ManifestSeriesSource {
    fn list_series(&self) -> Result<Vec<SeriesRecord>> {
        let content = std::fs::read_to_string(&self.manifest_path)
            .with_context(|| format!("failed to read manifest {:?}", self.manifest_path))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest {:?}", self.manifest_path))?;

        Ok(entries
            .into_iter()
            .filter(|entry| !entry.virtual_item && entry.tvdb_id.is_some())
            .map(|entry| {
                let path = PathBuf::from(entry.path);
                SeriesRecord {
                    has_theme: path.join(THEME_FILE_NAME).exists(),
                    name: entry.name,
                    tvdb_id: entry.tvdb_id,
                    path,
                }
            })
            .collect())
    }
}
