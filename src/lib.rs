//! Themetunes Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod acquisition;
pub mod config;
pub mod library;
pub mod matcher;
pub mod normalize;
pub mod providers;

// Re-export commonly used types for convenience
pub use acquisition::{AcquirerSettings, AcquisitionOutcome, AcquisitionReport, Acquirer};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use library::{ManifestSeriesSource, SeriesRecord, SeriesSource};
pub use providers::{ResolutionChain, TelevisionTunesProvider, ThemeProvider, TvThemesProvider};
