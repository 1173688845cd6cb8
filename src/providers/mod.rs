//! Theme track source providers and the priority resolution chain.

mod television_tunes;
mod tvthemes;

pub use television_tunes::TelevisionTunesProvider;
pub use tvthemes::TvThemesProvider;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::library::SeriesRecord;

#[cfg(test)]
use mockall::automock;

/// Identifying user agent sent on every remote request.
pub const USER_AGENT: &str = concat!("themetunes/", env!("CARGO_PKG_VERSION"));

/// A strategy that attempts to locate a remote URL for a series' theme track.
///
/// `Ok(None)` means the provider looked and found nothing; an `Err` means it
/// could not look (network, parse). The chain treats both as "try the next
/// provider".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ThemeProvider: Send + Sync {
    /// Display name for diagnostics.
    fn name(&self) -> &'static str;

    /// Lower priority values are tried earlier.
    fn priority(&self) -> u32;

    /// Resolve a direct download URL for the series' theme track.
    async fn resolve(&self, series: &SeriesRecord) -> Result<Option<String>>;
}

/// Providers in ascending priority order; the first URL obtained wins.
pub struct ResolutionChain {
    providers: Vec<Arc<dyn ThemeProvider>>,
}

impl ResolutionChain {
    /// Build a chain, sorting by priority once.
    pub fn new(mut providers: Vec<Arc<dyn ThemeProvider>>) -> Self {
        providers.sort_by_key(|provider| provider.priority());
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Try each provider in order and return the first URL found.
    ///
    /// Individual provider failures are logged and swallowed; they never
    /// prevent a lower-priority provider from being tried. `None` means no
    /// provider produced a URL.
    pub async fn resolve(&self, series: &SeriesRecord) -> Option<String> {
        for provider in &self.providers {
            match provider.resolve(series).await {
                Ok(Some(url)) => {
                    info!(
                        "{} theme song found with {}: {}",
                        series.name,
                        provider.name(),
                        url
                    );
                    return Some(url);
                }
                Ok(None) => {
                    debug!("{} theme song not found with {}", series.name, provider.name());
                }
                Err(err) => {
                    debug!(
                        "{} theme song lookup failed with {}: {:#}",
                        series.name,
                        provider.name(),
                        err
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::path::PathBuf;

    fn series() -> SeriesRecord {
        SeriesRecord {
            name: "Test Show".to_string(),
            tvdb_id: Some("1234".to_string()),
            path: PathBuf::from("/media/test-show"),
            has_theme: false,
        }
    }

    fn provider(
        name: &'static str,
        priority: u32,
        result: fn() -> Result<Option<String>>,
    ) -> Arc<dyn ThemeProvider> {
        let mut mock = MockThemeProvider::new();
        mock.expect_name().return_const(name);
        mock.expect_priority().return_const(priority);
        mock.expect_resolve().returning(move |_| result());
        Arc::new(mock)
    }

    #[tokio::test]
    async fn first_hit_in_priority_order_wins() {
        let chain = ResolutionChain::new(vec![
            provider("low", 2, || Ok(Some("http://low/theme.mp3".to_string()))),
            provider("high", 1, || Ok(Some("http://high/theme.mp3".to_string()))),
        ]);

        let url = chain.resolve(&series()).await;
        assert_eq!(url.as_deref(), Some("http://high/theme.mp3"));
    }

    #[tokio::test]
    async fn failing_provider_does_not_break_the_chain() {
        let chain = ResolutionChain::new(vec![
            provider("broken", 1, || Err(anyhow!("connection refused"))),
            provider("working", 2, || Ok(Some("http://ok/theme.mp3".to_string()))),
        ]);

        let url = chain.resolve(&series()).await;
        assert_eq!(url.as_deref(), Some("http://ok/theme.mp3"));
    }

    #[tokio::test]
    async fn empty_handed_provider_falls_through() {
        let chain = ResolutionChain::new(vec![
            provider("empty", 1, || Ok(None)),
            provider("working", 2, || Ok(Some("http://ok/theme.mp3".to_string()))),
        ]);

        let url = chain.resolve(&series()).await;
        assert_eq!(url.as_deref(), Some("http://ok/theme.mp3"));
    }

    #[tokio::test]
    async fn all_failing_chain_reports_not_found() {
        let chain = ResolutionChain::new(vec![
            provider("broken", 1, || Err(anyhow!("boom"))),
            provider("empty", 2, || Ok(None)),
        ]);

        assert!(chain.resolve(&series()).await.is_none());
    }

    #[tokio::test]
    async fn empty_chain_reports_not_found() {
        let chain = ResolutionChain::new(vec![]);
        assert!(chain.is_empty());
        assert!(chain.resolve(&series()).await.is_none());
    }
}
