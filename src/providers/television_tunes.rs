//! Scrape-based provider for televisiontunes-style index pages.
//!
//! Resolution is a two-step scrape: fetch the alphabetical index section for
//! the series, match an entry with the text matcher, then fetch the matched
//! content page and pull the direct audio-file reference out of it.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::library::SeriesRecord;
use crate::matcher;

use super::{ThemeProvider, USER_AGENT};

const BASE_URL: &str = "http://televisiontunes.com";

pub struct TelevisionTunesProvider {
    client: Client,
    base_url: String,
    priority: u32,
}

impl TelevisionTunesProvider {
    pub fn new(priority: u32, timeout_secs: u64) -> Result<Self> {
        // Certificate validation is intentionally bypassed: the upstream host
        // has a history of misconfigured TLS and the original integration
        // shipped with a trust-all handler for it.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            priority,
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn fetch_html(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            bail!("GET {} failed with status {}", url, response.status());
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ThemeProvider for TelevisionTunesProvider {
    fn name(&self) -> &'static str {
        "televisiontunes"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn resolve(&self, series: &SeriesRecord) -> Result<Option<String>> {
        let Some(section) = matcher::section_key(&series.name) else {
            return Ok(None);
        };

        let index_url = format!("{}/{}-theme-songs.html", self.base_url, section);
        debug!("searching {} for {}", index_url, series.name);
        let index_html = self.fetch_html(&index_url).await?;

        let Some(page) = matcher::find_series_page(&index_html, &series.name) else {
            debug!("no index entry for {}", series.name);
            return Ok(None);
        };
        debug!(
            "{} matched page {:?} via variant {:?}",
            series.name, page.page_path, page.variant
        );

        let page_url = format!("{}/{}", self.base_url, page.page_path);
        let page_html = self.fetch_html(&page_url).await?;

        let Some(file) = matcher::find_theme_file(&page_html) else {
            debug!("matched page for {} has no audio reference", series.name);
            return Ok(None);
        };

        Ok(Some(format!(
            "{}/uploads/audio/{}.mp3",
            self.base_url, file
        )))
    }
}
