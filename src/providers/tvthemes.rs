//! Direct URL probe against the Plex tvthemes host.
//!
//! Theme files there are addressed purely by TVDB id, so resolution is a
//! single HEAD request: if the remote confirms the file exists, the URL is
//! the answer.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::library::SeriesRecord;

use super::{ThemeProvider, USER_AGENT};

const BASE_URL: &str = "http://tvthemes.plexapp.com";

pub struct TvThemesProvider {
    client: Client,
    base_url: String,
    priority: u32,
}

impl TvThemesProvider {
    pub fn new(priority: u32, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
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
}

#[async_trait]
impl ThemeProvider for TvThemesProvider {
    fn name(&self) -> &'static str {
        "tvthemes"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn resolve(&self, series: &SeriesRecord) -> Result<Option<String>> {
        let Some(tvdb_id) = series.tvdb_id.as_deref() else {
            return Ok(None);
        };

        let url = format!("{}/{}.mp3", self.base_url, tvdb_id);
        debug!("probing {} for {}", url, series.name);

        // Metadata-only existence check, no body transfer.
        let response = self.client.head(&url).send().await?;
        if response.status().is_success() {
            Ok(Some(url))
        } else {
            Ok(None)
        }
    }
}
