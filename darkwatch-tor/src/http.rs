//! Plain HTTP fetcher
//!
//! Fetches raw HTML over the selected route without rendering. No
//! screenshots; JavaScript-built pages come back as served.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    create_client, extract_title, require_http_url, FetchError, FetchMode, FetchedPage, Fetcher,
    Route, TorConfig,
};

/// Fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    config: TorConfig,
}

impl HttpFetcher {
    pub fn new(config: TorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, _mode: FetchMode) -> Result<FetchedPage, FetchError> {
        require_http_url(url)?;
        let route = Route::for_url(url);
        let client = create_client(&self.config, route)?;

        debug!("Fetching {} via {:?}", url, route);

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.config.timeout_for(route).as_secs(),
                }
            } else {
                FetchError::Request(e)
            }
        })?;

        if !response.status().is_success() {
            warn!("Fetch of {} returned status: {}", url, response.status());
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let html = response.text().await?;
        let title = extract_title(&html);

        Ok(FetchedPage {
            url: url.to_string(),
            title,
            html,
            screenshot: None,
        })
    }
}
