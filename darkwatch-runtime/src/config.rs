//! Monitor configuration
//!
//! Loaded from a TOML file; every field has a default so a partial or
//! absent file is valid. Secrets come from the environment, not this file.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use darkwatch_tor::{BrowserFetcher, Fetcher, HttpFetcher, TorConfig, DEFAULT_BROWSER};

use crate::{ScanConfig, SchedulerConfig};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "darkwatch.toml";

/// Which fetcher implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// Headless Chromium: rendered DOM and screenshots
    #[default]
    Browser,
    /// Plain HTTP: raw HTML, no screenshots
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// SQLite database path
    pub database: PathBuf,
    /// Keyword rule file
    pub rules: PathBuf,
    /// Targets upserted at daemon start
    pub targets: Vec<String>,
    pub scan_interval_secs: u64,
    pub initial_delay_secs: u64,
    pub politeness_delay_secs: u64,
    /// Discovered links fetched per deep scan
    pub deep_scan_links: usize,
    pub fetcher: FetcherKind,
    pub browser_binary: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("darkwatch.db"),
            rules: PathBuf::from("mitre_rules.json"),
            targets: Vec::new(),
            scan_interval_secs: 6 * 60 * 60,
            initial_delay_secs: 120,
            politeness_delay_secs: 10,
            deep_scan_links: 5,
            fetcher: FetcherKind::Browser,
            browser_binary: DEFAULT_BROWSER.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;

        info!(
            "Loaded config from {} ({} targets)",
            path.display(),
            config.targets.len()
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            politeness_delay: Duration::from_secs(self.politeness_delay_secs),
            deep_scan_links: self.deep_scan_links,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            interval: Duration::from_secs(self.scan_interval_secs.max(1)),
        }
    }

    /// Construct the configured fetcher
    pub fn build_fetcher(&self, tor: TorConfig) -> Arc<dyn Fetcher> {
        match self.fetcher {
            FetcherKind::Browser => Arc::new(BrowserFetcher::new(&self.browser_binary, tor)),
            FetcherKind::Http => Arc::new(HttpFetcher::new(tor)),
        }
    }
}
