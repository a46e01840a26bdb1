//! VirusTotal v3 reputation client
//!
//! IPs are looked up by address, URLs by their unpadded URL-safe base64 id.
//! Without an API key every lookup short-circuits to a neutral verdict.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::traits::{LookupKind, ReputationError, ReputationReport, ReputationSource};

/// Environment variable holding the API key
pub const VIRUSTOTAL_API_KEY_ENV: &str = "VIRUSTOTAL_API_KEY";

/// Public API root
pub const VIRUSTOTAL_API_BASE: &str = "https://www.virustotal.com/api/v3";

/// Configuration for the reputation client
#[derive(Debug, Clone)]
pub struct ReputationConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var(VIRUSTOTAL_API_KEY_ENV).ok(),
            base_url: VIRUSTOTAL_API_BASE.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ReputationConfig {
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct VtResponse {
    #[serde(default)]
    data: VtData,
}

#[derive(Debug, Default, Deserialize)]
struct VtData {
    #[serde(default)]
    attributes: VtAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct VtAttributes {
    #[serde(default)]
    last_analysis_stats: VtStats,
    #[serde(default)]
    as_owner: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VtStats {
    #[serde(default)]
    malicious: u32,
}

/// Reputation source backed by the VirusTotal v3 API
pub struct VirusTotalClient {
    config: ReputationConfig,
    client: Client,
}

impl VirusTotalClient {
    pub fn new(config: ReputationConfig) -> Result<Self, ReputationError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ReputationError::ClientBuild(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, kind: LookupKind, value: &str) -> String {
        match kind {
            LookupKind::Ip => format!("{}/ip_addresses/{}", self.config.base_url, value),
            LookupKind::Url => format!(
                "{}/urls/{}",
                self.config.base_url,
                URL_SAFE_NO_PAD.encode(value.as_bytes())
            ),
        }
    }
}

#[async_trait]
impl ReputationSource for VirusTotalClient {
    async fn check(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<ReputationReport, ReputationError> {
        let api_key = match self.config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return Ok(ReputationReport::new("No API Key", 0)),
        };

        let endpoint = self.endpoint(kind, value);
        debug!("Reputation lookup {:?} {}", kind, value);

        let response = self
            .client
            .get(&endpoint)
            .header("x-apikey", api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(ReputationReport::new("Not Found / Clean", 0)),
            StatusCode::OK => {}
            other => return Err(ReputationError::Status(other.as_u16())),
        }

        let body: VtResponse = response.json().await?;
        let attrs = body.data.attributes;
        let malicious = attrs.last_analysis_stats.malicious;
        let info = attrs
            .as_owner
            .filter(|s| !s.is_empty())
            .or(attrs.title)
            .unwrap_or_default();

        Ok(ReputationReport::new(
            format!("{} - Malicious: {}", info, malicious),
            malicious,
        ))
    }
}
