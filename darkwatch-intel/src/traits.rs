//! Capability seams for enrichment and delivery

use async_trait::async_trait;
use thiserror::Error;

/// What a reputation lookup is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Ip,
    Url,
}

/// Verdict from a reputation source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationReport {
    /// Human-readable description, e.g. `"AS1234 Hosting - Malicious: 3"`
    pub summary: String,
    /// Number of engines flagging the value
    pub malicious: u32,
}

impl ReputationReport {
    pub fn new(summary: impl Into<String>, malicious: u32) -> Self {
        Self {
            summary: summary.into(),
            malicious,
        }
    }

    /// Neutral verdict when no lookup was possible
    pub fn unavailable() -> Self {
        Self::new("Lookup Unavailable", 0)
    }

    pub fn is_malicious(&self) -> bool {
        self.malicious > 0
    }
}

/// Errors from reputation lookups
#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("Failed to build client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Reputation API returned status {0}")]
    Status(u16),
}

/// Errors from alert delivery
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("No webhook URL configured")]
    NotConfigured,

    #[error("Webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Webhook returned status {0}")]
    Status(u16),
}

/// Best-effort maliciousness lookup for an IP or URL
#[async_trait]
pub trait ReputationSource: Send + Sync {
    async fn check(&self, kind: LookupKind, value: &str)
        -> Result<ReputationReport, ReputationError>;
}

/// Delivers a composed alert text
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), AlertError>;
}
