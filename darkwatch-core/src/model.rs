//! Domain model shared by every DarkWatch layer
//!
//! Targets are the monitored URLs, snapshots are the append-only scan
//! results, and entities are the typed indicators extracted from a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::{MAX_SCORE, MIN_SCORE};

/// Scan status of a target.
///
/// `Online`, `Failed`, `DbError` and `OnlineDeepScanned` end a cycle; the
/// next cycle moves the target back to `Scanning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetStatus {
    Pending,
    Scanning,
    Online,
    Failed,
    DbError,
    DeepScanning,
    OnlineDeepScanned,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Pending => "Pending",
            TargetStatus::Scanning => "Scanning...",
            TargetStatus::Online => "Online",
            TargetStatus::Failed => "Failed",
            TargetStatus::DbError => "DB Error",
            TargetStatus::DeepScanning => "Deep Scanning...",
            TargetStatus::OnlineDeepScanned => "Online (Deep Scanned)",
        }
    }

    /// Whether this status closes the current scan cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TargetStatus::Online
                | TargetStatus::Failed
                | TargetStatus::DbError
                | TargetStatus::OnlineDeepScanned
        )
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a persisted enum value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for TargetStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            TargetStatus::Pending,
            TargetStatus::Scanning,
            TargetStatus::Online,
            TargetStatus::Failed,
            TargetStatus::DbError,
            TargetStatus::DeepScanning,
            TargetStatus::OnlineDeepScanned,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| UnknownVariant {
            kind: "target status",
            value: s.to_string(),
        })
    }
}

/// How a target entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Manual,
    Config,
}

impl TargetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetSource::Manual => "manual",
            TargetSource::Config => "config",
        }
    }
}

impl FromStr for TargetSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TargetSource::Manual),
            "config" => Ok(TargetSource::Config),
            other => Err(UnknownVariant {
                kind: "target source",
                value: other.to_string(),
            }),
        }
    }
}

/// A monitored URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub url: String,
    pub source: TargetSource,
    pub status: TargetStatus,
    pub created_at: DateTime<Utc>,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

/// Kinds of indicators the analyzer extracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Email,
    BtcWallet,
    XmrWallet,
    EthWallet,
    TrackingId,
    PgpKey,
    IpAddress,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Email => "EMAIL",
            EntityType::BtcWallet => "BTC_WALLET",
            EntityType::XmrWallet => "XMR_WALLET",
            EntityType::EthWallet => "ETH_WALLET",
            EntityType::TrackingId => "TRACKING_ID",
            EntityType::PgpKey => "PGP_KEY",
            EntityType::IpAddress => "IP_ADDRESS",
        }
    }

    pub fn is_wallet(&self) -> bool {
        matches!(
            self,
            EntityType::BtcWallet | EntityType::XmrWallet | EntityType::EthWallet
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL" => Ok(EntityType::Email),
            "BTC_WALLET" => Ok(EntityType::BtcWallet),
            "XMR_WALLET" => Ok(EntityType::XmrWallet),
            "ETH_WALLET" => Ok(EntityType::EthWallet),
            "TRACKING_ID" => Ok(EntityType::TrackingId),
            "PGP_KEY" => Ok(EntityType::PgpKey),
            "IP_ADDRESS" => Ok(EntityType::IpAddress),
            other => Err(UnknownVariant {
                kind: "entity type",
                value: other.to_string(),
            }),
        }
    }
}

/// A typed indicator found in a snapshot, unique per snapshot by (type, value)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub value: String,
}

impl Entity {
    pub fn new(entity_type: EntityType, value: impl Into<String>) -> Self {
        Self {
            entity_type,
            value: value.into(),
        }
    }
}

/// An entity present now that was absent from the previous snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChange {
    pub entity_type: EntityType,
    pub value: String,
    pub is_new: bool,
    pub detected_at: DateTime<Utc>,
}

/// Snapshot categories produced by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    CriticalThreat,
    Suspicious,
    Financial,
    GeneralInfo,
    KnownMalicious,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CriticalThreat => "Critical Threat",
            Category::Suspicious => "Suspicious",
            Category::Financial => "Financial / Market",
            Category::GeneralInfo => "General Info",
            Category::KnownMalicious => "Known Malicious Site",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse risk bucket derived from a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= 8 => RiskLevel::Critical,
            s if s >= 5 => RiskLevel::High,
            s if s >= 3 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Clamp a raw score into the valid 1..=10 range
pub fn clamp_score(raw: u32) -> u8 {
    raw.clamp(MIN_SCORE as u32, MAX_SCORE as u32) as u8
}

/// One persisted scan result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    /// Row id, `None` until persisted
    pub id: Option<i64>,
    pub source_name: String,
    pub source_url: String,
    pub title: String,
    /// Whitespace-normalized rendered HTML
    pub content: String,
    pub content_hash: String,
    pub captured_at: DateTime<Utc>,
    pub score: u8,
    pub category: String,
    pub findings: String,
    /// Base64-encoded screenshot
    pub screenshot: Option<String>,
    pub entities: Vec<Entity>,
}

impl ContentSnapshot {
    /// Force the snapshot to maximum severity after a malicious reputation verdict
    pub fn mark_known_malicious(&mut self) {
        self.score = MAX_SCORE;
        self.category = Category::KnownMalicious.as_str().to_string();
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.score)
    }
}

/// Hex SHA-256 of a snapshot body
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A discovered hyperlink between two monitored pages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRelationship {
    pub source_url: String,
    pub target_url: String,
}
