//! Content analyzer
//!
//! Scores fetched page content against the keyword rules and extracts
//! typed entities:
//! - Email addresses
//! - Bitcoin (legacy, P2SH, bech32), Monero and Ethereum wallets
//! - Web analytics tracking identifiers (UA-, G-, GTM-)
//! - IPv4 addresses
//! - PGP public key blocks
//!
//! Analysis is pure: the same input always yields the same result.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::model::{clamp_score, Category, Entity, EntityType};
use crate::rules::RuleStore;
use crate::MAX_FINDINGS_LEN;

/// Result of scoring one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub score: u8,
    pub category: Category,
    pub findings: String,
    pub entities: Vec<Entity>,
}

/// Keywords below this weight are scored but not surfaced in findings
const FINDING_KEYWORD_MIN_WEIGHT: u32 = 5;

/// Distinct values per entity type listed in findings
const FINDINGS_PER_TYPE: usize = 3;

const FINDINGS_SEPARATOR: &str = " | ";

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap()
});

static BITCOIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:bc1|[13])[a-km-zA-HJ-NP-Z1-9]{25,34}\b").unwrap()
});

static MONERO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[48][0-9AB][1-9A-HJ-NP-Za-km-z]{93}\b").unwrap()
});

static ETHEREUM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b0x[a-fA-F0-9]{40}\b").unwrap()
});

static TRACKING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:UA-\d+-\d+|G-[A-Z0-9]+|GTM-[A-Z0-9]+)\b").unwrap()
});

static IPV4_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b").unwrap()
});

const PGP_MARKER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const PGP_WEIGHT: u32 = 2;
const PGP_VALUE: &str = "PGP Block Present";

/// A fixed pattern matcher and the weight it adds when it matches at all
struct Matcher {
    entity_type: EntityType,
    regex: &'static LazyLock<Regex>,
    weight: u32,
}

static MATCHERS: &[Matcher] = &[
    Matcher { entity_type: EntityType::Email, regex: &EMAIL_REGEX, weight: 3 },
    Matcher { entity_type: EntityType::BtcWallet, regex: &BITCOIN_REGEX, weight: 5 },
    Matcher { entity_type: EntityType::XmrWallet, regex: &MONERO_REGEX, weight: 6 },
    Matcher { entity_type: EntityType::EthWallet, regex: &ETHEREUM_REGEX, weight: 4 },
    Matcher { entity_type: EntityType::TrackingId, regex: &TRACKING_REGEX, weight: 8 },
    Matcher { entity_type: EntityType::IpAddress, regex: &IPV4_REGEX, weight: 1 },
];

fn is_ignored_ip(ip: &str) -> bool {
    ip.starts_with("0.") || ip == "127.0.0.1"
}

/// Score `text` and `title` and extract entities from `text`
pub fn analyze(rules: &RuleStore, text: &str, title: &str) -> Analysis {
    let text_lower = format!("{} {}", text, title).to_lowercase();
    let mut score: u32 = 1;
    let mut findings: Vec<String> = Vec::new();
    let mut entities: Vec<Entity> = Vec::new();
    let mut wallet_seen = false;

    for rule in rules.matching(&text_lower) {
        score = score.saturating_add(rule.score);
        if rule.score >= FINDING_KEYWORD_MIN_WEIGHT {
            findings.push(format!("Keyword: {}", rule.keyword));
        }
    }

    for matcher in MATCHERS {
        let mut seen: HashSet<&str> = HashSet::new();

        for m in matcher.regex.find_iter(text) {
            let value = m.as_str();
            if matcher.entity_type == EntityType::IpAddress && is_ignored_ip(value) {
                continue;
            }
            if seen.insert(value) {
                entities.push(Entity::new(matcher.entity_type, value));
                if seen.len() <= FINDINGS_PER_TYPE {
                    findings.push(format!("{}: {}", matcher.entity_type, value));
                }
            }
        }

        if !seen.is_empty() {
            score = score.saturating_add(matcher.weight);
            if matcher.entity_type.is_wallet() {
                wallet_seen = true;
            }
        }
    }

    if text.contains(PGP_MARKER) {
        score = score.saturating_add(PGP_WEIGHT);
        findings.push("PGP Key Detected".to_string());
        entities.push(Entity::new(EntityType::PgpKey, PGP_VALUE));
    }

    let score = clamp_score(score);
    let category = if score >= 8 {
        Category::CriticalThreat
    } else if score >= 5 {
        Category::Suspicious
    } else if wallet_seen {
        Category::Financial
    } else {
        Category::GeneralInfo
    };

    Analysis {
        score,
        category,
        findings: truncate_findings(&findings.join(FINDINGS_SEPARATOR)),
        entities,
    }
}

/// Bound a findings summary to `MAX_FINDINGS_LEN` characters
pub fn truncate_findings(summary: &str) -> String {
    if summary.chars().count() <= MAX_FINDINGS_LEN {
        return summary.to_string();
    }
    let head: String = summary.chars().take(MAX_FINDINGS_LEN - 3).collect();
    format!("{}...", head)
}
