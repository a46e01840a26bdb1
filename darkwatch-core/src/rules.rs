//! Keyword rule store
//!
//! Threat keywords carry a weight and an optional MITRE ATT&CK mapping. The
//! store layers a rule file over a built-in baseline lexicon and is immutable
//! once constructed; callers share it by reference.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// A keyword rule as stored in the rule file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatRule {
    pub keyword: String,
    #[serde(deserialize_with = "weight_from_int")]
    pub score: u32,
    #[serde(default)]
    pub mitre_id: String,
    #[serde(default)]
    pub tactic: String,
}

impl ThreatRule {
    pub fn new(keyword: &str, score: u32, mitre_id: &str, tactic: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            score,
            mitre_id: mitre_id.to_string(),
            tactic: tactic.to_string(),
        }
    }
}

/// Weights are plain integers in the file; negative weights count as zero
fn weight_from_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, i64::from(u32::MAX)) as u32)
}

/// Errors from reading a rule file
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to read rule file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed rule file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid keyword pattern {keyword:?}: {source}")]
    Pattern {
        keyword: String,
        source: regex::Error,
    },
}

/// Built-in lexicon, scored before any rule file is applied
const BASELINE_LEXICON: &[(&str, u32)] = &[
    // Data breaches & hacking
    ("hacked", 8),
    ("breached", 8),
    ("leaked", 9),
    ("data dump", 9),
    ("stolen data", 9),
    ("sql injection", 10),
    ("vulnerability", 6),
    ("zero day", 9),
    ("exploit kit", 9),
    ("credential stuffing", 9),
    ("phishing", 7),
    // Drugs
    ("cocaine", 10),
    ("heroin", 10),
    ("methamphetamine", 10),
    ("fentanyl", 10),
    ("ketamine", 9),
    ("mdma", 8),
    ("lsd", 8),
    ("darknet drug", 10),
    // Markets
    ("dark market", 10),
    ("black market", 10),
    ("darknet market", 10),
    ("for sale", 3),
    ("marketplace", 2),
    // Identity & financial fraud
    ("passport", 10),
    ("id card", 9),
    ("ssn", 10),
    ("social security", 10),
    ("cc number", 10),
    ("credit card", 8),
    ("cvv", 9),
    ("fullz", 10),
    ("bank account", 9),
    ("routing number", 9),
    ("identity theft", 10),
    // Weapons & violence
    ("weapon", 9),
    ("gun", 7),
    ("rifle", 8),
    ("pistol", 8),
    ("explosives", 10),
    ("bomb", 10),
    ("hitman", 10),
    ("assassination", 10),
    ("cartel", 10),
    // Malware & attacks
    ("ddos", 8),
    ("botnet", 9),
    ("malware", 9),
    ("ransomware", 10),
    ("spyware", 9),
    ("trojan", 8),
    ("worm", 7),
    ("virus", 6),
    ("keylogger", 9),
    // Illegal content
    ("illegal content", 10),
    ("forbidden", 7),
    ("restricted", 5),
    // Benign, low weight
    ("conference", 1),
    ("security", 1),
    ("forum", 2),
    ("database", 3),
];

/// Rule table used when the rule file is missing or unreadable
fn fallback_rules() -> Vec<ThreatRule> {
    vec![ThreatRule::new("hacked", 6, "GENERIC", "Indicator")]
}

#[derive(Debug)]
struct CompiledRule {
    rule: ThreatRule,
    pattern: Regex,
}

/// Immutable keyword → weight table with word-boundary matchers
#[derive(Debug)]
pub struct RuleStore {
    rules: Vec<CompiledRule>,
    from_file: bool,
}

impl RuleStore {
    /// Load rules from `path`, falling back to the built-in table on any error.
    ///
    /// Never fails: a missing or malformed file is logged and startup continues.
    pub fn load(path: &Path) -> Self {
        match Self::from_file(path) {
            Ok(store) => {
                info!("Loaded {} threat rules from {}", store.len(), path.display());
                store
            }
            Err(e) => {
                warn!(
                    "Rule file {} unusable ({}), using fallback rules",
                    path.display(),
                    e
                );
                Self::fallback()
            }
        }
    }

    /// Load rules from a JSON array of `{keyword, score, mitre_id, tactic}`
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let raw = std::fs::read_to_string(path)?;
        let rules: Vec<ThreatRule> = serde_json::from_str(&raw)?;
        let mut store = Self::layered(rules)?;
        store.from_file = true;
        Ok(store)
    }

    /// The store used when no rule file could be read
    pub fn fallback() -> Self {
        // The fallback keywords are plain words, so compilation cannot fail.
        Self::layered(fallback_rules()).unwrap_or_else(|_| Self {
            rules: Vec::new(),
            from_file: false,
        })
    }

    /// Layer `rules` over the baseline lexicon; a rule replaces a baseline
    /// entry with the same keyword, new keywords are appended in order.
    pub fn layered(rules: Vec<ThreatRule>) -> Result<Self, RuleError> {
        let mut table: Vec<ThreatRule> = BASELINE_LEXICON
            .iter()
            .map(|(keyword, score)| ThreatRule::new(keyword, *score, "", ""))
            .collect();

        for rule in rules {
            let keyword = rule.keyword.trim().to_lowercase();
            if keyword.is_empty() {
                continue;
            }
            let rule = ThreatRule { keyword, ..rule };
            match table.iter_mut().find(|r| r.keyword == rule.keyword) {
                Some(existing) => *existing = rule,
                None => table.push(rule),
            }
        }

        let rules = table
            .into_iter()
            .map(|rule| {
                let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&rule.keyword)))
                    .map_err(|source| RuleError::Pattern {
                        keyword: rule.keyword.clone(),
                        source,
                    })?;
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        Ok(Self {
            rules,
            from_file: false,
        })
    }

    /// Whether the rules came from a rule file rather than the fallback
    pub fn is_from_file(&self) -> bool {
        self.from_file
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &ThreatRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn weight_of(&self, keyword: &str) -> Option<u32> {
        let keyword = keyword.to_lowercase();
        self.rules()
            .find(|r| r.keyword == keyword)
            .map(|r| r.score)
    }

    /// Rules whose keyword occurs as a whole word in `text_lower`, in table order
    pub fn matching<'a>(&'a self, text_lower: &'a str) -> impl Iterator<Item = &'a ThreatRule> {
        self.rules
            .iter()
            .filter(move |c| c.pattern.is_match(text_lower))
            .map(|c| &c.rule)
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_uses_fallback() {
        let store = RuleStore::load(Path::new("/nonexistent/mitre_rules.json"));
        assert!(!store.is_from_file());
        assert_eq!(store.weight_of("hacked"), Some(6));
        assert_eq!(store.weight_of("ssn"), Some(10));
    }

    #[test]
    fn test_malformed_file_uses_fallback() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let store = RuleStore::load(file.path());
        assert!(!store.is_from_file());
        assert_eq!(store.weight_of("hacked"), Some(6));
    }

    #[test]
    fn test_rule_file_overrides_and_appends() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"keyword": "Ransomware", "score": 4, "mitre_id": "T1486", "tactic": "Impact"}},
                {{"keyword": "initial access broker", "score": 7, "mitre_id": "T1078", "tactic": "Initial Access"}}
            ]"#
        )
        .unwrap();

        let store = RuleStore::load(file.path());
        assert!(store.is_from_file());
        assert_eq!(store.weight_of("ransomware"), Some(4));
        assert_eq!(store.weight_of("initial access broker"), Some(7));
        // Baseline "hacked" is untouched when the file does not mention it
        assert_eq!(store.weight_of("hacked"), Some(8));
    }

    #[test]
    fn test_negative_weight_clamps_to_zero() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"keyword": "conference", "score": -3}},
                {{"keyword": "carding", "score": 7}}
            ]"#
        )
        .unwrap();

        let store = RuleStore::load(file.path());
        assert!(store.is_from_file());
        assert_eq!(store.weight_of("conference"), Some(0));
        assert_eq!(store.weight_of("carding"), Some(7));
    }

    #[test]
    fn test_word_boundary_matching() {
        let store = RuleStore::fallback();
        let hits: Vec<_> = store.matching("great success here").map(|r| r.keyword.clone()).collect();
        assert!(hits.is_empty());

        let hits: Vec<_> = store.matching("selling cvv and fullz").map(|r| r.keyword.clone()).collect();
        assert_eq!(hits, vec!["cvv".to_string(), "fullz".to_string()]);
    }

    #[test]
    fn test_multi_word_keyword() {
        let store = RuleStore::fallback();
        let hits: Vec<_> = store.matching("fresh data dump available").map(|r| r.keyword.as_str()).collect();
        assert!(hits.contains(&"data dump"));
    }
}
