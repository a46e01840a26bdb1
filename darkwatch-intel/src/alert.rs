//! Alert Dispatcher
//!
//! Decides whether a scan result warrants an alert, enriches new IP
//! entities through the reputation source, composes the report text and
//! hands it to the notifier. Delivery failures are returned to the caller
//! as values; they never abort a scan.

use chrono::{Local, NaiveTime};
use std::sync::Arc;
use tracing::{info, warn};

use darkwatch_core::{
    ContentSnapshot, EntityChange, EntityType, RiskLevel, ALERT_SCORE_THRESHOLD, MAX_SCORE,
};

use crate::traits::{AlertError, LookupKind, Notifier, ReputationReport, ReputationSource};

const SEPARATOR: &str = "--------------------------------------";

/// Alert condition: new entities, a high score, or a malicious URL verdict
pub fn should_alert(score: u8, new_entities: usize, url_malicious: u32) -> bool {
    new_entities > 0 || score >= ALERT_SCORE_THRESHOLD || url_malicious > 0
}

fn headline_icon(score: u8) -> &'static str {
    match RiskLevel::from_score(score) {
        RiskLevel::Critical => "🚨 CRITICAL",
        RiskLevel::High => "🔥 HIGH",
        _ => "⚠️",
    }
}

/// Full alert text as delivered to the webhook
pub fn compose_message(
    target: &str,
    score: u8,
    new_entities: usize,
    details: &str,
    at: NaiveTime,
) -> String {
    format!(
        "{} **DarkWatch Alert!**\n\
         **Target:** {}\n\
         **Risk Score:** {}/10\n\
         **New Entities:** {}\n\
         {}\n\
         **🔍 INTELLIGENCE REPORT:**\n{}\n\
         {}\n\
         **Time:** {}",
        headline_icon(score),
        target,
        score,
        new_entities,
        SEPARATOR,
        details,
        SEPARATOR,
        at.format("%H:%M:%S"),
    )
}

/// Threshold logic plus enrichment and delivery
#[derive(Clone)]
pub struct AlertDispatcher {
    reputation: Arc<dyn ReputationSource>,
    notifier: Arc<dyn Notifier>,
}

impl AlertDispatcher {
    pub fn new(reputation: Arc<dyn ReputationSource>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            reputation,
            notifier,
        }
    }

    /// Reputation verdict for a target URL. Lookup failures are logged and
    /// yield a neutral verdict.
    pub async fn check_target(&self, url: &str) -> ReputationReport {
        match self.reputation.check(LookupKind::Url, url).await {
            Ok(report) => report,
            Err(e) => {
                warn!(url = %url, "URL reputation lookup failed: {}", e);
                ReputationReport::unavailable()
            }
        }
    }

    /// Immediate alert for a target the reputation source flags as malicious
    pub async fn alert_malicious_domain(
        &self,
        url: &str,
        verdict: &ReputationReport,
    ) -> Result<(), AlertError> {
        let details = format!("🔴 DOMAIN BLOCKED BY VIRUSTOTAL!\nReport: {}", verdict.summary);
        let text = compose_message(
            &format!("{} (MALICIOUS DOMAIN DETECTED)", url),
            MAX_SCORE,
            0,
            &details,
            Local::now().time(),
        );
        self.notifier.send(&text).await
    }

    /// Per-IP verdict lines for new IP entities. Failed lookups are omitted.
    async fn enrich_ips(&self, changes: &[EntityChange]) -> Vec<String> {
        let mut lines = Vec::new();

        for change in changes
            .iter()
            .filter(|c| c.entity_type == EntityType::IpAddress)
        {
            match self.reputation.check(LookupKind::Ip, &change.value).await {
                Ok(report) if report.is_malicious() => {
                    warn!("Malicious IP found: {}", change.value);
                    lines.push(format!(
                        "🚫 **Malicious IP:** {} ({})",
                        change.value, report.summary
                    ));
                }
                Ok(_) => lines.push(format!("✅ Clean IP: {}", change.value)),
                Err(e) => warn!("IP reputation lookup for {} failed: {}", change.value, e),
            }
        }

        lines
    }

    /// Apply the URL verdict to `snapshot` and alert if warranted.
    ///
    /// A malicious verdict forces the snapshot to maximum severity before
    /// anything else reads it, so the override reaches persistence even when
    /// delivery fails. Returns whether an alert was sent.
    pub async fn maybe_alert(
        &self,
        target_url: &str,
        snapshot: &mut ContentSnapshot,
        changes: &[EntityChange],
        url_verdict: &ReputationReport,
    ) -> Result<bool, AlertError> {
        if url_verdict.is_malicious() {
            snapshot.mark_known_malicious();
        }

        if !should_alert(snapshot.score, changes.len(), url_verdict.malicious) {
            return Ok(false);
        }

        info!(
            url = %target_url,
            score = snapshot.score,
            new_entities = changes.len(),
            "Alert triggered"
        );

        let mut details = format!(
            "📋 **Findings:** {}\n🌐 **Domain Status:** {}\n",
            snapshot.findings, url_verdict.summary
        );
        for line in self.enrich_ips(changes).await {
            details.push_str(&line);
            details.push('\n');
        }

        let text = compose_message(
            target_url,
            snapshot.score,
            changes.len(),
            &details,
            Local::now().time(),
        );
        self.notifier.send(&text).await?;
        Ok(true)
    }
}
