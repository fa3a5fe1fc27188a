// botgate/src/verdict.rs
//
// Verdict-side domain types: risk bands, recommended actions, bot categories,
// and the aggregated evidence attached to the request after the pipeline runs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::detectors::DetectorKind;
use crate::signal::{Contribution, Signal};

// ── Risk band ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskBand {
    VeryLow,
    Low,
    Elevated,
    Medium,
    High,
    VeryHigh,
}

impl RiskBand {
    /// One band up, capped at VeryHigh.
    pub fn boosted(self) -> Self {
        match self {
            Self::VeryLow => Self::Low,
            Self::Low => Self::Elevated,
            Self::Elevated => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::VeryHigh => Self::VeryHigh,
        }
    }
}

impl std::fmt::Display for RiskBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VeryLow => write!(f, "very_low"),
            Self::Low => write!(f, "low"),
            Self::Elevated => write!(f, "elevated"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::VeryHigh => write!(f, "very_high"),
        }
    }
}

// ── Recommended action ────────────────────────────────────────────────────────

/// Ordered by severity — the budget-exceeded clamp relies on `Ord`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Allow,
    LogOnly,
    Challenge,
    Throttle,
    Block,
    Redirect,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::LogOnly => write!(f, "LOG_ONLY"),
            Self::Challenge => write!(f, "CHALLENGE"),
            Self::Throttle => write!(f, "THROTTLE"),
            Self::Block => write!(f, "BLOCK"),
            Self::Redirect => write!(f, "REDIRECT"),
        }
    }
}

// ── Bot category ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BotCategory {
    SearchEngine,
    SocialCrawler,
    Automation,
    ScriptingLibrary,
    SecurityScanner,
    AiCrawler,
    Monitor,
    Unknown,
}

impl std::fmt::Display for BotCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SearchEngine => write!(f, "search_engine"),
            Self::SocialCrawler => write!(f, "social_crawler"),
            Self::Automation => write!(f, "automation"),
            Self::ScriptingLibrary => write!(f, "scripting_library"),
            Self::SecurityScanner => write!(f, "security_scanner"),
            Self::AiCrawler => write!(f, "ai_crawler"),
            Self::Monitor => write!(f, "monitor"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ── Aggregated evidence ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AggregatedEvidence {
    pub is_bot: bool,
    pub bot_probability: f64,
    pub confidence: f64,
    pub risk_band: RiskBand,
    pub bot_type: Option<BotCategory>,
    pub bot_name: Option<String>,
    pub recommended_action: Action,
    pub action_reason: Option<String>,
    pub policy_name: Option<String>,
    pub contributions: Vec<Contribution>,
    pub signals: HashMap<String, Signal>,
    pub primary_signature: String,
    pub processing_ms: u64,
}

impl AggregatedEvidence {
    /// Catastrophic-path verdict: allow with zero confidence and a diagnostic
    /// note. The action layer may still decline based on other inputs.
    pub fn fail_open(signature: String, diagnostic: &str) -> Self {
        Self {
            is_bot: false,
            bot_probability: 0.0,
            confidence: 0.0,
            risk_band: RiskBand::VeryLow,
            bot_type: None,
            bot_name: None,
            recommended_action: Action::Allow,
            action_reason: Some(format!("fail_open:{diagnostic}")),
            policy_name: None,
            contributions: Vec::new(),
            signals: HashMap::new(),
            primary_signature: signature,
            processing_ms: 0,
        }
    }

    /// Standard-mode response headers.
    pub fn response_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-Bot-Detected".into(), self.is_bot.to_string()),
            ("X-Bot-Confidence".into(), format!("{:.2}", self.confidence)),
        ];
        if let Some(kind) = self.bot_type {
            headers.push(("X-Bot-Type".into(), kind.to_string()));
        }
        if let Some(ref name) = self.bot_name {
            headers.push(("X-Bot-Name".into(), name.clone()));
        }
        if let Some(ref policy) = self.policy_name {
            headers.push(("X-Bot-Policy".into(), policy.clone()));
        }
        headers.push(("X-Bot-Processing-Ms".into(), self.processing_ms.to_string()));
        headers
    }

    /// Demo-mode additions: serialized contributions + signature id, plus a
    /// terse diagnostic code when the pipeline degraded.
    pub fn demo_headers(&self) -> Vec<(String, String)> {
        let mut headers = self.response_headers();
        let contributions = serde_json::to_string(&self.contributions).unwrap_or_default();
        headers.push(("X-Bot-Contributions".into(), contributions));
        headers.push(("X-Bot-Signature".into(), self.primary_signature.clone()));
        if let Some(ref reason) = self.action_reason {
            if reason.starts_with("fail_open:") || reason.starts_with("budget_exceeded") {
                headers.push(("X-Bot-Diagnostic".into(), reason.clone()));
            }
        }
        headers
    }

    /// Contribution of a specific detector, if it completed.
    pub fn contribution(&self, detector: DetectorKind) -> Option<&Contribution> {
        self.contributions.iter().find(|c| c.detector == detector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boost_caps_at_very_high() {
        assert_eq!(RiskBand::Medium.boosted(), RiskBand::High);
        assert_eq!(RiskBand::VeryHigh.boosted(), RiskBand::VeryHigh);
    }

    #[test]
    fn action_order_supports_clamp() {
        assert!(Action::Block > Action::Challenge);
        assert!(Action::Redirect > Action::Challenge);
        assert_eq!(Action::Block.min(Action::Challenge), Action::Challenge);
        assert_eq!(Action::Allow.min(Action::Challenge), Action::Allow);
    }

    #[test]
    fn fail_open_is_allow_with_zero_confidence() {
        let ev = AggregatedEvidence::fail_open("abc".into(), "ctx_alloc");
        assert!(!ev.is_bot);
        assert_eq!(ev.confidence, 0.0);
        assert_eq!(ev.recommended_action, Action::Allow);
        assert!(ev.action_reason.as_deref().unwrap().contains("ctx_alloc"));
    }
}
