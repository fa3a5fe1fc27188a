// botgate/src/engine/policy.rs
//
// Named, declarative action policies: {risk band, bot type} → action.
// Policies are evaluated in registry order; within a policy the most
// specific matching rule (highest band floor) wins. The last policy is the
// catch-all, so selection is total.

use serde::{Deserialize, Serialize};

use crate::verdict::{Action, BotCategory, RiskBand};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Band floor: the rule applies from this band upwards.
    pub min_band: RiskBand,
    /// None matches any bot type, including none at all.
    #[serde(default)]
    pub bot_types: Option<Vec<BotCategory>>,
    pub action: Action,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPolicy {
    pub name: String,
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub action: Action,
    pub policy_name: String,
    pub reason: String,
}

pub struct PolicyRegistry {
    policies: Vec<ActionPolicy>,
}

impl PolicyRegistry {
    pub fn with_policies(policies: Vec<ActionPolicy>) -> Self {
        Self { policies }
    }

    pub fn select(&self, band: RiskBand, bot_type: Option<BotCategory>) -> Selection {
        for policy in &self.policies {
            let best = policy
                .rules
                .iter()
                .filter(|rule| rule_matches(rule, band, bot_type))
                .max_by_key(|rule| rule.min_band);
            if let Some(rule) = best {
                return Selection {
                    action: rule.action,
                    policy_name: policy.name.clone(),
                    reason: rule.reason.clone(),
                };
            }
        }
        // Unreachable with the default catch-all installed; still fail open.
        Selection {
            action: Action::Allow,
            policy_name: "none".into(),
            reason: "no policy matched".into(),
        }
    }
}

fn rule_matches(rule: &PolicyRule, band: RiskBand, bot_type: Option<BotCategory>) -> bool {
    if band < rule.min_band {
        return false;
    }
    match (&rule.bot_types, bot_type) {
        (None, _) => true,
        (Some(kinds), Some(t)) => kinds.contains(&t),
        (Some(_), None) => false,
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let rule = |min_band, bot_types: Option<&[BotCategory]>, action, reason: &str| PolicyRule {
            min_band,
            bot_types: bot_types.map(|k| k.to_vec()),
            action,
            reason: reason.into(),
        };

        Self::with_policies(vec![
            ActionPolicy {
                name: "verified-crawlers".into(),
                rules: vec![rule(
                    RiskBand::VeryLow,
                    Some(&[
                        BotCategory::SearchEngine,
                        BotCategory::SocialCrawler,
                        BotCategory::Monitor,
                    ]),
                    Action::Allow,
                    "verified crawler allowlist",
                )],
            },
            ActionPolicy {
                name: "scanner-block".into(),
                rules: vec![
                    rule(
                        RiskBand::VeryLow,
                        Some(&[BotCategory::SecurityScanner]),
                        Action::Challenge,
                        "low-evidence scanner match",
                    ),
                    rule(
                        RiskBand::Elevated,
                        Some(&[BotCategory::SecurityScanner]),
                        Action::Block,
                        "security scanner",
                    ),
                ],
            },
            ActionPolicy {
                name: "scripted-clients".into(),
                rules: vec![
                    rule(
                        RiskBand::Medium,
                        Some(&[BotCategory::ScriptingLibrary, BotCategory::AiCrawler]),
                        Action::Throttle,
                        "scripted client",
                    ),
                    rule(
                        RiskBand::High,
                        Some(&[BotCategory::ScriptingLibrary, BotCategory::AiCrawler]),
                        Action::Block,
                        "high-risk scripted client",
                    ),
                    rule(
                        RiskBand::Medium,
                        Some(&[BotCategory::Automation]),
                        Action::Challenge,
                        "browser automation",
                    ),
                    rule(
                        RiskBand::High,
                        Some(&[BotCategory::Automation]),
                        Action::Block,
                        "high-risk browser automation",
                    ),
                ],
            },
            ActionPolicy {
                name: "default".into(),
                rules: vec![
                    rule(RiskBand::VeryLow, None, Action::Allow, "low risk"),
                    rule(RiskBand::Elevated, None, Action::LogOnly, "elevated risk"),
                    rule(RiskBand::Medium, None, Action::Challenge, "medium risk"),
                    rule(RiskBand::High, None, Action::Challenge, "high risk"),
                    rule(RiskBand::VeryHigh, None, Action::Block, "very high risk"),
                ],
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_engine_allowed_at_any_band() {
        let registry = PolicyRegistry::default();
        let s = registry.select(RiskBand::VeryHigh, Some(BotCategory::SearchEngine));
        assert_eq!(s.action, Action::Allow);
        assert_eq!(s.policy_name, "verified-crawlers");
    }

    #[test]
    fn scanner_blocked_from_elevated() {
        let registry = PolicyRegistry::default();
        assert_eq!(
            registry.select(RiskBand::VeryHigh, Some(BotCategory::SecurityScanner)).action,
            Action::Block
        );
        assert_eq!(
            registry.select(RiskBand::Low, Some(BotCategory::SecurityScanner)).action,
            Action::Challenge
        );
    }

    #[test]
    fn scripted_client_graded_by_band() {
        let registry = PolicyRegistry::default();
        assert_eq!(
            registry.select(RiskBand::Medium, Some(BotCategory::ScriptingLibrary)).action,
            Action::Throttle
        );
        assert_eq!(
            registry.select(RiskBand::VeryHigh, Some(BotCategory::ScriptingLibrary)).action,
            Action::Block
        );
    }

    #[test]
    fn unknown_bot_type_falls_to_default() {
        let registry = PolicyRegistry::default();
        let s = registry.select(RiskBand::VeryHigh, Some(BotCategory::Unknown));
        assert_eq!(s.policy_name, "default");
        assert_eq!(s.action, Action::Block);
        let s = registry.select(RiskBand::Low, None);
        assert_eq!(s.action, Action::Allow);
    }

    #[test]
    fn most_specific_rule_wins_within_policy() {
        let registry = PolicyRegistry::default();
        // High band matches both the Medium and High automation rules;
        // the High rule's action applies.
        let s = registry.select(RiskBand::High, Some(BotCategory::Automation));
        assert_eq!(s.action, Action::Block);
    }

    #[test]
    fn policies_serialise_for_external_tables() {
        let registry = PolicyRegistry::default();
        let json = serde_json::to_string(&registry.policies).unwrap();
        let parsed: Vec<ActionPolicy> = serde_json::from_str(&json).unwrap();
        let rebuilt = PolicyRegistry::with_policies(parsed);
        assert_eq!(
            rebuilt.select(RiskBand::Medium, None).action,
            Action::Challenge
        );
    }
}
