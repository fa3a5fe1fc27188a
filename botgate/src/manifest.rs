// botgate/src/manifest.rs
//
// Per-detector static configuration. One embedded YAML document per detector,
// merged with user overrides at startup, immutable afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::signal::{Signal, SignalSink};

// ── Manifest ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorManifest {
    pub name: String,
    pub priority: u32,
    pub enabled: bool,
    pub scope: DetectorScope,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub emits: Vec<String>,
    #[serde(default)]
    pub defaults: ManifestDefaults,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectorScope {
    /// Sub-millisecond, purely syntactic.
    Fast,
    /// Cross-checks wave-0 outputs.
    Composite,
    /// Fingerprint correlation; skipped when already classified or budget low.
    Advanced,
    /// Ambiguity-gated escalation.
    Escalation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ManifestDefaults {
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub confidence: HashMap<String, f64>,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub features: HashMap<String, f64>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Timing {
    pub timeout_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self { timeout_ms: 25 }
    }
}

impl DetectorManifest {
    pub fn weight(&self, name: &str, fallback: f64) -> f64 {
        self.defaults.weights.get(name).copied().unwrap_or(fallback)
    }

    pub fn confidence(&self, name: &str, fallback: f64) -> f64 {
        self.defaults
            .confidence
            .get(name)
            .copied()
            .unwrap_or(fallback)
    }

    pub fn param(&self, name: &str) -> Option<&serde_yaml::Value> {
        self.defaults.parameters.get(name)
    }

    pub fn param_f64(&self, name: &str, fallback: f64) -> f64 {
        self.param(name).and_then(|v| v.as_f64()).unwrap_or(fallback)
    }

    pub fn param_u64(&self, name: &str, fallback: u64) -> u64 {
        self.param(name).and_then(|v| v.as_u64()).unwrap_or(fallback)
    }

    pub fn param_str(&self, name: &str, fallback: &str) -> String {
        self.param(name)
            .and_then(|v| v.as_str())
            .unwrap_or(fallback)
            .to_string()
    }

    /// Nested `name: value` float map parameter (e.g. logistic coefficients).
    pub fn param_f64_map(&self, name: &str) -> HashMap<String, f64> {
        let mut out = HashMap::new();
        if let Some(serde_yaml::Value::Mapping(map)) = self.param(name) {
            for (k, v) in map {
                if let (Some(k), Some(v)) = (k.as_str(), v.as_f64()) {
                    out.insert(k.to_string(), v);
                }
            }
        }
        out
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.defaults.timing.timeout_ms)
    }

    /// All signal keys referenced by this manifest's triggers.
    pub fn trigger_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for trigger in &self.triggers {
            trigger.collect_keys(&mut keys);
        }
        keys
    }

    /// True when every trigger condition holds against the current signals.
    pub fn triggers_satisfied(&self, sink: &SignalSink) -> bool {
        self.triggers.iter().all(|t| t.evaluate(sink))
    }
}

// ── Triggers ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    Exists { key: String },
    Equals { key: String, value: TriggerValue },
    GreaterThan { key: String, value: f64 },
    AnyOf { nested: Vec<Trigger> },
    AllOf { nested: Vec<Trigger> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TriggerValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl TriggerValue {
    fn matches(&self, signal: &Signal) -> bool {
        match (self, signal) {
            (Self::Bool(a), Signal::Bool(b)) => a == b,
            (Self::Int(a), Signal::Int(b)) => a == b,
            (Self::Real(a), Signal::Real(b)) => (a - b).abs() < f64::EPSILON,
            (Self::Int(a), Signal::Real(b)) => (*a as f64 - b).abs() < f64::EPSILON,
            (Self::Real(a), Signal::Int(b)) => (a - *b as f64).abs() < f64::EPSILON,
            (Self::Str(a), Signal::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Trigger {
    pub fn evaluate(&self, sink: &SignalSink) -> bool {
        match self {
            Self::Exists { key } => sink.contains(key),
            Self::Equals { key, value } => {
                sink.get(key).map(|s| value.matches(&s)).unwrap_or(false)
            }
            Self::GreaterThan { key, value } => {
                sink.get(key).map(|s| s.as_real() > *value).unwrap_or(false)
            }
            Self::AnyOf { nested } => nested.iter().any(|t| t.evaluate(sink)),
            Self::AllOf { nested } => nested.iter().all(|t| t.evaluate(sink)),
        }
    }

    fn collect_keys(&self, out: &mut Vec<String>) {
        match self {
            Self::Exists { key } | Self::GreaterThan { key, .. } => out.push(key.clone()),
            Self::Equals { key, .. } => out.push(key.clone()),
            Self::AnyOf { nested } | Self::AllOf { nested } => {
                for t in nested {
                    t.collect_keys(out);
                }
            }
        }
    }
}

pub fn parse_manifest(document: &str) -> Result<DetectorManifest, serde_yaml::Error> {
    serde_yaml::from_str(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
name: inconsistency
priority: 1
enabled: true
scope: composite
triggers:
  - kind: all_of
    nested:
      - { kind: exists, key: request.ip.is_datacenter }
      - { kind: exists, key: detection.useragent.category }
emits:
  - detection.inconsistency.score
defaults:
  weights: { cross: 1.0 }
  confidence: { cross: 0.85 }
  timing: { timeout_ms: 10 }
  parameters:
    datacenter_browser_score: 0.6
"#;

    #[test]
    fn parses_full_document() {
        let m = parse_manifest(DOC).unwrap();
        assert_eq!(m.name, "inconsistency");
        assert_eq!(m.priority, 1);
        assert_eq!(m.scope, DetectorScope::Composite);
        assert_eq!(m.weight("cross", 0.0), 1.0);
        assert_eq!(m.param_f64("datacenter_browser_score", 0.0), 0.6);
        assert_eq!(
            m.trigger_keys(),
            vec!["request.ip.is_datacenter", "detection.useragent.category"]
        );
    }

    #[test]
    fn parse_serialise_parse_round_trips() {
        let m = parse_manifest(DOC).unwrap();
        let serialised = serde_yaml::to_string(&m).unwrap();
        let reparsed = parse_manifest(&serialised).unwrap();
        assert_eq!(m, reparsed);
    }

    #[test]
    fn trigger_evaluation() {
        let m = parse_manifest(DOC).unwrap();
        let sink = SignalSink::new();
        assert!(!m.triggers_satisfied(&sink));

        sink.set_signal("ip", "request.ip.is_datacenter", true).unwrap();
        sink.publish_wave();
        assert!(!m.triggers_satisfied(&sink));

        sink.set_signal("ua", "detection.useragent.category", "automation")
            .unwrap();
        sink.publish_wave();
        assert!(m.triggers_satisfied(&sink));
    }

    #[test]
    fn greater_than_widens_ints() {
        let sink = SignalSink::new();
        sink.set_signal("r", "detection.reputation.hits", 5i64).unwrap();
        sink.publish_wave();
        let t = Trigger::GreaterThan {
            key: "detection.reputation.hits".into(),
            value: 3.0,
        };
        assert!(t.evaluate(&sink));
        let t = Trigger::GreaterThan {
            key: "detection.reputation.hits".into(),
            value: 5.0,
        };
        assert!(!t.evaluate(&sink));
    }
}
