// botgate/src/registry.rs
//
// Detector registry: embedded manifests + configuration overrides, validated
// and frozen at startup. Read-only for the life of the process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{DetectorOverride, EngineConfig};
use crate::detectors::DetectorKind;
use crate::error::ConfigError;
use crate::manifest::{parse_manifest, DetectorManifest};

const EMBEDDED_MANIFESTS: &[(&str, &str)] = &[
    ("user_agent.yaml", include_str!("../manifests/user_agent.yaml")),
    ("headers.yaml", include_str!("../manifests/headers.yaml")),
    ("ip.yaml", include_str!("../manifests/ip.yaml")),
    ("security_tool.yaml", include_str!("../manifests/security_tool.yaml")),
    ("inconsistency.yaml", include_str!("../manifests/inconsistency.yaml")),
    ("version_age.yaml", include_str!("../manifests/version_age.yaml")),
    ("heuristic.yaml", include_str!("../manifests/heuristic.yaml")),
    ("reputation.yaml", include_str!("../manifests/reputation.yaml")),
    ("tls.yaml", include_str!("../manifests/tls.yaml")),
    ("tcp.yaml", include_str!("../manifests/tcp.yaml")),
    ("http2.yaml", include_str!("../manifests/http2.yaml")),
    ("correlation.yaml", include_str!("../manifests/correlation.yaml")),
    ("waveform.yaml", include_str!("../manifests/waveform.yaml")),
    ("clustering.yaml", include_str!("../manifests/clustering.yaml")),
    ("llm.yaml", include_str!("../manifests/llm.yaml")),
];

/// Signal keys written by the input stage at context creation.
const INPUT_KEYS: &[&str] = &[
    "request.method",
    "request.path.depth",
    "request.path.length",
    "request.ua.present",
    "request.ua.length",
    "request.headers.count",
    "request.tls.present",
    "request.alpn",
    "request.h2.present",
    "request.tcp.present",
    "request.client.webdriver",
    "request.client.plugins",
];

/// Signal keys written by the orchestrator at wave barriers.
pub const AGGREGATE_KEYS: &[&str] = &[
    "detection.aggregate.provisional_probability",
    "detection.aggregate.ambiguous",
];

#[derive(Debug, Clone)]
pub struct Wave {
    pub priority: u32,
    pub detectors: Vec<DetectorKind>,
}

pub struct DetectorRegistry {
    manifests: HashMap<String, Arc<DetectorManifest>>,
    waves: Vec<Wave>,
}

impl DetectorRegistry {
    /// Build from the embedded documents plus the config's override table.
    pub fn build(config: &EngineConfig) -> Result<Self, ConfigError> {
        let mut manifests: HashMap<String, Arc<DetectorManifest>> = HashMap::new();
        let mut kinds: Vec<(DetectorKind, u32, bool)> = Vec::new();

        for (document, contents) in EMBEDDED_MANIFESTS {
            let mut manifest =
                parse_manifest(contents).map_err(|source| ConfigError::ManifestParse {
                    document: document.to_string(),
                    source,
                })?;

            let kind = DetectorKind::from_name(&manifest.name).ok_or_else(|| {
                ConfigError::UnknownDetector {
                    document: document.to_string(),
                    name: manifest.name.clone(),
                }
            })?;

            if manifests.contains_key(&manifest.name) {
                return Err(ConfigError::DuplicateDetector(manifest.name));
            }

            if let Some(overrides) = config.override_for(&manifest.name) {
                apply_override(&mut manifest, overrides);
            }

            for required in kind.required_parameters() {
                if manifest.param(required).is_none() {
                    return Err(ConfigError::MissingParameter {
                        detector: manifest.name.clone(),
                        parameter: required.to_string(),
                    });
                }
            }

            kinds.push((kind, manifest.priority, manifest.enabled));
            manifests.insert(manifest.name.clone(), Arc::new(manifest));
        }

        validate_exclusive_outputs(&manifests)?;
        warn_dangling_triggers(&manifests);

        // Partition enabled detectors into priority-ordered waves.
        let mut by_priority: std::collections::BTreeMap<u32, Vec<DetectorKind>> =
            std::collections::BTreeMap::new();
        for (kind, priority, enabled) in kinds {
            if enabled {
                by_priority.entry(priority).or_default().push(kind);
            }
        }
        let waves: Vec<Wave> = by_priority
            .into_iter()
            .map(|(priority, detectors)| Wave { priority, detectors })
            .collect();

        info!(
            detectors = manifests.len(),
            waves = waves.len(),
            "detector registry loaded"
        );

        Ok(Self { manifests, waves })
    }

    /// Registry with no overrides — fixtures and tests.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::build(&EngineConfig::default())
    }

    pub fn manifest(&self, name: &str) -> Option<&Arc<DetectorManifest>> {
        self.manifests.get(name)
    }

    pub fn manifest_for(&self, kind: DetectorKind) -> Option<&Arc<DetectorManifest>> {
        self.manifests.get(kind.name())
    }

    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    pub fn enabled_count(&self) -> usize {
        self.waves.iter().map(|w| w.detectors.len()).sum()
    }
}

fn apply_override(manifest: &mut DetectorManifest, overrides: &DetectorOverride) {
    if let Some(enabled) = overrides.enabled {
        manifest.enabled = enabled;
    }
    if let Some(priority) = overrides.priority {
        manifest.priority = priority;
    }
    if let Some(timeout_ms) = overrides.timeout_ms {
        manifest.defaults.timing.timeout_ms = timeout_ms;
    }
    for (k, v) in &overrides.weights {
        manifest.defaults.weights.insert(k.clone(), *v);
    }
    for (k, v) in &overrides.confidence {
        manifest.defaults.confidence.insert(k.clone(), *v);
    }
    for (k, v) in &overrides.parameters {
        match serde_yaml::to_value(v) {
            Ok(value) => {
                manifest.defaults.parameters.insert(k.clone(), value);
            }
            Err(e) => warn!(
                detector = %manifest.name,
                parameter = %k,
                error = %e,
                "unusable parameter override ignored"
            ),
        }
    }
}

/// No two enabled detectors may declare the same emitted key.
fn validate_exclusive_outputs(
    manifests: &HashMap<String, Arc<DetectorManifest>>,
) -> Result<(), ConfigError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut names: Vec<&String> = manifests.keys().collect();
    names.sort();
    for name in names {
        let manifest = &manifests[name.as_str()];
        if !manifest.enabled {
            continue;
        }
        for key in &manifest.emits {
            if let Some(first) = owners.insert(key.as_str(), manifest.name.as_str()) {
                return Err(ConfigError::ExclusiveOutput {
                    first: first.to_string(),
                    second: manifest.name.clone(),
                    key: key.clone(),
                });
            }
        }
    }
    Ok(())
}

/// A trigger referencing a key no upstream stage can produce is not fatal —
/// the detector simply never fires — but it is almost certainly a typo.
fn warn_dangling_triggers(manifests: &HashMap<String, Arc<DetectorManifest>>) {
    for manifest in manifests.values() {
        let mut producible: HashSet<&str> = INPUT_KEYS.iter().copied().collect();
        producible.extend(AGGREGATE_KEYS.iter().copied());
        for other in manifests.values() {
            if other.enabled && other.priority < manifest.priority {
                producible.extend(other.emits.iter().map(String::as_str));
            }
        }
        for key in manifest.trigger_keys() {
            if !producible.contains(key.as_str()) {
                warn!(
                    detector = %manifest.name,
                    key = %key,
                    "trigger references a signal no upstream detector produces; detector will never fire"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ALL_DETECTORS;

    #[test]
    fn embedded_manifests_load_and_partition() {
        let registry = DetectorRegistry::embedded().unwrap();
        assert_eq!(registry.enabled_count(), ALL_DETECTORS.len());
        let priorities: Vec<u32> = registry.waves().iter().map(|w| w.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2, 3]);

        let wave0 = &registry.waves()[0];
        assert!(wave0.detectors.contains(&DetectorKind::UserAgent));
        assert!(wave0.detectors.contains(&DetectorKind::Ip));
        let wave3 = &registry.waves()[3];
        assert!(wave3.detectors.contains(&DetectorKind::Llm));
    }

    #[test]
    fn every_detector_has_a_manifest() {
        let registry = DetectorRegistry::embedded().unwrap();
        for kind in ALL_DETECTORS {
            assert!(
                registry.manifest_for(kind).is_some(),
                "missing manifest for {kind}"
            );
        }
    }

    #[test]
    fn override_disables_and_retunes() {
        let mut config = EngineConfig::default();
        config.detection.insert(
            "llm".into(),
            crate::config::DetectorOverride {
                enabled: Some(false),
                ..Default::default()
            },
        );
        config.detection.insert(
            "user_agent".into(),
            crate::config::DetectorOverride {
                weights: [("match".to_string(), 2.0)].into_iter().collect(),
                parameters: [("empty_ua_score".to_string(), serde_json::json!(0.95))]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
        );

        let registry = DetectorRegistry::build(&config).unwrap();
        assert_eq!(registry.enabled_count(), ALL_DETECTORS.len() - 1);
        let ua = registry.manifest("user_agent").unwrap();
        assert_eq!(ua.weight("match", 0.0), 2.0);
        assert_eq!(ua.param_f64("empty_ua_score", 0.0), 0.95);
    }

    #[test]
    fn priority_override_moves_detector_between_waves() {
        let mut config = EngineConfig::default();
        config.detection.insert(
            "waveform".into(),
            crate::config::DetectorOverride {
                priority: Some(1),
                ..Default::default()
            },
        );
        let registry = DetectorRegistry::build(&config).unwrap();
        let wave1 = registry.waves().iter().find(|w| w.priority == 1).unwrap();
        assert!(wave1.detectors.contains(&DetectorKind::Waveform));
    }
}
