// botgate/src/config.rs
//
// Engine configuration. Built once at startup from an optional file plus
// BOTGATE_-prefixed environment variables; detectors receive their slice via
// the registry and never self-locate configuration.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// Placeholder secret shipped for local runs. Production mode refuses it.
pub const DEFAULT_HMAC_SECRET: &str = "botgate-dev-secret-do-not-deploy";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_hmac_secret")]
    pub hmac_secret: String,
    #[serde(default)]
    pub production: bool,
    /// Demo mode serialises per-detector contributions into response headers.
    /// Never enable in production.
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Fraction of the overall budget reserved for aggregation.
    #[serde(default = "default_tail_reserve_pct")]
    pub tail_reserve_pct: u64,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub clustering: ClusteringSettings,
    /// Per-detector manifest overrides, keyed by detector name.
    #[serde(default)]
    pub detection: HashMap<String, DetectorOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    /// Logistic steepness for the probability map.
    #[serde(default = "default_k")]
    pub k: f64,
    /// Evidence mass at which confidence saturates.
    #[serde(default = "default_saturation")]
    pub saturation: f64,
    #[serde(default = "default_bot_threshold")]
    pub bot_threshold: f64,
    /// max_weighted_score above which the advanced wave is skipped.
    #[serde(default = "default_definitive_score")]
    pub definitive_score: f64,
    /// Minimum remaining budget for the advanced wave to launch.
    #[serde(default = "default_advanced_min_ms")]
    pub advanced_min_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
    /// Ambiguity band: escalate when provisional probability lands inside.
    #[serde(default = "default_band_low")]
    pub band_low: f64,
    #[serde(default = "default_band_high")]
    pub band_high: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowSettings {
    #[serde(default = "default_max_signatures")]
    pub max_signatures: usize,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
    #[serde(default = "default_max_visits")]
    pub max_visits: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringSettings {
    /// Single-linkage distance threshold over the weighted feature space.
    #[serde(default = "default_link_threshold")]
    pub link_threshold: f64,
    /// Per-feature weight delta that counts as a shift event.
    #[serde(default = "default_shift_threshold")]
    pub shift_threshold: f64,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
}

/// Override block for one detector: `detection.<name>.<field>`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DetectorOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub confidence: HashMap<String, f64>,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

impl EngineConfig {
    /// File (`botgate.{toml,yaml,json}`, optional) + environment
    /// (`BOTGATE_LLM__ENABLED=true` style), environment winning.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(p) => builder.add_source(config::File::with_name(p)),
            None => builder.add_source(config::File::with_name("botgate").required(false)),
        };
        let source = builder
            .add_source(config::Environment::with_prefix("BOTGATE").separator("__"))
            .build()?;
        let parsed: EngineConfig = source.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.production && self.hmac_secret == DEFAULT_HMAC_SECRET {
            return Err(ConfigError::InsecureSecret);
        }
        if self.demo_mode {
            warn!("DEMO MODE ENABLED — per-detector evidence will be serialised into response headers; do not run this configuration in production");
        }
        Ok(())
    }

    pub fn deadline(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.deadline_ms)
    }

    /// Budget slice reserved for aggregation at the tail of the pipeline.
    pub fn tail_reserve(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.deadline_ms * self.tail_reserve_pct / 100)
    }

    pub fn override_for(&self, detector: &str) -> Option<&DetectorOverride> {
        self.detection.get(detector)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hmac_secret: default_hmac_secret(),
            production: false,
            demo_mode: false,
            deadline_ms: default_deadline_ms(),
            tail_reserve_pct: default_tail_reserve_pct(),
            aggregation: AggregationConfig::default(),
            llm: LlmSettings::default(),
            window: WindowSettings::default(),
            clustering: ClusteringSettings::default(),
            detection: HashMap::new(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            saturation: default_saturation(),
            bot_threshold: default_bot_threshold(),
            definitive_score: default_definitive_score(),
            advanced_min_ms: default_advanced_min_ms(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_llm_endpoint(),
            model: String::new(),
            api_key: None,
            temperature: default_llm_temperature(),
            max_tokens: default_llm_max_tokens(),
            timeout_ms: default_llm_timeout_ms(),
            band_low: default_band_low(),
            band_high: default_band_high(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            max_signatures: default_max_signatures(),
            retention_secs: default_retention_secs(),
            max_visits: default_max_visits(),
        }
    }
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            link_threshold: default_link_threshold(),
            shift_threshold: default_shift_threshold(),
            max_points: default_max_points(),
        }
    }
}

fn default_hmac_secret() -> String {
    DEFAULT_HMAC_SECRET.to_string()
}
fn default_deadline_ms() -> u64 {
    150
}
fn default_tail_reserve_pct() -> u64 {
    10
}
fn default_k() -> f64 {
    1.0
}
fn default_saturation() -> f64 {
    2.0
}
fn default_bot_threshold() -> f64 {
    0.7
}
fn default_definitive_score() -> f64 {
    1.2
}
fn default_advanced_min_ms() -> u64 {
    30
}
fn default_llm_endpoint() -> String {
    "http://127.0.0.1:8080/v1/completions".to_string()
}
fn default_llm_temperature() -> f64 {
    0.1
}
fn default_llm_max_tokens() -> u32 {
    150
}
fn default_llm_timeout_ms() -> u64 {
    12_000
}
fn default_band_low() -> f64 {
    0.35
}
fn default_band_high() -> f64 {
    0.75
}
fn default_max_signatures() -> usize {
    100_000
}
fn default_retention_secs() -> i64 {
    24 * 60 * 60
}
fn default_max_visits() -> usize {
    256
}
fn default_link_threshold() -> f64 {
    0.35
}
fn default_shift_threshold() -> f64 {
    0.05
}
fn default_max_points() -> usize {
    512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.deadline_ms, 150);
        assert_eq!(cfg.aggregation.k, 1.0);
        assert_eq!(cfg.aggregation.saturation, 2.0);
        assert_eq!(cfg.aggregation.bot_threshold, 0.7);
        assert_eq!(cfg.llm.band_low, 0.35);
        assert_eq!(cfg.llm.band_high, 0.75);
        assert_eq!(cfg.tail_reserve().as_millis(), 15);
    }

    #[test]
    fn production_rejects_default_secret() {
        let cfg = EngineConfig {
            production: true,
            ..EngineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InsecureSecret)));

        let cfg = EngineConfig {
            production: true,
            hmac_secret: "rotated-secret".into(),
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }
}
