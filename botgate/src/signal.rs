// botgate/src/signal.rs
//
// The blackboard: a typed key→value signal map plus detector contributions.
//
// Signals are write-once. Writes land in a pending shard while a wave runs;
// the orchestrator applies a publish barrier at each wave boundary, after
// which the wave's signals become visible to later waves. Reads only ever
// touch the published map, so a detector structurally cannot observe a
// same-wave peer.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detectors::DetectorKind;
use crate::error::SignalConflict;
use crate::verdict::BotCategory;

// ── Signal value ──────────────────────────────────────────────────────────────

/// Tagged union of blackboard value types. A mismatched typed accessor
/// returns the zero value of the requested type, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Signal {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Bundle(HashMap<String, serde_json::Value>),
}

impl Signal {
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            _ => false,
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Self::Int(i) => *i,
            _ => 0,
        }
    }

    /// Numeric accessor; integers widen.
    pub fn as_real(&self) -> f64 {
        match self {
            Self::Real(r) => *r,
            Self::Int(i) => *i as f64,
            _ => 0.0,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Str(s) => s.as_str(),
            _ => "",
        }
    }
}

impl From<bool> for Signal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i64> for Signal {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}
impl From<f64> for Signal {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}
impl From<&str> for Signal {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}
impl From<String> for Signal {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}
impl From<HashMap<String, serde_json::Value>> for Signal {
    fn from(v: HashMap<String, serde_json::Value>) -> Self {
        Self::Bundle(v)
    }
}

// ── Contribution ──────────────────────────────────────────────────────────────

/// One detector's verdict fragment. Positive raw scores argue bot, negative
/// argue human, zero is neutral. `weighted_score` is always recomputed here —
/// never trusted from the producer.
#[derive(Debug, Clone, Serialize)]
pub struct Contribution {
    pub detector: DetectorKind,
    pub category: Option<BotCategory>,
    pub raw_score: f64,
    pub weight: f64,
    pub weighted_score: f64,
    pub confidence: f64,
    pub rationale: String,
    pub signals: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, serde_json::Value>,
}

impl Contribution {
    pub fn new(
        detector: DetectorKind,
        raw_score: f64,
        weight: f64,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        let raw_score = raw_score.clamp(-1.0, 1.0);
        let weight = weight.max(0.0);
        Self {
            detector,
            category: None,
            raw_score,
            weight,
            weighted_score: raw_score * weight,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: rationale.into(),
            signals: Vec::new(),
            meta: HashMap::new(),
        }
    }

    /// Bot-leaning contribution (`score` in [0,1]).
    pub fn bot(
        detector: DetectorKind,
        score: f64,
        weight: f64,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self::new(detector, score.abs(), weight, confidence, rationale)
    }

    /// Human-leaning contribution (`score` in [0,1]).
    pub fn human(
        detector: DetectorKind,
        score: f64,
        weight: f64,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Self {
        Self::new(detector, -score.abs(), weight, confidence, rationale)
    }

    pub fn with_category(mut self, category: BotCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_signals(mut self, keys: Vec<String>) -> Self {
        self.signals = keys;
        self
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub value: Signal,
    pub producer: String,
}

/// Thread-safe blackboard for one request.
pub struct SignalSink {
    published: RwLock<HashMap<String, SignalRecord>>,
    pending: DashMap<String, SignalRecord>,
    contributions: Mutex<Vec<Contribution>>,
}

impl SignalSink {
    pub fn new() -> Self {
        Self {
            published: RwLock::new(HashMap::new()),
            pending: DashMap::new(),
            contributions: Mutex::new(Vec::new()),
        }
    }

    /// Write-once. A conflict is not fatal: the first writer wins and the
    /// loser gets the conflict back (callers log it).
    pub fn set_signal(
        &self,
        producer: &str,
        key: &str,
        value: impl Into<Signal>,
    ) -> Result<(), SignalConflict> {
        if let Some(existing) = self.published.read().get(key) {
            return Err(SignalConflict {
                key: key.to_string(),
                first_producer: existing.producer.clone(),
            });
        }
        match self.pending.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(e) => Err(SignalConflict {
                key: key.to_string(),
                first_producer: e.get().producer.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(SignalRecord {
                    value: value.into(),
                    producer: producer.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Drop unpublished signals from a producer. Used when a detector times
    /// out or fails mid-wave: its partial output must not survive.
    pub fn discard_pending_from(&self, producer: &str) -> usize {
        let keys: Vec<String> = self
            .pending
            .iter()
            .filter(|e| e.value().producer == producer)
            .map(|e| e.key().clone())
            .collect();
        for key in &keys {
            self.pending.remove(key);
        }
        keys.len()
    }

    /// Publish barrier: everything written during the wave becomes visible.
    pub fn publish_wave(&self) {
        let mut published = self.published.write();
        let keys: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((key, record)) = self.pending.remove(&key) {
                published.entry(key).or_insert(record);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Signal> {
        self.published.read().get(key).map(|r| r.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.published.read().contains_key(key)
    }

    pub fn bool(&self, key: &str) -> bool {
        self.get(key).map(|s| s.as_bool()).unwrap_or(false)
    }

    pub fn int(&self, key: &str) -> i64 {
        self.get(key).map(|s| s.as_int()).unwrap_or(0)
    }

    pub fn real(&self, key: &str) -> f64 {
        self.get(key).map(|s| s.as_real()).unwrap_or(0.0)
    }

    pub fn str(&self, key: &str) -> String {
        self.get(key)
            .map(|s| s.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.published.read().keys().cloned().collect()
    }

    /// Published snapshot for the final verdict.
    pub fn snapshot(&self) -> HashMap<String, Signal> {
        self.published
            .read()
            .iter()
            .map(|(k, r)| (k.clone(), r.value.clone()))
            .collect()
    }

    pub fn record_contribution(&self, contribution: Contribution) {
        self.contributions.lock().push(contribution);
    }

    pub fn contributions(&self) -> Vec<Contribution> {
        self.contributions.lock().clone()
    }

    pub fn max_weighted_score(&self) -> f64 {
        self.contributions
            .lock()
            .iter()
            .map(|c| c.weighted_score)
            .fold(0.0, f64::max)
    }

    /// Convenience used by detectors: write and log any conflict.
    pub fn emit(&self, producer: &str, key: &str, value: impl Into<Signal>) {
        if let Err(conflict) = self.set_signal(producer, key, value) {
            warn!(
                key = %conflict.key,
                first = %conflict.first_producer,
                second = %producer,
                "signal double-write, first writer wins"
            );
        }
    }
}

impl Default for SignalSink {
    fn default() -> Self {
        Self::new()
    }
}
