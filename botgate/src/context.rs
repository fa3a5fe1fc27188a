// botgate/src/context.rs
//
// Per-request detection context: the fingerprint, the signal sink, the
// deadline, and everything the aggregator consumes. Created at middleware
// entry, populated monotonically, released at response completion.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::fingerprint::RequestFingerprint;
use crate::signal::{Contribution, Signal, SignalSink};

pub const INPUT_STAGE: &str = "input";

// ── Pipeline state machine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Building,
    WaveRunning(u32),
    Barrier(u32),
    Aggregating,
    Final,
    BudgetExceeded,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Final | Self::BudgetExceeded)
    }
}

// ── Learning sink ─────────────────────────────────────────────────────────────

/// Feature record emitted for offline consumers. The engine itself never
/// reads these back.
#[derive(Debug, Clone, Serialize)]
pub struct LearningRecord {
    pub signature: String,
    pub features: HashMap<String, f64>,
    pub label_hint: Option<bool>,
    pub at: DateTime<Utc>,
}

// ── Context ───────────────────────────────────────────────────────────────────

pub struct DetectionContext {
    pub fingerprint: RequestFingerprint,
    pub signature: String,
    pub sink: SignalSink,
    pub started: Instant,
    pub deadline: Instant,
    state: Mutex<PipelineState>,
    learning: Mutex<Vec<LearningRecord>>,
}

impl DetectionContext {
    pub fn new(fingerprint: RequestFingerprint, signature: String, budget: Duration) -> Self {
        let started = Instant::now();
        let ctx = Self {
            fingerprint,
            signature,
            sink: SignalSink::new(),
            started,
            deadline: started + budget,
            state: Mutex::new(PipelineState::Building),
            learning: Mutex::new(Vec::new()),
        };
        ctx.seed_input_signals();
        ctx
    }

    /// Input-stage signals: derived request properties only. The raw UA
    /// string and remote address never reach the blackboard.
    fn seed_input_signals(&self) {
        let fp = &self.fingerprint;
        let sink = &self.sink;
        sink.emit(INPUT_STAGE, "request.method", fp.method.as_str());
        sink.emit(INPUT_STAGE, "request.path.depth", fp.path_segments().len() as i64);
        sink.emit(INPUT_STAGE, "request.path.length", fp.path.len() as i64);
        sink.emit(INPUT_STAGE, "request.ua.present", !fp.user_agent.is_empty());
        sink.emit(INPUT_STAGE, "request.ua.length", fp.user_agent.len() as i64);
        sink.emit(INPUT_STAGE, "request.headers.count", fp.headers.len() as i64);
        sink.emit(INPUT_STAGE, "request.tls.present", fp.tls.is_some());
        if let Some(ref alpn) = fp.alpn {
            sink.emit(INPUT_STAGE, "request.alpn", alpn.as_str());
        }
        sink.emit(INPUT_STAGE, "request.h2.present", fp.h2.is_some());
        sink.emit(INPUT_STAGE, "request.tcp.present", fp.tcp.is_some());
        if let Some(ref features) = fp.client_features {
            sink.emit(INPUT_STAGE, "request.client.webdriver", features.webdriver);
            sink.emit(INPUT_STAGE, "request.client.plugins", features.plugins as i64);
        }
        sink.publish_wave();
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn set_state(&self, next: PipelineState) {
        let mut state = self.state.lock();
        tracing::trace!(from = ?*state, to = ?next, "pipeline state");
        *state = next;
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    // Sink passthroughs kept for call-site brevity in detectors.

    pub fn record_contribution(&self, contribution: Contribution) {
        self.sink.record_contribution(contribution);
    }

    pub fn contributions(&self) -> Vec<Contribution> {
        self.sink.contributions()
    }

    pub fn max_weighted_score(&self) -> f64 {
        self.sink.max_weighted_score()
    }

    pub fn get_signal(&self, key: &str) -> Option<Signal> {
        self.sink.get(key)
    }

    pub fn add_learning(&self, record: LearningRecord) {
        self.learning.lock().push(record);
    }

    pub fn drain_learning(&self) -> Vec<LearningRecord> {
        std::mem::take(&mut *self.learning.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(ua: &str, path: &str) -> DetectionContext {
        DetectionContext::new(
            RequestFingerprint::synthetic(ua, path),
            "sig".into(),
            Duration::from_millis(150),
        )
    }

    #[test]
    fn input_signals_are_published_immediately() {
        let ctx = ctx("Mozilla/5.0", "/a/b");
        assert!(ctx.sink.bool("request.ua.present"));
        assert_eq!(ctx.sink.int("request.path.depth"), 2);
        assert_eq!(ctx.sink.str("request.method"), "GET");
    }

    #[test]
    fn raw_ua_never_on_blackboard() {
        let ctx = ctx("Mozilla/5.0 (Windows NT 10.0)", "/");
        for key in ctx.sink.keys() {
            let value = ctx.sink.get(&key).unwrap();
            if let Signal::Str(s) = value {
                assert!(!s.contains("Mozilla"), "raw UA leaked via {key}");
            }
        }
    }

    #[test]
    fn empty_ua_flagged_absent() {
        let ctx = ctx("", "/");
        assert!(!ctx.sink.bool("request.ua.present"));
        assert_eq!(ctx.sink.int("request.ua.length"), 0);
    }

    #[test]
    fn learning_records_drain_once() {
        let ctx = ctx("ua", "/");
        ctx.add_learning(LearningRecord {
            signature: "sig".into(),
            features: HashMap::new(),
            label_hint: Some(true),
            at: Utc::now(),
        });
        assert_eq!(ctx.drain_learning().len(), 1);
        assert!(ctx.drain_learning().is_empty());
    }
}
