// botgate/src/lib.rs
//
// Botgate — wave-scheduled bot detection for an HTTP serving path.
//
// Per request the hosting middleware builds a `RequestFingerprint`, calls
// `Engine::evaluate`, and gets back `AggregatedEvidence`: bot probability,
// confidence, risk band, category, per-detector contributions and a
// recommended action. Detectors run in priority waves over a write-once
// signal blackboard; ambiguous requests can escalate to an LLM classifier.

pub mod config;
pub mod context;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod llm;
pub mod manifest;
pub mod registry;
pub mod signal;
pub mod signature;
pub mod state;
pub mod verdict;

pub use config::EngineConfig;
pub use context::{DetectionContext, LearningRecord};
pub use engine::policy::{ActionPolicy, PolicyRegistry, PolicyRule};
pub use engine::Engine;
pub use fingerprint::{RequestFingerprint, TlsMetadata};
pub use llm::{CompletionRequest, LlmProvider};
pub use signal::{Contribution, Signal};
pub use verdict::{Action, AggregatedEvidence, BotCategory, RiskBand};
