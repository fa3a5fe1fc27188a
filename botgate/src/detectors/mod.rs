// botgate/src/detectors/mod.rs
//
// Contributing detector catalog. Each detector is a module exposing
// `contribute(ctx, manifest, shared)`; the orchestrator dispatches through
// `run` so detectors stay plain free functions while the wave plan stays
// data-driven.

// Wave 0 — syntactic fast path
pub mod headers;
pub mod ip;
pub mod security_tool;
pub mod user_agent;
// Wave 1 — composite syntactic
pub mod heuristic;
pub mod inconsistency;
pub mod reputation;
pub mod version_age;
// Wave 2 — advanced fingerprinting
pub mod http2;
pub mod tcp;
pub mod tls;
pub mod waveform;
// Wave 3 — cross-layer correlation + escalation
// (correlation consumes wave-2 signals, so it runs behind their barrier)
pub mod clustering;
pub mod correlation;
pub mod llm;

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::context::DetectionContext;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    UserAgent,
    Headers,
    Ip,
    SecurityTool,
    Inconsistency,
    VersionAge,
    Heuristic,
    Reputation,
    Tls,
    Tcp,
    Http2,
    Correlation,
    Waveform,
    Clustering,
    Llm,
}

pub const ALL_DETECTORS: [DetectorKind; 15] = [
    DetectorKind::UserAgent,
    DetectorKind::Headers,
    DetectorKind::Ip,
    DetectorKind::SecurityTool,
    DetectorKind::Inconsistency,
    DetectorKind::VersionAge,
    DetectorKind::Heuristic,
    DetectorKind::Reputation,
    DetectorKind::Tls,
    DetectorKind::Tcp,
    DetectorKind::Http2,
    DetectorKind::Correlation,
    DetectorKind::Waveform,
    DetectorKind::Clustering,
    DetectorKind::Llm,
];

impl DetectorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::UserAgent => "user_agent",
            Self::Headers => "headers",
            Self::Ip => "ip",
            Self::SecurityTool => "security_tool",
            Self::Inconsistency => "inconsistency",
            Self::VersionAge => "version_age",
            Self::Heuristic => "heuristic",
            Self::Reputation => "reputation",
            Self::Tls => "tls",
            Self::Tcp => "tcp",
            Self::Http2 => "http2",
            Self::Correlation => "correlation",
            Self::Waveform => "waveform",
            Self::Clustering => "clustering",
            Self::Llm => "llm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        ALL_DETECTORS.iter().copied().find(|k| k.name() == name)
    }

    /// Parameters the manifest must supply; their absence is fatal at startup.
    pub fn required_parameters(self) -> &'static [&'static str] {
        match self {
            Self::UserAgent => &["empty_ua_score"],
            Self::Heuristic => &["bias", "coefficients"],
            Self::Reputation => &["window_secs"],
            Self::VersionAge => &["stale_major_lag"],
            Self::Waveform => &["min_visits"],
            Self::Clustering => &["min_observations"],
            _ => &[],
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Dispatch a detector. The orchestrator wraps this in the per-detector
/// timeout and traps panics at the join point.
pub async fn run(
    kind: DetectorKind,
    ctx: Arc<DetectionContext>,
    manifest: Arc<DetectorManifest>,
    shared: Arc<SharedState>,
    config: Arc<EngineConfig>,
) -> Result<Vec<Contribution>, DetectorError> {
    match kind {
        DetectorKind::UserAgent => user_agent::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Headers => headers::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Ip => ip::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::SecurityTool => security_tool::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Inconsistency => inconsistency::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::VersionAge => version_age::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Heuristic => heuristic::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Reputation => reputation::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Tls => tls::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Tcp => tcp::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Http2 => http2::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Correlation => correlation::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Waveform => waveform::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Clustering => clustering::contribute(&ctx, &manifest, &shared).await,
        DetectorKind::Llm => llm::contribute(&ctx, &manifest, &shared, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ALL_DETECTORS {
            assert_eq!(DetectorKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(DetectorKind::from_name("nope"), None);
    }
}
