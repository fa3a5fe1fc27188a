// botgate/src/detectors/tcp.rs
//
// TCP/IP stack fingerprinting from edge-observed TTL and window size.
// Emits an OS guess for the correlation detector; no verdict pressure of its
// own — a Linux stack is not suspicious until something claims otherwise.

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Tcp;

pub async fn contribute(
    ctx: &DetectionContext,
    _manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let tcp = match ctx.fingerprint.tcp.as_ref() {
        Some(tcp) => tcp,
        None => return Ok(Vec::new()),
    };

    if let Some(guess) = os_guess(tcp.ttl, tcp.window_size) {
        ctx.sink.emit(KIND.name(), "detection.tcp.os_guess", guess);
    }
    Ok(Vec::new())
}

/// Initial-TTL inference: stacks start at 64 (unixes), 128 (Windows) or 255
/// (network gear); the observed value sits within one routing diameter below.
fn os_guess(ttl: u8, window_size: u32) -> Option<&'static str> {
    match ttl {
        0 => None,
        1..=64 => {
            // macOS historically announces 65535; Linux defaults much lower.
            if window_size == 65_535 {
                Some("macos")
            } else {
                Some("linux")
            }
        }
        65..=128 => Some("windows"),
        _ => Some("network"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{RequestFingerprint, TcpMetadata};
    use crate::registry::DetectorRegistry;
    use std::time::Duration;

    #[test]
    fn ttl_buckets_map_to_stacks() {
        assert_eq!(os_guess(57, 29200), Some("linux"));
        assert_eq!(os_guess(64, 65535), Some("macos"));
        assert_eq!(os_guess(117, 64240), Some("windows"));
        assert_eq!(os_guess(244, 8760), Some("network"));
        assert_eq!(os_guess(0, 0), None);
    }

    #[tokio::test]
    async fn emits_guess_without_contribution() {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("tcp").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let mut fp = RequestFingerprint::synthetic("x", "/");
        fp.tcp = Some(TcpMetadata {
            ttl: 57,
            window_size: 29200,
        });
        let ctx = DetectionContext::new(fp, "sig".into(), Duration::from_millis(150));
        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        assert!(out.is_empty());
        assert_eq!(ctx.sink.str("detection.tcp.os_guess"), "linux");
    }
}
