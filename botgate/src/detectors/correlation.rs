// botgate/src/detectors/correlation.rs
//
// Multi-layer correlation: the TCP stack's OS guess against the UA's OS
// claim. A Windows UA on a Linux TCP stack is a farm of headless workers
// wearing a desktop costume.

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Correlation;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let sink = &ctx.sink;
    let os_guess = sink.str("detection.tcp.os_guess");
    let os_claim = sink.str("detection.useragent.os");
    if os_guess.is_empty() || os_claim.is_empty() {
        return Ok(Vec::new());
    }

    let mismatch = os_mismatch(&os_guess, &os_claim);
    sink.emit(KIND.name(), "detection.correlation.os_mismatch", mismatch);

    if !mismatch {
        return Ok(Vec::new());
    }

    Ok(vec![Contribution::bot(
        KIND,
        manifest.param_f64("mismatch_score", 0.7),
        manifest.weight("mismatch", 1.2),
        manifest.confidence("mismatch", 0.9),
        format!("UA claims {os_claim} but the TCP stack looks like {os_guess}"),
    )
    .with_signals(vec!["detection.correlation.os_mismatch".into()])])
}

fn os_mismatch(guess: &str, claim: &str) -> bool {
    match guess {
        // Router/proxy hop; not attributable to the client stack.
        "network" => false,
        "windows" => claim != "windows",
        "macos" => !matches!(claim, "macos" | "ios"),
        "linux" => !matches!(claim, "linux" | "android"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::RequestFingerprint;
    use crate::registry::DetectorRegistry;
    use std::time::Duration;

    async fn run(guess: &str, claim: &str) -> (DetectionContext, Vec<Contribution>) {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("correlation").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let ctx = DetectionContext::new(
            RequestFingerprint::synthetic("x", "/"),
            "sig".into(),
            Duration::from_millis(150),
        );
        ctx.sink.emit("tcp", "detection.tcp.os_guess", guess);
        ctx.sink.emit("user_agent", "detection.useragent.os", claim);
        ctx.sink.publish_wave();
        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        (ctx, out)
    }

    #[tokio::test]
    async fn linux_stack_claiming_windows_is_flagged() {
        let (ctx, contributions) = run("linux", "windows").await;
        assert!(ctx.sink.bool("detection.correlation.os_mismatch"));
        assert!(contributions[0].weighted_score > 0.8);
    }

    #[tokio::test]
    async fn matching_stacks_stay_silent() {
        let (ctx, contributions) = run("windows", "windows").await;
        assert!(!ctx.sink.bool("detection.correlation.os_mismatch"));
        assert!(contributions.is_empty());
    }

    #[tokio::test]
    async fn android_on_linux_stack_is_consistent() {
        let (_, contributions) = run("linux", "android").await;
        assert!(contributions.is_empty());
    }
}
