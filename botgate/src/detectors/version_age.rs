// botgate/src/detectors/version_age.rs
//
// Stale claimed browser versions. Automation stacks pin a UA string and stop
// updating it; real browsers auto-update within weeks. A few majors behind is
// normal, double digits is not.
//
// TODO: refresh CURRENT_MAJOR alongside the UA pattern table when cutting a
// release (see user_agent.rs).

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::VersionAge;

const CURRENT_MAJOR: &[(&str, u32)] = &[
    ("chrome", 131),
    ("edge", 131),
    ("firefox", 133),
    ("safari", 18),
];

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let sink = &ctx.sink;
    let browser = sink.str("detection.useragent.browser");
    let claimed = sink.int("detection.useragent.major_version");
    if claimed <= 0 {
        return Ok(Vec::new());
    }

    let current = match CURRENT_MAJOR.iter().find(|(b, _)| *b == browser) {
        Some((_, v)) => *v as i64,
        None => return Ok(Vec::new()),
    };

    let lag = (current - claimed).max(0);
    sink.emit(KIND.name(), "detection.version.age_major", lag);

    let stale_lag = manifest.param_f64("stale_major_lag", 5.0) as i64;
    if lag <= stale_lag {
        return Ok(Vec::new());
    }

    let per_major = manifest.param_f64("score_per_major", 0.05);
    let cap = manifest.param_f64("score_cap", 0.5);
    let score = ((lag - stale_lag) as f64 * per_major).min(cap);

    Ok(vec![Contribution::bot(
        KIND,
        score,
        manifest.weight("stale", 0.6),
        manifest.confidence("stale", 0.6),
        format!("{browser} {claimed} is {lag} majors behind current"),
    )
    .with_signals(vec!["detection.version.age_major".into()])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::RequestFingerprint;
    use crate::registry::DetectorRegistry;
    use std::time::Duration;

    async fn run(browser: &str, major: i64) -> (DetectionContext, Vec<Contribution>) {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("version_age").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let ctx = DetectionContext::new(
            RequestFingerprint::synthetic("x", "/"),
            "sig".into(),
            Duration::from_millis(150),
        );
        ctx.sink.emit("user_agent", "detection.useragent.browser", browser);
        ctx.sink.emit("user_agent", "detection.useragent.major_version", major);
        ctx.sink.publish_wave();
        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        (ctx, out)
    }

    #[tokio::test]
    async fn recent_version_is_silent() {
        let (_, contributions) = run("chrome", 130).await;
        assert!(contributions.is_empty());
    }

    #[tokio::test]
    async fn ancient_version_scores_capped() {
        let (ctx, contributions) = run("chrome", 70).await;
        assert_eq!(ctx.sink.int("detection.version.age_major"), 61);
        let c = &contributions[0];
        assert!((c.raw_score - 0.5).abs() < 1e-9, "cap applies");
    }

    #[tokio::test]
    async fn unknown_browser_is_silent() {
        let (_, contributions) = run("netscape", 4).await;
        assert!(contributions.is_empty());
    }

    #[tokio::test]
    async fn future_version_not_negative() {
        let (ctx, contributions) = run("chrome", 140).await;
        assert_eq!(ctx.sink.int("detection.version.age_major"), 0);
        assert!(contributions.is_empty());
    }
}
