// botgate/src/detectors/inconsistency.rs
//
// Cross-checks wave-0 outputs. Individually weak observations become strong
// when they disagree: a datacenter address claiming to be desktop Chrome
// without client hints is not a person on a laptop.

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Inconsistency;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let sink = &ctx.sink;

    let datacenter = sink.bool("request.ip.is_datacenter");
    let ua_present = sink.bool("request.ua.present");
    let browser = sink.str("detection.useragent.browser");
    let headless = sink.real("detection.useragent.headless_likelihood");
    let client_hints = sink.bool("detection.header.client_hints");
    let missing = sink.int("detection.header.missing_count");

    let mut score = 0.0f64;
    let mut reasons: Vec<&str> = Vec::new();

    if datacenter && !ua_present {
        score += manifest.param_f64("absent_ua_datacenter_score", 0.5);
        reasons.push("no user agent from datacenter address");
    }
    if datacenter && browser == "chrome" && !client_hints && headless < 0.5 {
        score += manifest.param_f64("datacenter_browser_score", 0.6);
        reasons.push("datacenter address claiming desktop Chrome without client hints");
    }
    if datacenter && headless >= 0.5 {
        score += manifest.param_f64("headless_datacenter_score", 0.35);
        reasons.push("headless browser from datacenter address");
    }
    if !browser.is_empty() && missing >= 2 {
        score += manifest.param_f64("missing_hints_score", 0.4);
        reasons.push("browser claim without the headers browsers send");
    }

    let score = score.min(1.0);
    sink.emit(KIND.name(), "detection.inconsistency.score", score);

    if score == 0.0 {
        return Ok(Vec::new());
    }

    Ok(vec![Contribution::bot(
        KIND,
        score,
        manifest.weight("cross", 1.0),
        manifest.confidence("cross", 0.85),
        reasons.join("; "),
    )
    .with_signals(vec!["detection.inconsistency.score".into()])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::RequestFingerprint;
    use crate::registry::DetectorRegistry;
    use std::time::Duration;

    struct Setup {
        datacenter: bool,
        browser: Option<&'static str>,
        headless: f64,
        client_hints: bool,
        missing: i64,
        ua_present: bool,
    }

    async fn run(setup: Setup) -> (DetectionContext, Vec<Contribution>) {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("inconsistency").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let ua = if setup.ua_present { "x" } else { "" };
        let ctx = DetectionContext::new(
            RequestFingerprint::synthetic(ua, "/"),
            "sig".into(),
            Duration::from_millis(150),
        );
        // Simulated wave-0 signal state.
        ctx.sink.emit("ip", "request.ip.is_datacenter", setup.datacenter);
        if let Some(b) = setup.browser {
            ctx.sink.emit("user_agent", "detection.useragent.browser", b);
        }
        ctx.sink
            .emit("user_agent", "detection.useragent.headless_likelihood", setup.headless);
        ctx.sink.emit("headers", "detection.header.client_hints", setup.client_hints);
        ctx.sink.emit("headers", "detection.header.missing_count", setup.missing);
        ctx.sink.publish_wave();

        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        (ctx, out)
    }

    #[tokio::test]
    async fn datacenter_chrome_without_hints_scores_high() {
        let (ctx, contributions) = run(Setup {
            datacenter: true,
            browser: Some("chrome"),
            headless: 0.0,
            client_hints: false,
            missing: 2,
            ua_present: true,
        })
        .await;
        assert!(ctx.sink.real("detection.inconsistency.score") >= 0.6);
        assert!(contributions[0].weighted_score >= 0.6);
    }

    #[tokio::test]
    async fn consistent_browser_stays_silent() {
        let (ctx, contributions) = run(Setup {
            datacenter: false,
            browser: Some("chrome"),
            headless: 0.0,
            client_hints: true,
            missing: 0,
            ua_present: true,
        })
        .await;
        assert_eq!(ctx.sink.real("detection.inconsistency.score"), 0.0);
        assert!(contributions.is_empty());
    }

    #[tokio::test]
    async fn headless_from_datacenter_combines() {
        let (_, contributions) = run(Setup {
            datacenter: true,
            browser: Some("chrome"),
            headless: 0.9,
            client_hints: false,
            missing: 2,
            ua_present: true,
        })
        .await;
        let c = &contributions[0];
        // headless + missing-headers rules, not the desktop-chrome rule
        assert!(c.rationale.contains("headless"));
        assert!(!c.rationale.contains("desktop Chrome"));
    }
}
