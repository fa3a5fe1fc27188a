// botgate/src/detectors/headers.rs
//
// Header presence and consistency analysis.
//
// Real browsers always send Accept, Accept-Language and Accept-Encoding, and
// Chromium ≥ 90 sends client hints (sec-ch-ua) plus sec-fetch-* metadata.
// A UA that claims Chrome but arrives without client hints is lying about
// something — the transport stack and the UA string disagree.

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Headers;

const REQUIRED_BROWSER_HEADERS: &[&str] = &["accept", "accept-language", "accept-encoding"];

const SEC_FETCH_HEADERS: &[&str] = &["sec-fetch-site", "sec-fetch-mode", "sec-fetch-dest"];

/// Chromium major from which client hints are unconditional.
const CLIENT_HINTS_MIN_MAJOR: u32 = 90;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let fp = &ctx.fingerprint;
    let sink = &ctx.sink;
    let name = KIND.name();

    let present: std::collections::HashSet<String> = fp.header_names().into_iter().collect();

    let missing: Vec<&str> = REQUIRED_BROWSER_HEADERS
        .iter()
        .filter(|h| !present.contains(**h))
        .copied()
        .collect();
    let has_client_hints = present.contains("sec-ch-ua");
    let sec_fetch_count = SEC_FETCH_HEADERS.iter().filter(|h| present.contains(**h)).count();

    // Same-wave cross-check, so the UA claim is parsed locally rather than
    // read from the blackboard.
    let ua_lower = fp.user_agent.to_lowercase();
    let claims_browser = ["mozilla", "chrome", "firefox", "safari", "edge"]
        .iter()
        .any(|b| ua_lower.contains(b));
    let claims_modern_chromium = chromium_major(&ua_lower)
        .map(|v| v >= CLIENT_HINTS_MIN_MAJOR)
        .unwrap_or(false);

    let inconsistent = claims_modern_chromium && !has_client_hints;

    sink.emit(name, "detection.header.missing_count", missing.len() as i64);
    sink.emit(name, "detection.header.inconsistent", inconsistent);
    sink.emit(name, "detection.header.client_hints", has_client_hints);

    let signals = vec![
        "detection.header.missing_count".into(),
        "detection.header.inconsistent".into(),
        "detection.header.client_hints".into(),
    ];

    let mut score = 0.0f64;
    let mut reasons: Vec<String> = Vec::new();

    if !missing.is_empty() {
        let step = manifest.param_f64("missing_step", 0.2);
        let cap = manifest.param_f64("missing_cap", 0.8);
        score += (step * missing.len() as f64).min(cap);
        reasons.push(format!("missing browser headers: {}", missing.join(", ")));
    }
    if inconsistent {
        score += manifest.param_f64("inconsistent_score", 0.5);
        reasons.push("claims modern Chromium without client hints".into());
    }

    if score > 0.0 {
        return Ok(vec![Contribution::bot(
            KIND,
            score.min(1.0),
            manifest.weight("analysis", 0.8),
            manifest.confidence("analysis", 0.8),
            reasons.join("; "),
        )
        .with_signals(signals)]);
    }

    // Everything a browser should send, from something claiming to be one.
    if claims_browser && missing.is_empty() && sec_fetch_count >= 2 {
        return Ok(vec![Contribution::human(
            KIND,
            manifest.param_f64("consistent_human_score", 0.4),
            manifest.weight("consistent", 1.0),
            manifest.confidence("consistent", 0.85),
            "complete and consistent browser header set",
        )
        .with_signals(signals)]);
    }

    Ok(Vec::new())
}

fn chromium_major(ua_lower: &str) -> Option<u32> {
    let marker = if ua_lower.contains("headlesschrome/") {
        "headlesschrome/"
    } else if ua_lower.contains("chrome/") {
        "chrome/"
    } else {
        return None;
    };
    let rest = &ua_lower[ua_lower.find(marker)? + marker.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
