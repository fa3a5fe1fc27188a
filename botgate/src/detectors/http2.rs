// botgate/src/detectors/http2.rs
//
// HTTP/2 SETTINGS fingerprinting. Browsers ship distinctive SETTINGS frames
// (identifiers, values, order); HTTP libraries ship their own. The frame is
// emitted by the transport library, not the page, so it survives UA spoofing.

use sha2::{Digest, Sha256};

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Http2;

// settings_fingerprint() renderings of mainstream client stacks
const BROWSER_H2: &[(&str, &str)] = &[
    ("1:65536;2:0;3:1000;4:6291456;6:262144|wu:15663105", "chrome"),
    ("1:65536;2:0;4:131072;5:16384|wu:12517377", "firefox"),
    ("2:0;3:100;4:2097152;8:1;9:1|wu:10420225", "safari"),
];

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let h2 = match ctx.fingerprint.h2.as_ref() {
        Some(h2) => h2,
        None => return Ok(Vec::new()),
    };
    let sink = &ctx.sink;
    let name = KIND.name();

    let fingerprint = h2.settings_fingerprint();
    if fingerprint.is_empty() {
        return Ok(Vec::new());
    }

    let known = BROWSER_H2
        .iter()
        .find(|(fp, _)| *fp == fingerprint)
        .map(|(_, client)| *client);

    sink.emit(name, "detection.h2.known_browser", known.is_some());
    sink.emit(name, "detection.h2.fingerprint", digest8(&fingerprint));

    let signals = vec![
        "detection.h2.known_browser".into(),
        "detection.h2.fingerprint".into(),
    ];

    let claimed_browser = sink.str("detection.useragent.browser");

    if let Some(client) = known {
        if !claimed_browser.is_empty() {
            return Ok(vec![Contribution::human(
                KIND,
                manifest.param_f64("known_browser_human_score", 0.3),
                manifest.weight("match", 0.7),
                manifest.confidence("match", 0.7),
                format!("{client} HTTP/2 SETTINGS profile"),
            )
            .with_signals(signals)]);
        }
        return Ok(Vec::new());
    }

    if !claimed_browser.is_empty() {
        return Ok(vec![Contribution::bot(
            KIND,
            manifest.param_f64("unknown_score", 0.2),
            manifest.weight("match", 0.7),
            manifest.confidence("match", 0.7),
            "browser UA with an unrecognised HTTP/2 SETTINGS profile",
        )
        .with_signals(signals)]);
    }

    Ok(Vec::new())
}

fn digest8(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
