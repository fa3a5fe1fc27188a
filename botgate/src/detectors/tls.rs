// botgate/src/detectors/tls.rs
//
// TLS fingerprint correlation — JA3 / JA4 digest lookup.
//
// A UA string is one memcpy away from anything; the cipher suites a client
// library negotiates are not. A python-requests JA3 under a Chrome UA is a
// contradiction no header spoofing can repair.

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;
use crate::verdict::BotCategory;

const KIND: DetectorKind = DetectorKind::Tls;

// Known script-client JA3 digests (TLS ClientHello fingerprints)
const SCRIPT_JA3: &[(&str, &str)] = &[
    ("3b5074b1b5d032e5620f69f9159a2749", "python-requests"),
    ("6734f37431670b3ab4292b8f60f29984", "python-requests"),
    ("b32309a26951912be7dba376398abc3b", "curl"),
    ("a0e9f5d64349fb13191bc781f81f42e1", "curl"),
    ("66918128f1b9b03303d77c6f2ead419b", "go-http-client"),
    ("d7b2b1e8c9a7f6e5d4c3b2a19f8e7d6c", "python-httpx"),
];

// Known browser JA3 digests
const BROWSER_JA3: &[&str] = &[
    "cd08e31494f9531f560d64c695473da9", // Chrome 120
    "b64f9d5a40cce26a6deaa70ef2d7cd5c", // Chrome 119
    "773906b0efdefa24a7f2b8eb6985bf37", // Firefox 120
    "37f463bf4616ecd445d4a1937da06e19", // Safari 17
];

// JA4 client prefixes (protocol + SNI + cipher count block)
const BROWSER_JA4_PREFIXES: &[&str] = &["t13d1516h2", "t13d1715h2"];
const SCRIPT_JA4_PREFIXES: &[&str] = &["t13d311000", "t12d190900"];

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let tls = match ctx.fingerprint.tls.as_ref() {
        Some(tls) => tls,
        None => return Ok(Vec::new()),
    };
    let sink = &ctx.sink;
    let name = KIND.name();

    let ja3_script = tls.ja3.as_deref().and_then(|d| {
        SCRIPT_JA3
            .iter()
            .find(|(digest, _)| *digest == d)
            .map(|(_, client)| *client)
    });
    let ja3_browser = tls
        .ja3
        .as_deref()
        .map(|d| BROWSER_JA3.contains(&d))
        .unwrap_or(false);

    let ja4_script = tls
        .ja4
        .as_deref()
        .map(|d| SCRIPT_JA4_PREFIXES.iter().any(|p| d.starts_with(p)))
        .unwrap_or(false);
    let ja4_browser = tls
        .ja4
        .as_deref()
        .map(|d| BROWSER_JA4_PREFIXES.iter().any(|p| d.starts_with(p)))
        .unwrap_or(false);

    let script_client = ja3_script.is_some() || ja4_script;
    let browser_client = ja3_browser || ja4_browser;

    let category = if script_client {
        "script"
    } else if browser_client {
        "browser"
    } else {
        "unknown"
    };
    sink.emit(name, "detection.tls.category", category);
    sink.emit(name, "detection.tls.known_client", script_client || browser_client);

    let signals = vec![
        "detection.tls.category".into(),
        "detection.tls.known_client".into(),
    ];

    // UA claim parsed in wave 0.
    let ua_claims_browser = !sink.str("detection.useragent.browser").is_empty();

    if script_client {
        let client = ja3_script.unwrap_or("scripted client");
        if ua_claims_browser {
            return Ok(vec![Contribution::bot(
                KIND,
                manifest.param_f64("mismatch_score", 0.8),
                manifest.weight("mismatch", 1.2),
                manifest.confidence("mismatch", 0.9),
                format!("browser UA over a {client} TLS handshake"),
            )
            .with_category(BotCategory::Automation)
            .with_signals(signals)]);
        }
        return Ok(vec![Contribution::bot(
            KIND,
            manifest.param_f64("script_score", 0.6),
            manifest.weight("match", 1.0),
            manifest.confidence("match", 0.85),
            format!("{client} TLS fingerprint"),
        )
        .with_category(BotCategory::ScriptingLibrary)
        .with_signals(signals)]);
    }

    if browser_client && ua_claims_browser {
        return Ok(vec![Contribution::human(
            KIND,
            manifest.param_f64("browser_human_score", 0.3),
            manifest.weight("match", 1.0),
            manifest.confidence("match", 0.85),
            "browser TLS fingerprint consistent with UA claim",
        )
        .with_signals(signals)]);
    }

    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{RequestFingerprint, TlsMetadata};
    use crate::registry::DetectorRegistry;
    use std::time::Duration;

    async fn run(
        ja3: Option<&str>,
        ua_browser: Option<&str>,
    ) -> (DetectionContext, Vec<Contribution>) {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("tls").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let mut fp = RequestFingerprint::synthetic("x", "/");
        fp.tls = Some(TlsMetadata {
            protocol: "TLSv1.3".into(),
            cipher_suite: "TLS_AES_128_GCM_SHA256".into(),
            ja3: ja3.map(str::to_string),
            ja4: None,
        });
        let ctx = DetectionContext::new(fp, "sig".into(), Duration::from_millis(150));
        if let Some(b) = ua_browser {
            ctx.sink.emit("user_agent", "detection.useragent.browser", b);
        }
        ctx.sink.publish_wave();
        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        (ctx, out)
    }

    #[tokio::test]
    async fn script_ja3_under_browser_ua_is_strong_mismatch() {
        let (ctx, contributions) =
            run(Some("b32309a26951912be7dba376398abc3b"), Some("chrome")).await;
        assert_eq!(ctx.sink.str("detection.tls.category"), "script");
        assert!(contributions[0].weighted_score > 0.9);
        assert!(contributions[0].rationale.contains("curl"));
    }

    #[tokio::test]
    async fn script_ja3_without_browser_claim_is_moderate() {
        let (_, contributions) = run(Some("b32309a26951912be7dba376398abc3b"), None).await;
        assert!(contributions[0].weighted_score < 0.9);
        assert_eq!(contributions[0].category, Some(BotCategory::ScriptingLibrary));
    }

    #[tokio::test]
    async fn browser_ja3_with_browser_ua_leans_human() {
        let (_, contributions) =
            run(Some("cd08e31494f9531f560d64c695473da9"), Some("chrome")).await;
        assert!(contributions[0].weighted_score < 0.0);
    }

    #[tokio::test]
    async fn unknown_digest_emits_signal_only() {
        let (ctx, contributions) = run(Some("ffffffffffffffffffffffffffffffff"), None).await;
        assert_eq!(ctx.sink.str("detection.tls.category"), "unknown");
        assert!(contributions.is_empty());
    }
}
