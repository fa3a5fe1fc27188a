// botgate/src/detectors/security_tool.rs
//
// Scanner and exploit-probe matching over UA and path.
// Aho-Corasick automata, same discipline as the UA table. Any hit is a
// strong positive — nothing legitimate requests /.env.

use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;
use crate::verdict::BotCategory;

const KIND: DetectorKind = DetectorKind::SecurityTool;

const SCANNER_UA: &[&str] = &[
    "nikto", "sqlmap", "nmap", "masscan", "zgrab", "nuclei", "dirbuster", "gobuster",
    "wpscan", "acunetix", "nessus", "openvas", "burpsuite", "whatweb", "wfuzz", "ffuf",
];

const PROBE_PATHS: &[&str] = &[
    "/.env",
    "/.git",
    "/.aws/credentials",
    "/wp-admin",
    "/wp-login.php",
    "/phpmyadmin",
    "/xmlrpc.php",
    "/cgi-bin/",
    "/vendor/phpunit",
    "/actuator/env",
    "/actuator/health",
    "/etc/passwd",
    "/../",
    "%2e%2e%2f",
    "/manager/html",
    "/solr/admin",
    "/jmx-console",
    "/console/login",
    "/owa/auth",
    "jndi:ldap",
    "union select",
    "<script>",
];

static UA_AC: OnceLock<AhoCorasick> = OnceLock::new();
static PATH_AC: OnceLock<AhoCorasick> = OnceLock::new();

fn ua_automaton() -> &'static AhoCorasick {
    UA_AC.get_or_init(|| {
        AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(SCANNER_UA)
            .expect("static scanner patterns compile")
    })
}

fn path_automaton() -> &'static AhoCorasick {
    PATH_AC.get_or_init(|| {
        AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(PROBE_PATHS)
            .expect("static probe patterns compile")
    })
}

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let fp = &ctx.fingerprint;
    let sink = &ctx.sink;
    let name = KIND.name();

    let ua_hit = ua_automaton()
        .find(&fp.user_agent)
        .map(|m| SCANNER_UA[m.pattern().as_usize()]);
    let path_hit = path_automaton()
        .find(&fp.path)
        .map(|m| PROBE_PATHS[m.pattern().as_usize()]);

    let matched = ua_hit.is_some() || path_hit.is_some();
    sink.emit(name, "detection.sectool.matched", matched);

    if !matched {
        return Ok(Vec::new());
    }

    let kind = match (ua_hit, path_hit) {
        (Some(_), Some(_)) => "scanner_ua_and_probe_path",
        (Some(_), None) => "scanner_ua",
        _ => "probe_path",
    };
    sink.emit(name, "detection.sectool.kind", kind);

    let rationale = match (ua_hit, path_hit) {
        (Some(ua), Some(path)) => format!("scanner UA `{ua}` probing `{path}`"),
        (Some(ua), None) => format!("scanner UA `{ua}`"),
        (None, Some(path)) => format!("exploit probe path `{path}`"),
        (None, None) => unreachable!(),
    };

    Ok(vec![Contribution::bot(
        KIND,
        1.0,
        manifest.weight("probe", 1.5),
        manifest.confidence("probe", 0.95),
        rationale,
    )
    .with_category(BotCategory::SecurityScanner)
    .with_signals(vec![
        "detection.sectool.matched".into(),
        "detection.sectool.kind".into(),
    ])])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::RequestFingerprint;
    use crate::registry::DetectorRegistry;
    use std::time::Duration;

    async fn run(ua: &str, path: &str) -> (DetectionContext, Vec<Contribution>) {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("security_tool").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let ctx = DetectionContext::new(
            RequestFingerprint::synthetic(ua, path),
            "sig".into(),
            Duration::from_millis(150),
        );
        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        (ctx, out)
    }

    #[tokio::test]
    async fn scanner_ua_is_strong_positive() {
        let (ctx, contributions) = run("Mozilla/5.00 (Nikto/2.1.6)", "/").await;
        assert!(ctx.sink.bool("detection.sectool.matched"));
        assert_eq!(contributions[0].category, Some(BotCategory::SecurityScanner));
        assert!(contributions[0].weighted_score >= 1.4);
    }

    #[tokio::test]
    async fn env_probe_matches_on_path_alone() {
        let (ctx, contributions) = run("Mozilla/5.0 Chrome/120.0", "/.env").await;
        assert_eq!(ctx.sink.str("detection.sectool.kind"), "probe_path");
        assert!(!contributions.is_empty());
    }

    #[tokio::test]
    async fn clean_request_stays_silent() {
        let (ctx, contributions) = run("Mozilla/5.0 Chrome/120.0", "/pricing").await;
        assert!(!ctx.sink.bool("detection.sectool.matched"));
        assert!(contributions.is_empty());
    }
}
