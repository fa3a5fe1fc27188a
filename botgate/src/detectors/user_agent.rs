// botgate/src/detectors/user_agent.rs
//
// User-agent classification against a curated pattern table.
// Aho-Corasick automaton: O(n) per UA regardless of pattern count.
//
// An empty UA is itself a high-confidence bot signal — every mainstream
// browser and every well-behaved crawler sends one. When several patterns
// match, the highest-scoring entry wins (a scanner string buried inside a
// Mozilla prefix still classifies as a scanner).

use std::sync::OnceLock;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;
use crate::verdict::BotCategory;

const KIND: DetectorKind = DetectorKind::UserAgent;

// Pattern → (category, bot score, confidence, headless likelihood)
const UA_TABLE: &[(&str, BotCategory, f64, f64, f64)] = &[
    // Search engines
    ("googlebot", BotCategory::SearchEngine, 0.90, 0.95, 0.0),
    ("bingbot", BotCategory::SearchEngine, 0.90, 0.95, 0.0),
    ("duckduckbot", BotCategory::SearchEngine, 0.90, 0.90, 0.0),
    ("baiduspider", BotCategory::SearchEngine, 0.90, 0.90, 0.0),
    ("yandexbot", BotCategory::SearchEngine, 0.90, 0.90, 0.0),
    ("applebot", BotCategory::SearchEngine, 0.90, 0.90, 0.0),
    // Social preview crawlers
    ("facebookexternalhit", BotCategory::SocialCrawler, 0.85, 0.90, 0.0),
    ("twitterbot", BotCategory::SocialCrawler, 0.85, 0.90, 0.0),
    ("linkedinbot", BotCategory::SocialCrawler, 0.85, 0.90, 0.0),
    ("slackbot", BotCategory::SocialCrawler, 0.85, 0.90, 0.0),
    ("discordbot", BotCategory::SocialCrawler, 0.85, 0.90, 0.0),
    ("telegrambot", BotCategory::SocialCrawler, 0.85, 0.90, 0.0),
    ("whatsapp", BotCategory::SocialCrawler, 0.80, 0.85, 0.0),
    ("pinterestbot", BotCategory::SocialCrawler, 0.85, 0.90, 0.0),
    // AI crawlers
    ("gptbot", BotCategory::AiCrawler, 0.85, 0.90, 0.0),
    ("claudebot", BotCategory::AiCrawler, 0.85, 0.90, 0.0),
    ("anthropic-ai", BotCategory::AiCrawler, 0.85, 0.90, 0.0),
    ("ccbot", BotCategory::AiCrawler, 0.85, 0.90, 0.0),
    ("google-extended", BotCategory::AiCrawler, 0.85, 0.90, 0.0),
    ("perplexitybot", BotCategory::AiCrawler, 0.85, 0.90, 0.0),
    ("bytespider", BotCategory::AiCrawler, 0.85, 0.85, 0.0),
    ("meta-externalagent", BotCategory::AiCrawler, 0.85, 0.85, 0.0),
    // Browser automation
    ("headlesschrome", BotCategory::Automation, 0.50, 0.90, 0.9),
    ("phantomjs", BotCategory::Automation, 0.60, 0.90, 0.9),
    ("selenium", BotCategory::Automation, 0.55, 0.85, 0.8),
    ("puppeteer", BotCategory::Automation, 0.55, 0.85, 0.8),
    ("playwright", BotCategory::Automation, 0.55, 0.85, 0.8),
    ("webdriver", BotCategory::Automation, 0.55, 0.85, 0.8),
    // Scripting libraries
    ("python-requests", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("python-urllib", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("aiohttp", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("httpx", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("curl/", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("wget/", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("go-http-client", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("okhttp", BotCategory::ScriptingLibrary, 0.70, 0.85, 0.0),
    ("apache-httpclient", BotCategory::ScriptingLibrary, 0.70, 0.85, 0.0),
    ("libwww-perl", BotCategory::ScriptingLibrary, 0.75, 0.90, 0.0),
    ("node-fetch", BotCategory::ScriptingLibrary, 0.70, 0.85, 0.0),
    ("axios/", BotCategory::ScriptingLibrary, 0.70, 0.85, 0.0),
    ("guzzlehttp", BotCategory::ScriptingLibrary, 0.70, 0.85, 0.0),
    ("java/", BotCategory::ScriptingLibrary, 0.70, 0.80, 0.0),
    // Security scanners
    ("nikto", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("sqlmap", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("nmap", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("masscan", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("zgrab", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("nuclei", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("gobuster", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("wpscan", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("acunetix", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("nessus", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    ("openvas", BotCategory::SecurityScanner, 0.95, 0.95, 0.0),
    // Uptime monitors
    ("uptimerobot", BotCategory::Monitor, 0.70, 0.90, 0.0),
    ("pingdom", BotCategory::Monitor, 0.70, 0.90, 0.0),
    ("statuscake", BotCategory::Monitor, 0.70, 0.90, 0.0),
    ("site24x7", BotCategory::Monitor, 0.70, 0.85, 0.0),
];

static UA_AC: OnceLock<AhoCorasick> = OnceLock::new();

fn automaton() -> &'static AhoCorasick {
    UA_AC.get_or_init(|| {
        AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(UA_TABLE.iter().map(|(p, ..)| *p))
            .expect("static UA patterns compile")
    })
}

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    _shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let ua = ctx.fingerprint.user_agent.trim();
    let sink = &ctx.sink;
    let name = KIND.name();

    // Empty UA short-circuits everything else.
    if ua.is_empty() {
        sink.emit(name, "detection.useragent.category", BotCategory::Unknown.to_string());
        sink.emit(name, "detection.useragent.confidence", manifest.confidence("empty_ua", 0.9));
        sink.emit(name, "detection.useragent.headless_likelihood", 0.0f64);
        let contribution = Contribution::bot(
            KIND,
            manifest.param_f64("empty_ua_score", 0.9),
            manifest.weight("empty_ua", 1.3),
            manifest.confidence("empty_ua", 0.9),
            "empty user agent",
        )
        .with_category(BotCategory::Unknown)
        .with_signals(vec![
            "detection.useragent.category".into(),
            "detection.useragent.confidence".into(),
        ]);
        return Ok(vec![contribution]);
    }

    // Structural parse always runs — version_age and correlation consume it.
    let browser = browser_family(ua);
    let os = os_claim(ua);
    let major = browser.and_then(|b| major_version(ua, b));

    if let Some(b) = browser {
        sink.emit(name, "detection.useragent.browser", b);
    }
    if let Some(o) = os {
        sink.emit(name, "detection.useragent.os", o);
    }
    if let Some(v) = major {
        sink.emit(name, "detection.useragent.major_version", v as i64);
    }

    // Best table match wins.
    let matched = automaton()
        .find_iter(ua)
        .map(|m| &UA_TABLE[m.pattern().as_usize()])
        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(&(pattern, category, score, confidence, headless)) = matched {
        sink.emit(name, "detection.useragent.category", category.to_string());
        sink.emit(name, "detection.useragent.confidence", manifest.confidence("match", confidence));
        sink.emit(name, "detection.useragent.headless_likelihood", headless);
        let contribution = Contribution::bot(
            KIND,
            score,
            manifest.weight("match", 1.0),
            manifest.confidence("match", confidence),
            format!("user agent matched `{pattern}`"),
        )
        .with_category(category)
        .with_signals(vec![
            "detection.useragent.category".into(),
            "detection.useragent.confidence".into(),
            "detection.useragent.headless_likelihood".into(),
        ]);
        return Ok(vec![contribution]);
    }

    sink.emit(name, "detection.useragent.headless_likelihood", 0.0f64);

    // No table hit but a parseable browser: mild human evidence.
    if let Some(b) = browser {
        sink.emit(name, "detection.useragent.category", "browser");
        sink.emit(name, "detection.useragent.confidence", manifest.confidence("browser", 0.8));
        let contribution = Contribution::human(
            KIND,
            manifest.param_f64("browser_human_score", 0.5),
            manifest.weight("browser", 1.0),
            manifest.confidence("browser", 0.8),
            format!("well-formed {b} user agent"),
        );
        return Ok(vec![contribution]);
    }

    // Unrecognised non-browser string: weakly bot-leaning.
    sink.emit(name, "detection.useragent.category", BotCategory::Unknown.to_string());
    sink.emit(name, "detection.useragent.confidence", manifest.confidence("unknown", 0.3));
    Ok(vec![Contribution::bot(
        KIND,
        0.15,
        manifest.weight("match", 1.0),
        manifest.confidence("unknown", 0.3),
        "unrecognised non-browser user agent",
    )
    .with_category(BotCategory::Unknown)])
}

// ── Structural UA parsing ─────────────────────────────────────────────────────

fn browser_family(ua: &str) -> Option<&'static str> {
    let lower = ua.to_lowercase();
    if lower.contains("edg/") || lower.contains("edge/") {
        Some("edge")
    } else if lower.contains("chrome/") || lower.contains("crios/") {
        Some("chrome")
    } else if lower.contains("firefox/") || lower.contains("fxios/") {
        Some("firefox")
    } else if lower.contains("safari/") && lower.contains("version/") {
        Some("safari")
    } else {
        None
    }
}

fn os_claim(ua: &str) -> Option<&'static str> {
    let lower = ua.to_lowercase();
    if lower.contains("android") {
        Some("android")
    } else if lower.contains("iphone os") || lower.contains("ipad") || lower.contains("like mac os x") {
        Some("ios")
    } else if lower.contains("windows nt") {
        Some("windows")
    } else if lower.contains("mac os x") || lower.contains("macintosh") {
        Some("macos")
    } else if lower.contains("linux") {
        Some("linux")
    } else {
        None
    }
}

fn major_version(ua: &str, browser: &str) -> Option<u32> {
    let lower = ua.to_lowercase();
    let marker = match browser {
        "chrome" => "chrome/",
        "firefox" => "firefox/",
        "edge" => "edg/",
        "safari" => "version/",
        _ => return None,
    };
    let rest = &lower[lower.find(marker)? + marker.len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::RequestFingerprint;
    use crate::registry::DetectorRegistry;
    use std::time::Duration;

    const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    async fn run(ua: &str) -> (DetectionContext, Vec<Contribution>) {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("user_agent").unwrap().clone();
        let shared = SharedState::new(&crate::config::EngineConfig::default());
        let ctx = DetectionContext::new(
            RequestFingerprint::synthetic(ua, "/"),
            "sig".into(),
            Duration::from_millis(150),
        );
        let out = contribute(&ctx, &manifest, &shared).await.unwrap();
        ctx.sink.publish_wave();
        (ctx, out)
    }

    #[tokio::test]
    async fn empty_ua_is_high_confidence_bot() {
        let (_, contributions) = run("").await;
        assert_eq!(contributions.len(), 1);
        let c = &contributions[0];
        assert!(c.raw_score >= 0.85);
        assert!(c.confidence >= 0.85);
        assert!(c.weighted_score > 1.0);
    }

    #[tokio::test]
    async fn googlebot_classifies_as_search_engine() {
        let (ctx, contributions) =
            run("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)").await;
        assert_eq!(contributions[0].category, Some(BotCategory::SearchEngine));
        assert_eq!(ctx.sink.str("detection.useragent.category"), "search_engine");
    }

    #[tokio::test]
    async fn chrome_is_human_leaning_with_structure_signals() {
        let (ctx, contributions) = run(CHROME_UA).await;
        assert!(contributions[0].weighted_score < 0.0);
        assert_eq!(ctx.sink.str("detection.useragent.browser"), "chrome");
        assert_eq!(ctx.sink.str("detection.useragent.os"), "windows");
        assert_eq!(ctx.sink.int("detection.useragent.major_version"), 120);
    }

    #[tokio::test]
    async fn headless_chrome_is_automation_with_high_headless_likelihood() {
        let (ctx, contributions) = run(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) HeadlessChrome/120.0.0.0 Safari/537.36",
        )
        .await;
        assert_eq!(contributions[0].category, Some(BotCategory::Automation));
        assert!(ctx.sink.real("detection.useragent.headless_likelihood") > 0.8);
    }

    #[tokio::test]
    async fn scanner_outranks_browser_tokens() {
        let (_, contributions) = run("Mozilla/5.00 (Nikto/2.1.6) (Evasions:None) (Test:Port Check)").await;
        assert_eq!(contributions[0].category, Some(BotCategory::SecurityScanner));
    }

    #[tokio::test]
    async fn determinism_identical_inputs_identical_contributions() {
        let (_, a) = run(CHROME_UA).await;
        let (_, b) = run(CHROME_UA).await;
        assert_eq!(a[0].raw_score, b[0].raw_score);
        assert_eq!(a[0].weighted_score, b[0].weighted_score);
        assert_eq!(a[0].rationale, b[0].rationale);
    }
}
