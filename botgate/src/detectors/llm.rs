// botgate/src/detectors/llm.rs
//
// LLM escalation — only reached when the composite waves left the request in
// the ambiguous band. The prompt carries the redacted fingerprint rendering:
// hashed signature, UA structure, path skeleton, derived flags. Raw UA and
// address never leave the process.
//
// Every failure mode (not ready, timeout, HTTP error, malformed verdict) is
// recovered as "no contribution".

use serde_json::json;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::llm::{parse_verdict, CompletionRequest};
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;
use crate::verdict::BotCategory;

const KIND: DetectorKind = DetectorKind::Llm;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    shared: &SharedState,
    config: &EngineConfig,
) -> Result<Vec<Contribution>, DetectorError> {
    if !config.llm.enabled {
        return Ok(Vec::new());
    }
    let provider = match shared.llm_provider() {
        Some(p) if p.is_ready() => p,
        _ => {
            debug!("llm escalation skipped: provider absent or not ready");
            return Ok(Vec::new());
        }
    };

    let request = CompletionRequest {
        prompt: render_prompt(ctx),
        temperature: config.llm.temperature,
        max_tokens: config.llm.max_tokens,
        timeout: std::time::Duration::from_millis(config.llm.timeout_ms),
    };

    let completion = match provider.complete(request).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "llm completion failed, continuing without");
            return Ok(Vec::new());
        }
    };

    let verdict = match parse_verdict(&completion) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "llm verdict unparseable, continuing without");
            return Ok(Vec::new());
        }
    };

    let sink = &ctx.sink;
    let name = KIND.name();
    sink.emit(name, "detection.llm.verdict", verdict.is_bot);
    sink.emit(name, "detection.llm.confidence", verdict.confidence);

    let raw = if verdict.is_bot {
        verdict.confidence
    } else {
        -verdict.confidence
    };
    let rationale = if verdict.reasoning.is_empty() {
        "llm classification".to_string()
    } else {
        verdict.reasoning.clone()
    };

    let mut contribution = Contribution::new(
        KIND,
        raw,
        manifest.weight("verdict", 0.7),
        verdict.confidence,
        rationale,
    )
    .with_signals(vec![
        "detection.llm.verdict".into(),
        "detection.llm.confidence".into(),
    ]);

    if verdict.is_bot {
        if let Some(ref kind) = verdict.bot_type {
            contribution = contribution.with_category(map_bot_type(kind));
        }
        if let Some(ref pattern) = verdict.pattern {
            if !pattern.trim().is_empty() {
                contribution = contribution.with_meta("bot_name", json!(pattern.trim()));
            }
        }
    }

    Ok(vec![contribution])
}

/// Redacted fingerprint rendering for the classification prompt.
fn render_prompt(ctx: &DetectionContext) -> String {
    let sink = &ctx.sink;
    let fp = &ctx.fingerprint;

    let ua_structure = {
        let browser = sink.str("detection.useragent.browser");
        let os = sink.str("detection.useragent.os");
        let category = sink.str("detection.useragent.category");
        format!(
            "category={} browser={} os={} length={} tokens={}",
            or_dash(&category),
            or_dash(&browser),
            or_dash(&os),
            fp.user_agent.len(),
            fp.user_agent.split_whitespace().count(),
        )
    };

    format!(
        "You classify HTTP request fingerprints as bot or human.\n\
         Request:\n\
         - signature: {sig}\n\
         - method: {method}\n\
         - path skeleton: {path}\n\
         - ua structure: {ua_structure}\n\
         - header count: {headers}, missing browser headers: {missing}, inconsistent: {inconsistent}\n\
         - datacenter ip: {datacenter}, vpn: {vpn}\n\
         - heuristic probability so far: {prob:.2}\n\
         Respond with ONLY a JSON object:\n\
         {{\"is_bot\": bool, \"confidence\": 0.0-1.0, \"bot_type\": \"string\", \"reasoning\": \"short\", \"pattern\": \"short name for this bot if any\"}}",
        sig = ctx.signature,
        method = fp.method,
        path = fp.path_skeleton(),
        headers = fp.headers.len(),
        missing = sink.int("detection.header.missing_count"),
        inconsistent = sink.bool("detection.header.inconsistent"),
        datacenter = sink.bool("request.ip.is_datacenter"),
        vpn = sink.bool("request.ip.is_vpn"),
        prob = sink.real("detection.aggregate.provisional_probability"),
    )
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

fn map_bot_type(kind: &str) -> BotCategory {
    let lower = kind.to_lowercase();
    if lower.contains("search") {
        BotCategory::SearchEngine
    } else if lower.contains("social") {
        BotCategory::SocialCrawler
    } else if lower.contains("scan") || lower.contains("exploit") {
        BotCategory::SecurityScanner
    } else if lower.contains("script") || lower.contains("http client") {
        BotCategory::ScriptingLibrary
    } else if lower.contains("monitor") || lower.contains("uptime") {
        BotCategory::Monitor
    } else if lower.contains("ai") || lower.contains("llm") || lower.contains("crawl") {
        BotCategory::AiCrawler
    } else if lower.contains("scrap") || lower.contains("headless") || lower.contains("automat") || lower.contains("bot") {
        BotCategory::Automation
    } else {
        BotCategory::Unknown
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, LlmProvider};

    /// Scripted provider for pipeline tests.
    pub struct MockProvider {
        pub response: Mutex<Result<String, LlmError>>,
        pub calls: std::sync::atomic::AtomicUsize,
    }

    impl MockProvider {
        pub fn returning(response: &str) -> Self {
            Self {
                response: Mutex::new(Ok(response.to_string())),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        pub fn failing(error: LlmError) -> Self {
            Self {
                response: Mutex::new(Err(error)),
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn initialise(&self) -> Result<(), LlmError> {
            Ok(())
        }

        fn is_ready(&self) -> bool {
            true
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            match &*self.response.lock() {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(clone_error(e)),
            }
        }
    }

    fn clone_error(e: &LlmError) -> LlmError {
        match e {
            LlmError::NotReady => LlmError::NotReady,
            LlmError::Timeout => LlmError::Timeout,
            LlmError::Transport(s) => LlmError::Transport(s.clone()),
            LlmError::Status(c) => LlmError::Status(*c),
            LlmError::Empty => LlmError::Empty,
            LlmError::Malformed(s) => LlmError::Malformed(s.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockProvider;
    use super::*;
    use crate::fingerprint::RequestFingerprint;
    use crate::registry::DetectorRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    async fn run(provider: Option<MockProvider>, enabled: bool) -> Vec<Contribution> {
        let registry = DetectorRegistry::embedded().unwrap();
        let manifest = registry.manifest("llm").unwrap().clone();
        let mut config = crate::config::EngineConfig::default();
        config.llm.enabled = enabled;
        let shared = SharedState::new(&config);
        if let Some(p) = provider {
            shared.set_llm_provider(Arc::new(p));
        }
        let ctx = DetectionContext::new(
            RequestFingerprint::synthetic("x", "/users/123"),
            "sig".into(),
            Duration::from_millis(15_000),
        );
        contribute(&ctx, &manifest, &shared, &config).await.unwrap()
    }

    #[tokio::test]
    async fn disabled_or_missing_provider_contributes_nothing() {
        assert!(run(None, true).await.is_empty());
        let provider = MockProvider::returning(r#"{"is_bot": true, "confidence": 0.9}"#);
        assert!(run(Some(provider), false).await.is_empty());
    }

    #[tokio::test]
    async fn bot_verdict_becomes_positive_contribution() {
        let provider = MockProvider::returning(
            r#"{"is_bot": true, "confidence": 0.8, "bot_type": "scraper", "reasoning": "datacenter + regular cadence", "pattern": "TickScraper"}"#,
        );
        let out = run(Some(provider), true).await;
        let c = &out[0];
        assert!((c.raw_score - 0.8).abs() < 1e-9);
        assert_eq!(c.category, Some(BotCategory::Automation));
        assert_eq!(c.meta.get("bot_name").unwrap(), "TickScraper");
        assert!(c.rationale.contains("cadence"));
    }

    #[tokio::test]
    async fn human_verdict_becomes_negative_contribution() {
        let provider = MockProvider::returning(r#"{"is_bot": false, "confidence": 0.6}"#);
        let out = run(Some(provider), true).await;
        assert!(out[0].raw_score < 0.0);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        for err in [
            crate::error::LlmError::Timeout,
            crate::error::LlmError::Status(500),
            crate::error::LlmError::Empty,
        ] {
            let out = run(Some(MockProvider::failing(err)), true).await;
            assert!(out.is_empty());
        }
        let garbage = MockProvider::returning("I think this might be a bot?");
        assert!(run(Some(garbage), true).await.is_empty());
    }

    #[test]
    fn prompt_never_contains_raw_ua_or_ip() {
        let mut fp = RequestFingerprint::synthetic(
            "Mozilla/5.0 (Windows NT 10.0) UniqueTokenXYZ",
            "/users/4821/orders",
        );
        fp.remote_addr = "198.51.100.77".parse().unwrap();
        let ctx = DetectionContext::new(fp, "sig".into(), Duration::from_millis(150));
        let prompt = render_prompt(&ctx);
        assert!(!prompt.contains("UniqueTokenXYZ"));
        assert!(!prompt.contains("198.51.100.77"));
        assert!(prompt.contains("/users/N/orders"));
    }

    #[test]
    fn bot_type_mapping_covers_common_labels() {
        assert_eq!(map_bot_type("web scraper"), BotCategory::Automation);
        assert_eq!(map_bot_type("search engine crawler"), BotCategory::SearchEngine);
        assert_eq!(map_bot_type("vulnerability scanner"), BotCategory::SecurityScanner);
        assert_eq!(map_bot_type("AI crawler"), BotCategory::AiCrawler);
        assert_eq!(map_bot_type("???"), BotCategory::Unknown);
    }
}
