// botgate/src/llm/mod.rs
//
// LLM escalation client: provider trait, structured-verdict parsing.
// The provider is only touched on the hot path through `complete`; everything
// else happens at startup.

pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::LlmError;

pub use http::HttpCompletionProvider;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn initialise(&self) -> Result<(), LlmError>;
    fn is_ready(&self) -> bool;
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

// ── Verdict parsing ───────────────────────────────────────────────────────────

/// Structured classification the model is asked to return.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmVerdict {
    pub is_bot: bool,
    pub confidence: f64,
    #[serde(default)]
    pub bot_type: Option<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Parse a completion into a verdict. Tolerates chat-style wrapping: code
/// fences are stripped and the outermost `{…}` substring is extracted before
/// parsing. Confidence outside [0,1] is malformed.
pub fn parse_verdict(raw: &str) -> Result<LlmVerdict, LlmError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LlmError::Empty);
    }

    let without_fences: String = trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let start = without_fences
        .find('{')
        .ok_or_else(|| LlmError::Malformed("no JSON object".into()))?;
    let end = without_fences
        .rfind('}')
        .filter(|&e| e > start)
        .ok_or_else(|| LlmError::Malformed("unterminated JSON object".into()))?;

    let verdict: LlmVerdict = serde_json::from_str(&without_fences[start..=end])
        .map_err(|e| LlmError::Malformed(e.to_string()))?;

    if !(0.0..=1.0).contains(&verdict.confidence) {
        return Err(LlmError::Malformed(format!(
            "confidence {} out of range",
            verdict.confidence
        )));
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let v = parse_verdict(r#"{"is_bot": true, "confidence": 0.8, "bot_type": "scraper", "reasoning": "datacenter + headless"}"#).unwrap();
        assert!(v.is_bot);
        assert_eq!(v.confidence, 0.8);
        assert_eq!(v.bot_type.as_deref(), Some("scraper"));
    }

    #[test]
    fn strips_code_fences_and_prose() {
        let raw = "Here is my analysis:\n```json\n{\"is_bot\": false, \"confidence\": 0.4}\n```\nHope this helps.";
        let v = parse_verdict(raw).unwrap();
        assert!(!v.is_bot);
        assert_eq!(v.confidence, 0.4);
    }

    #[test]
    fn rejects_empty_and_braceless() {
        assert!(matches!(parse_verdict("   "), Err(LlmError::Empty)));
        assert!(matches!(parse_verdict("no json here"), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let raw = r#"{"is_bot": true, "confidence": 1.5}"#;
        assert!(matches!(parse_verdict(raw), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn missing_optional_fields_default() {
        let v = parse_verdict(r#"{"is_bot": true, "confidence": 1.0}"#).unwrap();
        assert!(v.bot_type.is_none());
        assert!(v.reasoning.is_empty());
        assert!(v.pattern.is_none());
    }
}
