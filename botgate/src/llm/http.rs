// botgate/src/llm/http.rs
//
// HTTP JSON completion provider. Shape-tolerant response handling: accepts
// completions under `choices[0].text`, `choices[0].message.content`,
// `completion` or `response`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::config::LlmSettings;
use crate::error::LlmError;
use crate::llm::{CompletionRequest, LlmProvider};

pub struct HttpCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    ready: AtomicBool,
}

impl HttpCompletionProvider {
    pub fn new(settings: &LlmSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            ready: AtomicBool::new(false),
        }
    }

    fn extract_text(body: &serde_json::Value) -> Option<String> {
        let candidates = [
            body.pointer("/choices/0/text"),
            body.pointer("/choices/0/message/content"),
            body.get("completion"),
            body.get("response"),
        ];
        candidates
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_string())
            .find(|s| !s.trim().is_empty())
    }
}

#[async_trait]
impl LlmProvider for HttpCompletionProvider {
    async fn initialise(&self) -> Result<(), LlmError> {
        // Reachability probe only; completion endpoints commonly reject GET,
        // so any response short of a server error counts as reachable.
        match self.client.get(&self.endpoint).send().await {
            Ok(resp) if resp.status().as_u16() < 500 => {
                self.ready.store(true, Ordering::Release);
                info!(endpoint = %self.endpoint, "llm provider ready");
                Ok(())
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "llm endpoint unhealthy");
                Err(LlmError::Status(resp.status().as_u16()))
            }
            Err(e) => {
                warn!(error = %e, "llm endpoint unreachable");
                Err(LlmError::Transport(e.to_string()))
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if !self.is_ready() {
            return Err(LlmError::NotReady);
        }

        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        });

        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&payload);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        Self::extract_text(&body).ok_or(LlmError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_known_completion_shapes() {
        let openai = json!({"choices": [{"text": "  {\"is_bot\": true}"}]});
        assert!(HttpCompletionProvider::extract_text(&openai).is_some());

        let chat = json!({"choices": [{"message": {"content": "{}"}}]});
        assert!(HttpCompletionProvider::extract_text(&chat).is_some());

        let flat = json!({"completion": "{}"});
        assert!(HttpCompletionProvider::extract_text(&flat).is_some());

        let blank = json!({"choices": [{"text": "   "}]});
        assert!(HttpCompletionProvider::extract_text(&blank).is_none());
    }

    #[test]
    fn not_ready_until_initialised() {
        let provider = HttpCompletionProvider::new(&LlmSettings::default());
        assert!(!provider.is_ready());
    }
}
