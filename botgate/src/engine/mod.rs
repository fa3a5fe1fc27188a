// botgate/src/engine/mod.rs
//
// The engine façade: configuration + registry + shared state, exposing one
// hot-path operation — evaluate(fingerprint) → aggregated evidence.
//
// evaluate never fails. Detector trouble is absorbed by the orchestrator;
// anything catastrophic below it is trapped at a task boundary and turned
// into a fail-open verdict.

pub mod aggregate;
pub mod orchestrator;
pub mod policy;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::context::{DetectionContext, PipelineState};
use crate::error::ConfigError;
use crate::fingerprint::RequestFingerprint;
use crate::llm::{HttpCompletionProvider, LlmProvider};
use crate::registry::DetectorRegistry;
use crate::signature::primary_signature;
use crate::state::{features, window::path_token, SharedState};
use crate::verdict::AggregatedEvidence;

use policy::PolicyRegistry;

pub struct Engine {
    config: Arc<EngineConfig>,
    registry: DetectorRegistry,
    shared: Arc<SharedState>,
    policies: PolicyRegistry,
    secret: Vec<u8>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = DetectorRegistry::build(&config)?;
        let shared = Arc::new(SharedState::new(&config));
        if config.llm.enabled {
            shared.set_llm_provider(Arc::new(HttpCompletionProvider::new(&config.llm)));
        }
        let secret = config.hmac_secret.as_bytes().to_vec();
        info!(
            detectors = registry.enabled_count(),
            deadline_ms = config.deadline_ms,
            llm = config.llm.enabled,
            "engine ready"
        );
        Ok(Self {
            config: Arc::new(config),
            registry,
            shared,
            policies: PolicyRegistry::default(),
            secret,
        })
    }

    /// Swap in a non-default action policy table.
    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    /// Replace the LLM transport (tests, alternative providers).
    pub fn set_llm_provider(&self, provider: Arc<dyn LlmProvider>) {
        self.shared.set_llm_provider(provider);
    }

    /// One-time async startup: probe the LLM endpoint. Failure degrades the
    /// escalation wave, never the engine.
    pub async fn initialise(&self) {
        if !self.config.llm.enabled {
            return;
        }
        if let Some(provider) = self.shared.llm_provider() {
            if let Err(e) = provider.initialise().await {
                warn!(error = %e, "llm provider unavailable, escalation disabled for now");
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn signature_for(&self, fingerprint: &RequestFingerprint) -> String {
        primary_signature(
            &self.secret,
            &fingerprint.user_agent,
            fingerprint.remote_addr,
            &fingerprint.path,
        )
    }

    /// Evaluate under the configured deadline.
    pub async fn evaluate(self: &Arc<Self>, fingerprint: RequestFingerprint) -> AggregatedEvidence {
        let budget = self.config.deadline();
        self.evaluate_with_deadline(fingerprint, budget).await
    }

    /// Evaluate under an explicit budget. Total: catastrophic internal
    /// failures return a fail-open verdict.
    pub async fn evaluate_with_deadline(
        self: &Arc<Self>,
        fingerprint: RequestFingerprint,
        budget: Duration,
    ) -> AggregatedEvidence {
        let signature = self.signature_for(&fingerprint);
        let engine = Arc::clone(self);
        let task_signature = signature.clone();
        let handle = tokio::spawn(async move {
            engine.evaluate_inner(fingerprint, task_signature, budget).await
        });
        match handle.await {
            Ok(evidence) => evidence,
            Err(e) => {
                error!(error = %e, "evaluation task failed, failing open");
                AggregatedEvidence::fail_open(signature, "internal_error")
            }
        }
    }

    async fn evaluate_inner(
        &self,
        fingerprint: RequestFingerprint,
        signature: String,
        budget: Duration,
    ) -> AggregatedEvidence {
        let path = fingerprint.path.clone();
        let ctx = Arc::new(DetectionContext::new(fingerprint, signature.clone(), budget));

        self.shared.windows.record_visit(&signature, &path);

        let stats = orchestrator::run_waves(&self.config, &self.registry, &self.shared, &ctx).await;

        let evidence = aggregate::finalize(&ctx, &self.config, &self.policies, &self.shared, &stats);

        ctx.set_state(match stats.state {
            PipelineState::BudgetExceeded => PipelineState::BudgetExceeded,
            _ => PipelineState::Final,
        });

        self.shared
            .windows
            .record_verdict(&signature, evidence.bot_probability);
        self.observe_cluster(&ctx, &evidence);

        evidence
    }

    /// Feed the clustering index once a signature has enough history for its
    /// feature vector to mean something.
    fn observe_cluster(&self, ctx: &DetectionContext, evidence: &AggregatedEvidence) {
        let min_observations = self
            .registry
            .manifest("clustering")
            .map(|m| m.param_u64("min_observations", 3) as usize)
            .unwrap_or(3);

        let window = match self.shared.windows.get(&ctx.signature) {
            Some(w) => w,
            None => return,
        };

        let vector = {
            let guard = window.read();
            if guard.hits_in(3600) < min_observations {
                return;
            }
            features::compute(
                Some(&*guard),
                &ctx.sink,
                evidence.bot_probability,
                path_token(&ctx.fingerprint.path),
                3600,
            )
        };

        window.write().last_features = Some(vector);
        self.shared
            .clusters
            .observe(&ctx.signature, vector, evidence.is_bot);
    }
}
