// botgate/src/engine/orchestrator.rs
//
// Wave scheduler. Detectors run concurrently inside a wave under their own
// time budgets; a publish barrier at each wave boundary makes the wave's
// signals visible to the next. A global deadline bounds the pipeline, with a
// reserved tail so aggregation always gets to run.
//
// Failure discipline: a detector that errors, times out or panics is dropped
// from this request and logged; its absence dents confidence at aggregation.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::{DetectionContext, PipelineState};
use crate::detectors::{self, DetectorKind};
use crate::engine::aggregate;
use crate::error::DetectorError;
use crate::manifest::DetectorScope;
use crate::registry::DetectorRegistry;
use crate::signal::Contribution;
use crate::state::SharedState;

const ORCHESTRATOR: &str = "orchestrator";

#[derive(Debug, Clone, Copy)]
pub struct WaveRunStats {
    pub state: PipelineState,
    /// Detectors that should have produced a result this request: launched,
    /// proactively skipped, or stranded behind an expired deadline. Detectors
    /// whose triggers never matched are not counted.
    pub eligible: usize,
    pub completed: usize,
}

type DetectorResult = (
    DetectorKind,
    Result<Result<Vec<Contribution>, DetectorError>, tokio::time::error::Elapsed>,
);

pub async fn run_waves(
    config: &Arc<EngineConfig>,
    registry: &DetectorRegistry,
    shared: &Arc<SharedState>,
    ctx: &Arc<DetectionContext>,
) -> WaveRunStats {
    let tail = config.tail_reserve();
    let mut eligible = 0usize;
    let mut completed = 0usize;
    let mut budget_exceeded = false;
    let mut provisional_done = false;

    let waves = registry.waves();
    for (index, wave) in waves.iter().enumerate() {
        let remaining = ctx.remaining();
        if remaining <= tail {
            // Deadline gone: everything not yet run counts against confidence.
            budget_exceeded = true;
            eligible += waves[index..].iter().map(|w| w.detectors.len()).sum::<usize>();
            warn!(wave = wave.priority, "budget exceeded, skipping remaining waves");
            break;
        }

        ctx.set_state(PipelineState::WaveRunning(wave.priority));
        let mut join: JoinSet<DetectorResult> = JoinSet::new();

        for &kind in &wave.detectors {
            let manifest = match registry.manifest_for(kind) {
                Some(m) => Arc::clone(m),
                None => continue,
            };

            if !manifest.triggers_satisfied(&ctx.sink) {
                debug!(detector = %kind, "triggers not satisfied");
                continue;
            }

            // Advanced fingerprinting is optional work: skip when the request
            // is already definitively classified or the budget is thin.
            if manifest.scope == DetectorScope::Advanced {
                let definitive = ctx.max_weighted_score() >= config.aggregation.definitive_score;
                let thin = ctx.remaining() < Duration::from_millis(config.aggregation.advanced_min_ms);
                if definitive || thin {
                    eligible += 1;
                    debug!(detector = %kind, definitive, thin, "advanced detector skipped");
                    continue;
                }
            }

            eligible += 1;
            let budget = manifest
                .timeout()
                .min(ctx.remaining().saturating_sub(tail))
                .max(Duration::from_millis(1));

            let ctx = Arc::clone(ctx);
            let shared = Arc::clone(shared);
            let config = Arc::clone(config);
            join.spawn(async move {
                let outcome = tokio::time::timeout(
                    budget,
                    detectors::run(kind, ctx, manifest, shared, config),
                )
                .await;
                (kind, outcome)
            });
        }

        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((kind, Ok(Ok(contributions)))) => {
                    completed += 1;
                    debug!(detector = %kind, n = contributions.len(), "detector completed");
                    for contribution in contributions {
                        ctx.record_contribution(contribution);
                    }
                }
                Ok((kind, Ok(Err(e)))) => {
                    let dropped = ctx.sink.discard_pending_from(kind.name());
                    warn!(detector = %kind, error = %e, dropped, "detector failed, partial result discarded");
                }
                Ok((kind, Err(_))) => {
                    let dropped = ctx.sink.discard_pending_from(kind.name());
                    warn!(detector = %kind, dropped, "detector exceeded its budget, partial result discarded");
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        warn!(error = %join_error, "detector panicked, contribution discarded");
                    }
                }
            }
        }

        ctx.set_state(PipelineState::Barrier(wave.priority));
        ctx.sink.publish_wave();

        // Provisional estimate after the composite tier: escalation-wave
        // triggers key off these.
        if !provisional_done && wave.priority >= 1 {
            publish_provisional(config, ctx);
            provisional_done = true;
        }
    }

    let state = if budget_exceeded {
        PipelineState::BudgetExceeded
    } else {
        PipelineState::Aggregating
    };
    ctx.set_state(state);

    WaveRunStats {
        state,
        eligible,
        completed,
    }
}

fn publish_provisional(config: &EngineConfig, ctx: &DetectionContext) {
    let (bot_sum, human_sum) = aggregate::sums(&ctx.contributions());
    let provisional = aggregate::probability(bot_sum, human_sum, config.aggregation.k);
    let ambiguous = provisional >= config.llm.band_low && provisional <= config.llm.band_high;

    ctx.sink.emit(
        ORCHESTRATOR,
        "detection.aggregate.provisional_probability",
        provisional,
    );
    ctx.sink
        .emit(ORCHESTRATOR, "detection.aggregate.ambiguous", ambiguous);
    ctx.sink.publish_wave();
}
