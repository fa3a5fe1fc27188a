// botgate/src/engine/aggregate.rs
//
// Contribution aggregation, risk banding and action mapping.
//
// Bot-leaning and human-leaning evidence is summed separately, mapped to a
// probability through a bounded logistic centred at zero, and clamped to
// [0.01, 0.99] — the engine never claims certainty. Confidence reflects both
// evidence mass and pipeline completeness.

use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::context::{DetectionContext, LearningRecord, PipelineState};
use crate::engine::orchestrator::WaveRunStats;
use crate::engine::policy::PolicyRegistry;
use crate::signal::{Contribution, SignalSink};
use crate::state::SharedState;
use crate::verdict::{Action, AggregatedEvidence, BotCategory, RiskBand};

/// Risk-band thresholds over max_weighted_score.
const BAND_THRESHOLDS: [(f64, RiskBand); 5] = [
    (0.95, RiskBand::VeryHigh),
    (0.8, RiskBand::High),
    (0.6, RiskBand::Medium),
    (0.4, RiskBand::Elevated),
    (0.2, RiskBand::Low),
];

pub fn sums(contributions: &[Contribution]) -> (f64, f64) {
    contributions.iter().fold((0.0, 0.0), |(bot, human), c| {
        if c.weighted_score >= 0.0 {
            (bot + c.weighted_score, human)
        } else {
            (bot, human - c.weighted_score)
        }
    })
}

/// Bounded logistic centred at zero, clamped to [0.01, 0.99].
pub fn probability(bot_sum: f64, human_sum: f64, k: f64) -> f64 {
    let p = 1.0 / (1.0 + (-k * (bot_sum - human_sum)).exp());
    p.clamp(0.01, 0.99)
}

pub fn base_band(max_weighted: f64) -> RiskBand {
    for (threshold, band) in BAND_THRESHOLDS {
        if max_weighted >= threshold {
            return band;
        }
    }
    RiskBand::VeryLow
}

/// Strong corroborating signals for the one-band boost.
pub fn strong_signal_count(sink: &SignalSink) -> usize {
    let mut count = 0;
    if sink.real("detection.inconsistency.score") > 0.5 {
        count += 1;
    }
    if sink.real("detection.useragent.headless_likelihood") > 0.7 {
        count += 1;
    }
    if sink.bool("request.ip.is_datacenter") {
        count += 1;
    }
    count
}

pub fn finalize(
    ctx: &DetectionContext,
    config: &EngineConfig,
    policies: &PolicyRegistry,
    shared: &SharedState,
    stats: &WaveRunStats,
) -> AggregatedEvidence {
    let contributions = ctx.contributions();
    let (bot_sum, human_sum) = sums(&contributions);
    let agg = &config.aggregation;

    let bot_probability = probability(bot_sum, human_sum, agg.k);
    let completion = if stats.eligible == 0 {
        1.0
    } else {
        stats.completed as f64 / stats.eligible as f64
    };
    let confidence = (((bot_sum + human_sum) / agg.saturation).min(1.0) * completion).clamp(0.0, 1.0);
    let is_bot = bot_probability >= agg.bot_threshold;

    let mut risk_band = base_band(ctx.max_weighted_score());
    if strong_signal_count(&ctx.sink) >= 2 {
        risk_band = risk_band.boosted();
    }

    let bot_type = dominant_category(&contributions);
    let bot_name = if is_bot {
        proposed_name(&contributions).filter(|name| shared.names.try_claim(name))
    } else {
        None
    };

    let selection = policies.select(risk_band, bot_type);
    let (recommended_action, action_reason) = if stats.state == PipelineState::BudgetExceeded {
        // Partial evidence never blocks outright.
        let clamped = selection.action.min(Action::Challenge);
        (
            clamped,
            format!("budget_exceeded; {}", selection.reason),
        )
    } else {
        (selection.action, selection.reason)
    };

    ctx.add_learning(LearningRecord {
        signature: ctx.signature.clone(),
        features: contributions
            .iter()
            .map(|c| (c.detector.name().to_string(), c.weighted_score))
            .chain(std::iter::once(("bot_probability".to_string(), bot_probability)))
            .collect(),
        label_hint: Some(is_bot),
        at: chrono::Utc::now(),
    });

    debug!(
        signature = %ctx.signature,
        p = bot_probability,
        confidence,
        band = %risk_band,
        action = %recommended_action,
        "aggregated"
    );

    AggregatedEvidence {
        is_bot,
        bot_probability,
        confidence,
        risk_band,
        bot_type,
        bot_name,
        recommended_action,
        action_reason: Some(action_reason),
        policy_name: Some(selection.policy_name),
        contributions,
        signals: ctx.sink.snapshot(),
        primary_signature: ctx.signature.clone(),
        processing_ms: ctx.elapsed_ms(),
    }
}

/// Category of the heaviest bot-leaning contribution.
fn dominant_category(contributions: &[Contribution]) -> Option<BotCategory> {
    contributions
        .iter()
        .filter(|c| c.weighted_score > 0.0 && c.category.is_some())
        .max_by(|a, b| {
            a.weighted_score
                .partial_cmp(&b.weighted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .and_then(|c| c.category)
}

fn proposed_name(contributions: &[Contribution]) -> Option<String> {
    contributions
        .iter()
        .filter_map(|c| c.meta.get("bot_name"))
        .filter_map(Value::as_str)
        .map(str::to_string)
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorKind;

    #[test]
    fn sums_partition_by_sign() {
        let contributions = vec![
            Contribution::bot(DetectorKind::UserAgent, 0.8, 1.0, 0.9, "a"),
            Contribution::bot(DetectorKind::Ip, 0.4, 0.5, 0.9, "b"),
            Contribution::human(DetectorKind::Headers, 0.5, 1.0, 0.9, "c"),
        ];
        let (bot, human) = sums(&contributions);
        assert!((bot - 1.0).abs() < 1e-9);
        assert!((human - 0.5).abs() < 1e-9);
    }

    #[test]
    fn probability_is_clamped_and_monotone() {
        assert_eq!(probability(100.0, 0.0, 1.0), 0.99);
        assert_eq!(probability(0.0, 100.0, 1.0), 0.01);
        assert!((probability(0.0, 0.0, 1.0) - 0.5).abs() < 1e-9);

        // Monotone in bot_sum at fixed human_sum.
        let mut last = 0.0;
        for i in 0..40 {
            let p = probability(i as f64 * 0.1, 1.0, 1.0);
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn steeper_k_sharpens_the_map() {
        assert!(probability(1.0, 0.0, 2.0) > probability(1.0, 0.0, 1.0));
        assert!(probability(0.0, 1.0, 2.0) < probability(0.0, 1.0, 1.0));
    }

    #[test]
    fn band_thresholds_match_contract() {
        assert_eq!(base_band(0.1), RiskBand::VeryLow);
        assert_eq!(base_band(0.2), RiskBand::Low);
        assert_eq!(base_band(0.45), RiskBand::Elevated);
        assert_eq!(base_band(0.6), RiskBand::Medium);
        assert_eq!(base_band(0.8), RiskBand::High);
        assert_eq!(base_band(0.95), RiskBand::VeryHigh);
        assert_eq!(base_band(2.5), RiskBand::VeryHigh);
    }

    #[test]
    fn dominant_category_is_heaviest_bot_contribution() {
        let contributions = vec![
            Contribution::bot(DetectorKind::Headers, 0.4, 0.8, 0.8, "a"),
            Contribution::bot(DetectorKind::UserAgent, 0.75, 1.0, 0.9, "b")
                .with_category(BotCategory::ScriptingLibrary),
            Contribution::human(DetectorKind::Ip, 0.9, 2.0, 0.9, "c")
                .with_category(BotCategory::SearchEngine),
        ];
        assert_eq!(
            dominant_category(&contributions),
            Some(BotCategory::ScriptingLibrary)
        );
    }
}
