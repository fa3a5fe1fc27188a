// botgate/src/detectors/heuristic.rs
//
// Weighted logistic over the shared 18-feature vector. Coefficients live in
// the manifest; the bot_prob feature is the running estimate from the
// contributions recorded so far (wave 0 by the time this runs).

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::features::{self, FEATURE_NAMES};
use crate::state::window::path_token;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Heuristic;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let window_secs = manifest.param_u64("window_secs", 3600) as i64;

    let (bot_sum, human_sum) = ctx
        .contributions()
        .iter()
        .fold((0.0f64, 0.0f64), |(b, h), c| {
            if c.weighted_score >= 0.0 {
                (b + c.weighted_score, h)
            } else {
                (b, h - c.weighted_score)
            }
        });
    let running_estimate = 1.0 / (1.0 + (-(bot_sum - human_sum)).exp());

    let window = shared.windows.get(&ctx.signature);
    let guard = window.as_ref().map(|w| w.read());
    let features = features::compute(
        guard.as_deref(),
        &ctx.sink,
        running_estimate,
        path_token(&ctx.fingerprint.path),
        window_secs,
    );
    drop(guard);

    let coefficients = manifest.param_f64_map("coefficients");
    let bias = manifest.param_f64("bias", -1.2);
    let z = FEATURE_NAMES
        .iter()
        .zip(features.iter())
        .fold(bias, |acc, (name, value)| {
            acc + coefficients.get(*name).copied().unwrap_or(0.0) * value
        });
    let probability = 1.0 / (1.0 + (-z).exp());

    ctx.sink
        .emit(KIND.name(), "detection.heuristic.probability", probability);

    // Centre at neutral: p = 0.5 contributes nothing.
    let raw = 2.0 * probability - 1.0;
    if raw.abs() < 0.05 {
        return Ok(Vec::new());
    }

    Ok(vec![Contribution::new(
        KIND,
        raw,
        manifest.weight("logistic", 0.7),
        manifest.confidence("logistic", 0.7),
        format!("feature logistic estimate {probability:.2}"),
    )
    .with_signals(vec!["detection.heuristic.probability".into()])])
}
