// botgate/src/detectors/reputation.rs
//
// Sliding-window signature reputation. Repeated appearances with consistent
// prior verdicts confirm bot-ness; a history of human verdicts argues the
// other way. Runs on every request, O(window).

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Reputation;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let sink = &ctx.sink;
    let name = KIND.name();
    let window_secs = manifest.param_u64("window_secs", 3600) as i64;

    let window = match shared.windows.get(&ctx.signature) {
        Some(w) => w,
        None => {
            sink.emit(name, "detection.reputation.hits", 0i64);
            sink.emit(name, "detection.reputation.prior_bot_ratio", 0.0f64);
            return Ok(Vec::new());
        }
    };
    let window = window.read();

    let hits = window.hits_in(window_secs);
    let bot_ratio = window.bot_ratio(0.7);
    let n_verdicts = window.verdicts.len();

    sink.emit(name, "detection.reputation.hits", hits as i64);
    sink.emit(name, "detection.reputation.prior_bot_ratio", bot_ratio);

    let min_hits = manifest.param_u64("min_hits", 3) as usize;
    if hits < min_hits || n_verdicts == 0 {
        return Ok(Vec::new());
    }

    let signals = vec![
        "detection.reputation.hits".into(),
        "detection.reputation.prior_bot_ratio".into(),
    ];
    let ratio_threshold = manifest.param_f64("ratio_threshold", 0.6);
    let base = manifest.param_f64("repeat_score", 0.5);
    let depth = (hits as f64 / 10.0).min(1.0);

    if bot_ratio >= ratio_threshold {
        return Ok(vec![Contribution::bot(
            KIND,
            base * depth.max(0.4),
            manifest.weight("repeat", 0.8),
            manifest.confidence("repeat", 0.8),
            format!("{hits} recent visits, {:.0}% previously judged bot", bot_ratio * 100.0),
        )
        .with_signals(signals)]);
    }

    if bot_ratio <= 0.2 && n_verdicts >= min_hits {
        return Ok(vec![Contribution::human(
            KIND,
            0.3 * depth.max(0.4),
            manifest.weight("repeat", 0.8),
            manifest.confidence("repeat", 0.8),
            format!("{hits} recent visits with a human track record"),
        )
        .with_signals(signals)]);
    }

    Ok(Vec::new())
}
