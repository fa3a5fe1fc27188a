// botgate/src/detectors/waveform.rs
//
// Behavioural waveform over the signature's sliding window: inter-arrival
// regularity (CV), path entropy, request rate. Humans are bursty and
// wander; schedulers tick and loop.

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Waveform;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let window_secs = manifest.param_u64("window_secs", 3600) as i64;
    let min_visits = manifest.param_u64("min_visits", 5) as usize;

    let window = match shared.windows.get(&ctx.signature) {
        Some(w) => w,
        None => return Ok(Vec::new()),
    };
    let window = window.read();

    let visits = window.hits_in(window_secs);
    if visits < min_visits {
        return Ok(Vec::new());
    }

    let gaps = window.interarrivals(window_secs);
    if gaps.len() < 3 {
        return Ok(Vec::new());
    }
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let std = (gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64).sqrt();
    let cv = if mean > 0.0 { std / mean } else { 0.0 };

    let entropy = window.path_entropy(window_secs);
    let rate = window.rate_per_hour(window_secs);

    let sink = &ctx.sink;
    let name = KIND.name();
    sink.emit(name, "detection.waveform.regularity", (1.0 - cv).clamp(0.0, 1.0));
    sink.emit(name, "detection.waveform.path_entropy", entropy);
    sink.emit(name, "detection.waveform.rate", rate);

    let cv_threshold = manifest.param_f64("cv_threshold", 0.15);
    let entropy_threshold = manifest.param_f64("entropy_threshold", 0.3);
    let rate_threshold = manifest.param_f64("rate_threshold", 120.0);

    let mut score = 0.0f64;
    let mut reasons: Vec<String> = Vec::new();

    if cv < cv_threshold {
        score += 0.6;
        reasons.push(format!("clock-regular timing (cv {cv:.3} over {visits} visits)"));
        if entropy < entropy_threshold {
            score += 0.2;
            reasons.push(format!("low path entropy ({entropy:.2})"));
        }
    }
    if rate > rate_threshold {
        score += 0.2;
        reasons.push(format!("sustained {rate:.0} requests/hour"));
    }

    if score == 0.0 {
        return Ok(Vec::new());
    }

    let confidence =
        manifest.confidence("regularity", 0.85) * (visits as f64 / 20.0).min(1.0).max(0.5);

    Ok(vec![Contribution::bot(
        KIND,
        score.min(1.0),
        manifest.weight("regularity", 1.0),
        confidence,
        reasons.join("; "),
    )
    .with_signals(vec![
        "detection.waveform.regularity".into(),
        "detection.waveform.path_entropy".into(),
        "detection.waveform.rate".into(),
    ])])
}
