// botgate/src/state/features.rs
//
// The 18-feature behavioural vector shared by the heuristic detector and the
// clustering index. All features are normalised to [0,1]; a signature with no
// history gets zeros for the window-derived entries.
//
// Spectral entries come from a naive DFT over the inter-arrival series —
// windows are capped well below the point where O(n²) matters.

use crate::signal::SignalSink;
use crate::state::window::SignatureWindow;

pub const FEATURE_COUNT: usize = 18;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "timing",
    "rate",
    "path_div",
    "entropy",
    "bot_prob",
    "geo",
    "datacenter",
    "asn",
    "spectral_entropy",
    "harmonic",
    "peak_to_avg",
    "dominant_freq",
    "self_drift",
    "human_drift",
    "loop_score",
    "surprise",
    "novelty",
    "entropy_delta",
];

pub type FeatureVec = [f64; FEATURE_COUNT];

/// Typical interactive-browsing profile over the first eight features; the
/// human_drift feature measures distance from it.
const HUMAN_BASELINE: [f64; 8] = [0.25, 0.05, 0.7, 0.7, 0.2, 0.0, 0.0, 0.5];

const SPECTRUM_MAX_SAMPLES: usize = 64;

pub fn index_of(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|&n| n == name)
}

/// Compute the vector for one signature at one request.
///
/// `bot_prob` is supplied by the caller: the heuristic detector uses its
/// running estimate from the contributions so far, the clustering index uses
/// the provisional probability published at the composite-wave barrier.
pub fn compute(
    window: Option<&SignatureWindow>,
    sink: &SignalSink,
    bot_prob: f64,
    current_path_token: u64,
    window_secs: i64,
) -> FeatureVec {
    let mut features = [0.0f64; FEATURE_COUNT];

    features[4] = bot_prob.clamp(0.0, 1.0);
    features[5] = sink.real("request.ip.geo_risk").clamp(0.0, 1.0);
    features[6] = if sink.bool("request.ip.is_datacenter") { 1.0 } else { 0.0 };
    features[7] = (sink.int("request.ip.asn").rem_euclid(1024)) as f64 / 1024.0;

    let window = match window {
        Some(w) => w,
        None => {
            features[13] = human_drift(&features);
            return features;
        }
    };

    let gaps = window.interarrivals(window_secs);
    features[0] = regularity(&gaps);
    features[1] = (window.rate_per_hour(window_secs) / 300.0).min(1.0);

    let (spectral_entropy, harmonic, peak_to_avg, dominant_freq) = spectrum(&gaps);
    features[8] = spectral_entropy;
    features[9] = harmonic;
    features[10] = peak_to_avg;
    features[11] = dominant_freq;

    // Path-shape features need a few visits of history to mean anything; a
    // first-time signature stays neutral.
    let tokens: Vec<u64> = window
        .visits_in(window_secs)
        .iter()
        .map(|v| v.path_token)
        .collect();
    if tokens.len() >= 3 {
        features[2] = window.distinct_path_ratio(window_secs);
        features[3] = window.path_entropy(window_secs);
        features[14] = loop_score(&tokens);
        features[15] = surprise(&tokens, current_path_token);
        features[16] = novelty(&tokens);
        features[17] = entropy_delta(&tokens);
    }

    if let Some(previous) = window.last_features {
        features[12] = drift(&features, &previous);
    }
    features[13] = human_drift(&features);

    features
}

/// 1 − coefficient of variation of the gaps, clamped to [0,1].
/// Clock-driven clients sit near 1, humans near 0.
fn regularity(gaps: &[f64]) -> f64 {
    if gaps.len() < 3 {
        return 0.0;
    }
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let var = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    (1.0 - var.sqrt() / mean).clamp(0.0, 1.0)
}

pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt() / mean.abs()
}

/// Naive DFT over the mean-removed gap series.
/// Returns (spectral_entropy, harmonic_ratio, peak_to_avg, dominant_freq),
/// each normalised to [0,1].
fn spectrum(gaps: &[f64]) -> (f64, f64, f64, f64) {
    let n = gaps.len().min(SPECTRUM_MAX_SAMPLES);
    if n < 8 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let samples = &gaps[gaps.len() - n..];
    let mean = samples.iter().sum::<f64>() / n as f64;

    let half = n / 2;
    let mut power = vec![0.0f64; half];
    for (k, p) in power.iter_mut().enumerate().skip(1) {
        let (mut re, mut im) = (0.0f64, 0.0f64);
        for (t, &x) in samples.iter().enumerate() {
            let angle = -2.0 * std::f64::consts::PI * k as f64 * t as f64 / n as f64;
            re += (x - mean) * angle.cos();
            im += (x - mean) * angle.sin();
        }
        *p = re * re + im * im;
    }

    let total: f64 = power.iter().sum();
    if total <= f64::EPSILON {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let entropy: f64 = power
        .iter()
        .skip(1)
        .filter(|&&p| p > 0.0)
        .map(|&p| {
            let q = p / total;
            -q * q.ln()
        })
        .sum();
    let spectral_entropy = if half > 2 {
        (entropy / ((half - 1) as f64).ln()).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let (dominant_k, &peak) = power
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((1, &0.0));

    let mut harmonic_energy = 0.0;
    for multiple in [2, 3] {
        let k = dominant_k * multiple;
        if k < half {
            harmonic_energy += power[k];
        }
    }
    let harmonic = (harmonic_energy / total).clamp(0.0, 1.0);

    let avg = total / (half.saturating_sub(1).max(1)) as f64;
    let ratio = if avg > 0.0 { peak / avg } else { 0.0 };
    let peak_to_avg = (ratio / (ratio + 4.0)).clamp(0.0, 1.0);

    let dominant_freq = dominant_k as f64 / half.max(1) as f64;

    (spectral_entropy, harmonic, peak_to_avg, dominant_freq)
}

/// Mean absolute difference over the first twelve (non-drift) features.
fn drift(current: &FeatureVec, previous: &FeatureVec) -> f64 {
    let sum: f64 = current
        .iter()
        .zip(previous.iter())
        .take(12)
        .map(|(a, b)| (a - b).abs())
        .sum();
    (sum / 12.0).clamp(0.0, 1.0)
}

fn human_drift(features: &FeatureVec) -> f64 {
    let sum: f64 = features
        .iter()
        .zip(HUMAN_BASELINE.iter())
        .map(|(a, b)| (a - b).abs())
        .sum();
    (sum / HUMAN_BASELINE.len() as f64).clamp(0.0, 1.0)
}

/// Ratio of the most repeated path token to all visits.
fn loop_score(tokens: &[u64]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for t in tokens {
        *counts.entry(*t).or_insert(0usize) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    max as f64 / tokens.len() as f64
}

/// 1 − empirical frequency of the current path within the window.
fn surprise(tokens: &[u64], current: u64) -> f64 {
    if tokens.is_empty() {
        return 1.0;
    }
    let hits = tokens.iter().filter(|&&t| t == current).count();
    1.0 - hits as f64 / tokens.len() as f64
}

/// Fraction of distinct tokens seen exactly once.
fn novelty(tokens: &[u64]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for t in tokens {
        *counts.entry(*t).or_insert(0usize) += 1;
    }
    let singletons = counts.values().filter(|&&c| c == 1).count();
    singletons as f64 / counts.len() as f64
}

/// Entropy change between the first and second half of the window.
fn entropy_delta(tokens: &[u64]) -> f64 {
    if tokens.len() < 8 {
        return 0.0;
    }
    let mid = tokens.len() / 2;
    (token_entropy(&tokens[mid..]) - token_entropy(&tokens[..mid]))
        .abs()
        .clamp(0.0, 1.0)
}

fn token_entropy(tokens: &[u64]) -> f64 {
    if tokens.len() < 2 {
        return 0.0;
    }
    let mut counts = std::collections::HashMap::new();
    for t in tokens {
        *counts.entry(*t).or_insert(0usize) += 1;
    }
    if counts.len() < 2 {
        return 0.0;
    }
    let n = tokens.len() as f64;
    let entropy: f64 = counts
        .values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum();
    entropy / (counts.len() as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalSink;

    #[test]
    fn names_and_count_agree() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
        assert_eq!(index_of("timing"), Some(0));
        assert_eq!(index_of("entropy_delta"), Some(17));
        assert_eq!(index_of("nonsense"), None);
    }

    #[test]
    fn no_history_yields_request_only_features() {
        let sink = SignalSink::new();
        sink.set_signal("ip", "request.ip.is_datacenter", true).unwrap();
        sink.publish_wave();
        let f = compute(None, &sink, 0.5, 0, 3600);
        assert_eq!(f[4], 0.5);
        assert_eq!(f[6], 1.0);
        assert_eq!(f[0], 0.0);
        assert_eq!(f[1], 0.0);
    }

    #[test]
    fn regularity_high_for_fixed_cadence() {
        let gaps = vec![2.0; 20];
        assert!(regularity(&gaps) > 0.95);
        let jittered: Vec<f64> = (0..20).map(|i| 2.0 + (i % 5) as f64).collect();
        assert!(regularity(&jittered) < regularity(&gaps));
    }

    #[test]
    fn loop_and_novelty_behave() {
        let repeated = vec![7u64; 10];
        assert_eq!(loop_score(&repeated), 1.0);
        assert_eq!(novelty(&repeated), 0.0);

        let unique: Vec<u64> = (0..10).collect();
        assert_eq!(loop_score(&unique), 0.1);
        assert_eq!(novelty(&unique), 1.0);
    }

    #[test]
    fn surprise_drops_with_familiarity() {
        let tokens = vec![1, 1, 1, 2];
        assert!(surprise(&tokens, 1) < surprise(&tokens, 3));
    }

    #[test]
    fn spectrum_flags_periodic_series() {
        // Alternating short/long gaps: strong component at Nyquist.
        let gaps: Vec<f64> = (0..32).map(|i| if i % 2 == 0 { 1.0 } else { 5.0 }).collect();
        let (se_periodic, _, peak_periodic, _) = spectrum(&gaps);
        let noisy: Vec<f64> = (0u64..32)
            .map(|i| 3.0 + ((i * 2654435761 % 97) as f64) / 97.0 * 4.0)
            .collect();
        let (se_noisy, _, _, _) = spectrum(&noisy);
        assert!(se_periodic < se_noisy);
        assert!(peak_periodic > 0.2);
    }
}
