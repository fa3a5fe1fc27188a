// botgate/src/detectors/clustering.rs
//
// Cluster-borrowed verdict. When the signature sits in a known behavioural
// cluster, the cluster's majority verdict is borrowed at dampened weight —
// membership is guilt by association, not proof.

use serde_json::json;

use crate::context::DetectionContext;
use crate::detectors::DetectorKind;
use crate::error::DetectorError;
use crate::manifest::DetectorManifest;
use crate::signal::Contribution;
use crate::state::SharedState;

const KIND: DetectorKind = DetectorKind::Clustering;

pub async fn contribute(
    ctx: &DetectionContext,
    manifest: &DetectorManifest,
    shared: &SharedState,
) -> Result<Vec<Contribution>, DetectorError> {
    let sink = &ctx.sink;
    let name = KIND.name();

    let summary = match shared.clusters.cluster_of(&ctx.signature) {
        Some(s) => s,
        None => {
            sink.emit(name, "detection.cluster.size", 0i64);
            return Ok(Vec::new());
        }
    };

    sink.emit(name, "detection.cluster.size", summary.size as i64);
    sink.emit(name, "detection.cluster.bot_fraction", summary.bot_fraction);

    let min_observations = manifest.param_u64("min_observations", 3) as usize;
    if summary.size < min_observations {
        return Ok(Vec::new());
    }

    let dampening = manifest.param_f64("dampening", 0.6);
    // Majority margin, rescaled to [0,1]: a 50/50 cluster says nothing.
    let margin = (summary.bot_fraction - 0.5).abs() * 2.0;
    if margin < 0.1 {
        return Ok(Vec::new());
    }
    let score = margin * dampening;

    let signals = vec![
        "detection.cluster.size".into(),
        "detection.cluster.bot_fraction".into(),
    ];
    let meta_size = json!(summary.size);

    let contribution = if summary.bot_fraction >= 0.5 {
        Contribution::bot(
            KIND,
            score,
            manifest.weight("borrow", 0.6),
            manifest.confidence("borrow", 0.7),
            format!(
                "behavioural cluster of {} signatures, {:.0}% judged bot",
                summary.size,
                summary.bot_fraction * 100.0
            ),
        )
    } else {
        Contribution::human(
            KIND,
            score,
            manifest.weight("borrow", 0.6),
            manifest.confidence("borrow", 0.7),
            format!(
                "behavioural cluster of {} signatures, mostly human verdicts",
                summary.size
            ),
        )
    };

    Ok(vec![contribution
        .with_signals(signals)
        .with_meta("cluster_size", meta_size)])
}
