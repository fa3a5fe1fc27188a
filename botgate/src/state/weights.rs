// botgate/src/state/weights.rs
//
// Adaptive similarity weights for the 18-feature space.
//
// Readers take an Arc snapshot; recomputation is single-writer and installs
// the new vector with one pointer swap, so a reader never observes a
// half-updated weight set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::state::features::{coefficient_of_variation, FeatureVec, FEATURE_COUNT};

pub const WEIGHT_MIN: f64 = 0.01;
pub const WEIGHT_MAX: f64 = 0.25;
const MIN_VECTORS: usize = 3;

pub struct AdaptiveSimilarityWeighter {
    current: RwLock<Arc<FeatureVec>>,
    shift_threshold: f64,
    shift_events: AtomicU64,
    recomputes: AtomicU64,
    writer: Mutex<()>,
}

impl AdaptiveSimilarityWeighter {
    pub fn new(shift_threshold: f64) -> Self {
        Self {
            current: RwLock::new(Arc::new(default_weights())),
            shift_threshold,
            shift_events: AtomicU64::new(0),
            recomputes: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    /// Consistent snapshot of the active weights.
    pub fn weights(&self) -> Arc<FeatureVec> {
        self.current.read().clone()
    }

    pub fn shift_events(&self) -> u64 {
        self.shift_events.load(Ordering::Relaxed)
    }

    pub fn recomputes(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Recompute from the observed vectors. Features with higher variability
    /// get more discriminating power; each weight is clamped to
    /// [WEIGHT_MIN, WEIGHT_MAX] and the set renormalised to sum ≈ 1.
    /// Returns the number of features whose weight shifted past the
    /// configured threshold.
    pub fn compute_weights(&self, vectors: &[FeatureVec]) -> usize {
        if vectors.len() < MIN_VECTORS {
            return 0;
        }
        let _guard = self.writer.lock();

        let mut raw = [0.0f64; FEATURE_COUNT];
        let mut column = Vec::with_capacity(vectors.len());
        for (i, slot) in raw.iter_mut().enumerate() {
            column.clear();
            column.extend(vectors.iter().map(|v| v[i]));
            *slot = coefficient_of_variation(&column);
        }

        let total: f64 = raw.iter().sum();
        let mut next = if total <= f64::EPSILON {
            default_weights()
        } else {
            let mut w = [0.0f64; FEATURE_COUNT];
            for i in 0..FEATURE_COUNT {
                w[i] = (raw[i] / total).clamp(WEIGHT_MIN, WEIGHT_MAX);
            }
            w
        };

        // Renormalise after clamping, then re-clamp once: the result stays
        // within the per-feature bounds and the sum lands in [0.95, 1.05].
        let sum: f64 = next.iter().sum();
        if sum > f64::EPSILON {
            for w in next.iter_mut() {
                *w = (*w / sum).clamp(WEIGHT_MIN, WEIGHT_MAX);
            }
        }

        let previous = self.weights();
        let shifts = previous
            .iter()
            .zip(next.iter())
            .filter(|(a, b)| (*a - *b).abs() > self.shift_threshold)
            .count();
        if shifts > 0 {
            self.shift_events.fetch_add(shifts as u64, Ordering::Relaxed);
            debug!(shifts, "similarity weight shift");
        }

        *self.current.write() = Arc::new(next);
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        shifts
    }
}

pub fn default_weights() -> FeatureVec {
    [1.0 / FEATURE_COUNT as f64; FEATURE_COUNT]
}

/// Weighted Euclidean distance between two feature vectors.
pub fn weighted_distance(weights: &FeatureVec, a: &FeatureVec, b: &FeatureVec) -> f64 {
    weights
        .iter()
        .zip(a.iter().zip(b.iter()))
        .map(|(w, (x, y))| w * (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}
