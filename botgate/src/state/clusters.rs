// botgate/src/state/clusters.rs
//
// Single-linkage clustering over signature feature vectors.
//
// Points are bounded; assignments are rebuilt lazily (union-find over all
// pairs under the link threshold) whenever a query follows an insert. The
// similarity metric is the weighted Euclidean distance under the adaptive
// weighter's current snapshot.

use std::collections::HashMap;

use parking_lot::RwLock;
use petgraph::unionfind::UnionFind;

use crate::config::ClusteringSettings;
use crate::state::features::FeatureVec;
use crate::state::weights::{weighted_distance, AdaptiveSimilarityWeighter};

#[derive(Debug, Clone)]
pub struct ClusterPoint {
    pub signature: String,
    pub features: FeatureVec,
    pub bot_votes: u32,
    pub human_votes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSummary {
    pub size: usize,
    pub bot_fraction: f64,
}

struct ClusterInner {
    points: Vec<ClusterPoint>,
    assignments: Vec<usize>,
    dirty: bool,
}

pub struct ClusterIndex {
    pub weighter: AdaptiveSimilarityWeighter,
    inner: RwLock<ClusterInner>,
    link_threshold: f64,
    max_points: usize,
}

impl ClusterIndex {
    pub fn new(settings: &ClusteringSettings) -> Self {
        Self {
            weighter: AdaptiveSimilarityWeighter::new(settings.shift_threshold),
            inner: RwLock::new(ClusterInner {
                points: Vec::new(),
                assignments: Vec::new(),
                dirty: false,
            }),
            link_threshold: settings.link_threshold,
            max_points: settings.max_points,
        }
    }

    /// Record one observation for a signature and fold its verdict into the
    /// cluster vote. Triggers a weight recompute over all stored vectors.
    pub fn observe(&self, signature: &str, features: FeatureVec, is_bot: bool) {
        let vectors: Vec<FeatureVec> = {
            let mut inner = self.inner.write();
            match inner.points.iter_mut().find(|p| p.signature == signature) {
                Some(point) => {
                    point.features = features;
                    if is_bot {
                        point.bot_votes += 1;
                    } else {
                        point.human_votes += 1;
                    }
                }
                None => {
                    if inner.points.len() == self.max_points {
                        inner.points.remove(0);
                    }
                    inner.points.push(ClusterPoint {
                        signature: signature.to_string(),
                        features,
                        bot_votes: is_bot as u32,
                        human_votes: !is_bot as u32,
                    });
                }
            }
            inner.dirty = true;
            inner.points.iter().map(|p| p.features).collect()
        };
        self.weighter.compute_weights(&vectors);
    }

    /// Cluster the signature belongs to, if it has been observed and links
    /// to at least one other point.
    pub fn cluster_of(&self, signature: &str) -> Option<ClusterSummary> {
        self.rebuild_if_dirty();
        let inner = self.inner.read();
        let idx = inner.points.iter().position(|p| p.signature == signature)?;
        let root = inner.assignments[idx];

        let mut size = 0usize;
        let mut bot = 0u64;
        let mut total = 0u64;
        for (i, point) in inner.points.iter().enumerate() {
            if inner.assignments[i] == root {
                size += 1;
                bot += point.bot_votes as u64;
                total += (point.bot_votes + point.human_votes) as u64;
            }
        }
        if size < 2 {
            return None;
        }
        Some(ClusterSummary {
            size,
            bot_fraction: if total > 0 { bot as f64 / total as f64 } else { 0.0 },
        })
    }

    pub fn n_points(&self) -> usize {
        self.inner.read().points.len()
    }

    pub fn n_clusters(&self) -> usize {
        self.rebuild_if_dirty();
        let inner = self.inner.read();
        let mut sizes: HashMap<usize, usize> = HashMap::new();
        for &root in &inner.assignments {
            *sizes.entry(root).or_insert(0) += 1;
        }
        sizes.values().filter(|&&s| s >= 2).count()
    }

    fn rebuild_if_dirty(&self) {
        let mut inner = self.inner.write();
        if !inner.dirty {
            return;
        }
        let weights = self.weighter.weights();
        let n = inner.points.len();
        let mut uf = UnionFind::<usize>::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let d = weighted_distance(&weights, &inner.points[i].features, &inner.points[j].features);
                if d < self.link_threshold {
                    uf.union(i, j);
                }
            }
        }
        inner.assignments = (0..n).map(|i| uf.find(i)).collect();
        inner.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::features::FEATURE_COUNT;

    fn settings() -> ClusteringSettings {
        ClusteringSettings {
            link_threshold: 0.1,
            shift_threshold: 0.05,
            max_points: 16,
        }
    }

    fn point(offset: f64) -> FeatureVec {
        let mut v = [0.0; FEATURE_COUNT];
        v[0] = offset;
        v[1] = offset;
        v
    }

    #[test]
    fn nearby_points_form_a_cluster() {
        let index = ClusterIndex::new(&settings());
        index.observe("a", point(0.50), true);
        index.observe("b", point(0.51), true);
        index.observe("c", point(0.52), false);
        index.observe("far", point(0.95), false);

        let summary = index.cluster_of("a").expect("a clusters with b and c");
        assert_eq!(summary.size, 3);
        assert!((summary.bot_fraction - 2.0 / 3.0).abs() < 1e-9);
        assert!(index.cluster_of("far").is_none());
    }

    #[test]
    fn repeat_observations_update_votes() {
        let index = ClusterIndex::new(&settings());
        index.observe("a", point(0.50), true);
        index.observe("b", point(0.51), true);
        index.observe("a", point(0.50), true);
        let summary = index.cluster_of("b").unwrap();
        assert_eq!(summary.size, 2);
        assert_eq!(summary.bot_fraction, 1.0);
    }

    #[test]
    fn point_cap_evicts_oldest() {
        let cfg = ClusteringSettings {
            max_points: 2,
            ..settings()
        };
        let index = ClusterIndex::new(&cfg);
        index.observe("a", point(0.1), true);
        index.observe("b", point(0.5), true);
        index.observe("c", point(0.9), true);
        assert_eq!(index.n_points(), 2);
        assert!(index.cluster_of("a").is_none());
    }
}
