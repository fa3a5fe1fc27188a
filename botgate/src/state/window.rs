// botgate/src/state/window.rs
//
// Sliding-window hit counter keyed by primary signature.
// DashMap of Arc<RwLock<window>> — safe across tokio tasks, per-signature lock.
//
// A window holds visit times, hashed path tokens, and the probabilities of
// past verdicts. Raw paths, UAs and addresses are never stored here; the
// signature itself is already non-reversible.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::config::WindowSettings;

pub fn path_token(path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

// ── Per-signature window ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Visit {
    pub at: DateTime<Utc>,
    pub path_token: u64,
}

#[derive(Debug)]
pub struct SignatureWindow {
    pub signature: String,
    pub visits: VecDeque<Visit>,
    pub verdicts: VecDeque<(DateTime<Utc>, f64)>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Feature vector from the previous clustering observation.
    pub last_features: Option<[f64; 18]>,
}

impl SignatureWindow {
    pub fn new(signature: &str, now: DateTime<Utc>) -> Self {
        Self {
            signature: signature.to_string(),
            visits: VecDeque::new(),
            verdicts: VecDeque::new(),
            first_seen: now,
            last_seen: now,
            last_features: None,
        }
    }

    pub fn record(&mut self, visit: Visit, max_visits: usize) {
        self.last_seen = visit.at;
        self.visits.push_back(visit);
        while self.visits.len() > max_visits {
            self.visits.pop_front();
        }
    }

    pub fn record_verdict(&mut self, probability: f64, max_visits: usize) {
        self.verdicts.push_back((Utc::now(), probability));
        while self.verdicts.len() > max_visits {
            self.verdicts.pop_front();
        }
    }

    pub fn visits_in(&self, seconds: i64) -> Vec<&Visit> {
        let cutoff = Utc::now() - Duration::seconds(seconds);
        self.visits.iter().filter(|v| v.at >= cutoff).collect()
    }

    pub fn hits_in(&self, seconds: i64) -> usize {
        self.visits_in(seconds).len()
    }

    /// Positive inter-arrival gaps in seconds, oldest first.
    pub fn interarrivals(&self, seconds: i64) -> Vec<f64> {
        let visits = self.visits_in(seconds);
        if visits.len() < 2 {
            return Vec::new();
        }
        visits
            .windows(2)
            .map(|w| (w[1].at - w[0].at).num_milliseconds() as f64 / 1000.0)
            .filter(|&d| d > 0.0)
            .collect()
    }

    pub fn rate_per_hour(&self, seconds: i64) -> f64 {
        let visits = self.visits_in(seconds);
        if visits.len() < 2 {
            return 0.0;
        }
        let span = (visits.last().unwrap().at - visits.first().unwrap().at)
            .num_seconds()
            .max(1) as f64;
        (visits.len() as f64 / span) * 3600.0
    }

    /// Shannon entropy of path tokens, normalised to [0,1].
    pub fn path_entropy(&self, seconds: i64) -> f64 {
        let visits = self.visits_in(seconds);
        if visits.len() < 2 {
            return 0.0;
        }
        let mut counts = std::collections::HashMap::new();
        for v in &visits {
            *counts.entry(v.path_token).or_insert(0usize) += 1;
        }
        if counts.len() < 2 {
            return 0.0;
        }
        let n = visits.len() as f64;
        let entropy: f64 = counts
            .values()
            .map(|&c| {
                let p = c as f64 / n;
                -p * p.ln()
            })
            .sum();
        entropy / (counts.len() as f64).ln()
    }

    pub fn distinct_path_ratio(&self, seconds: i64) -> f64 {
        let visits = self.visits_in(seconds);
        if visits.is_empty() {
            return 0.0;
        }
        let distinct: std::collections::HashSet<u64> =
            visits.iter().map(|v| v.path_token).collect();
        distinct.len() as f64 / visits.len() as f64
    }

    /// Fraction of recorded verdicts at or above the bot threshold.
    pub fn bot_ratio(&self, threshold: f64) -> f64 {
        if self.verdicts.is_empty() {
            return 0.0;
        }
        let bots = self.verdicts.iter().filter(|(_, p)| *p >= threshold).count();
        bots as f64 / self.verdicts.len() as f64
    }

    pub fn expire_old(&mut self, retention_secs: i64) {
        let cutoff = Utc::now() - Duration::seconds(retention_secs);
        while self.visits.front().map(|v| v.at < cutoff).unwrap_or(false) {
            self.visits.pop_front();
        }
        while self.verdicts.front().map(|(at, _)| *at < cutoff).unwrap_or(false) {
            self.verdicts.pop_front();
        }
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct SignatureStore {
    windows: DashMap<String, Arc<RwLock<SignatureWindow>>>,
    settings: WindowSettings,
    pub total_visits: AtomicU64,
}

impl SignatureStore {
    pub fn new(settings: WindowSettings) -> Self {
        Self {
            windows: DashMap::new(),
            settings,
            total_visits: AtomicU64::new(0),
        }
    }

    pub fn record_visit(&self, signature: &str, path: &str) -> Arc<RwLock<SignatureWindow>> {
        self.total_visits.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let window = self
            .windows
            .entry(signature.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(SignatureWindow::new(signature, now))))
            .clone();
        window.write().record(
            Visit {
                at: now,
                path_token: path_token(path),
            },
            self.settings.max_visits,
        );
        window
    }

    pub fn record_verdict(&self, signature: &str, probability: f64) {
        if let Some(window) = self.windows.get(signature) {
            window.write().record_verdict(probability, self.settings.max_visits);
        }
    }

    pub fn get(&self, signature: &str) -> Option<Arc<RwLock<SignatureWindow>>> {
        self.windows.get(signature).map(|w| w.clone())
    }

    pub fn hits_in(&self, signature: &str, seconds: i64) -> usize {
        self.get(signature)
            .map(|w| w.read().hits_in(seconds))
            .unwrap_or(0)
    }

    pub fn n_signatures(&self) -> usize {
        self.windows.len()
    }

    /// Expire stale visits, drop empty windows, enforce the signature cap by
    /// evicting the least recently seen.
    pub fn housekeeping(&self) {
        let retention = self.settings.retention_secs;
        self.windows.retain(|_, window| {
            let mut w = window.write();
            w.expire_old(retention);
            !w.visits.is_empty()
        });

        let over = self.windows.len().saturating_sub(self.settings.max_signatures);
        if over > 0 {
            let mut by_age: Vec<(String, DateTime<Utc>)> = self
                .windows
                .iter()
                .map(|e| (e.key().clone(), e.value().read().last_seen))
                .collect();
            by_age.sort_by_key(|(_, seen)| *seen);
            for (signature, _) in by_age.into_iter().take(over) {
                self.windows.remove(&signature);
            }
        }
    }

    pub async fn housekeeping_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            self.housekeeping();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SignatureStore {
        SignatureStore::new(WindowSettings::default())
    }

    #[test]
    fn visits_accumulate_per_signature() {
        let store = store();
        store.record_visit("sig-a", "/");
        store.record_visit("sig-a", "/login");
        store.record_visit("sig-b", "/");
        assert_eq!(store.hits_in("sig-a", 3600), 2);
        assert_eq!(store.hits_in("sig-b", 3600), 1);
        assert_eq!(store.hits_in("sig-c", 3600), 0);
        assert_eq!(store.n_signatures(), 2);
    }

    #[test]
    fn verdict_ratio_tracks_threshold() {
        let store = store();
        store.record_visit("sig", "/");
        store.record_verdict("sig", 0.9);
        store.record_verdict("sig", 0.8);
        store.record_verdict("sig", 0.1);
        let window = store.get("sig").unwrap();
        let ratio = window.read().bot_ratio(0.7);
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn path_entropy_low_for_single_path() {
        let store = store();
        for _ in 0..10 {
            store.record_visit("sig", "/api/v1/items");
        }
        let window = store.get("sig").unwrap();
        assert_eq!(window.read().path_entropy(3600), 0.0);
        assert_eq!(window.read().distinct_path_ratio(3600), 0.1);
    }

    #[test]
    fn visit_cap_is_enforced() {
        let settings = WindowSettings {
            max_visits: 8,
            ..WindowSettings::default()
        };
        let store = SignatureStore::new(settings);
        for i in 0..20 {
            store.record_visit("sig", &format!("/p/{i}"));
        }
        let window = store.get("sig").unwrap();
        assert_eq!(window.read().visits.len(), 8);
    }

    #[test]
    fn housekeeping_evicts_over_cap() {
        let settings = WindowSettings {
            max_signatures: 2,
            ..WindowSettings::default()
        };
        let store = SignatureStore::new(settings);
        store.record_visit("a", "/");
        store.record_visit("b", "/");
        store.record_visit("c", "/");
        store.housekeeping();
        assert_eq!(store.n_signatures(), 2);
    }
}
