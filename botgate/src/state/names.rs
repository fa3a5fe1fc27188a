// botgate/src/state/names.rs
//
// Bounded FIFO of recently allocated bot names. The LLM classifier proposes
// names; duplicates within the window are rejected so downstream consumers
// never see two concurrent campaigns under the same label.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub const RECENT_NAMES_CAPACITY: usize = 200;

pub struct RecentNames {
    inner: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl RecentNames {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_NAMES_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Claim a name. Returns false when the name was already claimed within
    /// the window. Oldest entries drop first once the queue is full.
    pub fn try_claim(&self, name: &str) -> bool {
        let mut queue = self.inner.lock();
        if queue.iter().any(|n| n == name) {
            return false;
        }
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for RecentNames {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_rejected() {
        let names = RecentNames::new();
        assert!(names.try_claim("ScrapeWave"));
        assert!(!names.try_claim("ScrapeWave"));
        assert!(names.try_claim("NightCrawler"));
    }

    #[test]
    fn bounded_oldest_drops_first() {
        let names = RecentNames::with_capacity(3);
        for n in ["a", "b", "c", "d"] {
            assert!(names.try_claim(n));
        }
        assert_eq!(names.len(), 3);
        assert!(!names.contains("a"));
        assert!(names.contains("d"));
        // "a" fell out of the window, so it can be claimed again.
        assert!(names.try_claim("a"));
    }

    #[test]
    fn never_exceeds_capacity() {
        let names = RecentNames::new();
        for i in 0..500 {
            names.try_claim(&format!("bot-{i}"));
        }
        assert_eq!(names.len(), RECENT_NAMES_CAPACITY);
    }
}
