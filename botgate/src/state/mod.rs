// botgate/src/state/mod.rs
//
// The only cross-request mutable state the engine owns: the sliding-window
// hit counter, the adaptive clustering index, and the recent-names queue.
// Everything else lives and dies with a request context.

pub mod clusters;
pub mod features;
pub mod names;
pub mod weights;
pub mod window;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::llm::LlmProvider;

pub struct SharedState {
    pub windows: Arc<window::SignatureStore>,
    pub clusters: clusters::ClusterIndex,
    pub names: names::RecentNames,
    llm: RwLock<Option<Arc<dyn LlmProvider>>>,
}

impl SharedState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            windows: Arc::new(window::SignatureStore::new(config.window.clone())),
            clusters: clusters::ClusterIndex::new(&config.clustering),
            names: names::RecentNames::new(),
            llm: RwLock::new(None),
        }
    }

    pub fn set_llm_provider(&self, provider: Arc<dyn LlmProvider>) {
        *self.llm.write() = Some(provider);
    }

    pub fn llm_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.llm.read().clone()
    }
}
