//! Application state for the compliance API

use compliance_graph::GraphStore;

use crate::trigger::ScanTrigger;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: GraphStore,
    /// Serve empty reads instead of 503 while the store is unavailable
    pub degraded_reads: bool,
    pub trigger: ScanTrigger,
}

impl AppState {
    pub fn new(store: GraphStore, trigger: ScanTrigger) -> Self {
        Self {
            store,
            degraded_reads: false,
            trigger,
        }
    }

    pub fn with_degraded_reads(mut self, enabled: bool) -> Self {
        self.degraded_reads = enabled;
        self
    }
}
