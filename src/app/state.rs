// VoteTally - app/state.rs
//
// Engine state: everything that mutates in response to events or expiry.
// Owned by `Engine` behind a single mutex; never held across platform calls.

use crate::app::store::DocumentStore;
use crate::core::aggregation::AggregationStore;
use crate::core::registry::SubmissionRegistry;
use crate::core::settings::ScopeSettings;
use crate::util::error::StoreError;

/// Registry, aggregates and scope settings, mutated together.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    /// Submissions currently open for voting.
    pub registry: SubmissionRegistry,

    /// Scored results for every scope.
    pub aggregation: AggregationStore,

    /// Per-scope channel, timer and vote key.
    pub settings: ScopeSettings,
}

impl EngineState {
    /// Load all documents from `store`. Any failure is fatal to startup.
    pub fn load(store: &DocumentStore, default_timer_hours: f64) -> Result<Self, StoreError> {
        Ok(Self {
            registry: store.load_registry()?,
            aggregation: store.load_aggregation()?,
            settings: store
                .load_settings()?
                .with_default_timer_hours(default_timer_hours),
        })
    }

    /// Write registry and aggregation, registry first.
    ///
    /// A crash or failed write between the two leaves a submission removed
    /// from the registry but not yet counted. It is never counted twice.
    pub fn persist(&self, store: &DocumentStore) -> Result<(), StoreError> {
        store.save_registry(&self.registry)?;
        store.save_aggregation(&self.aggregation)
    }
}
