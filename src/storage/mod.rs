pub mod memory;
pub mod postgres;
pub mod traits;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use traits::{ActionStore, CaseStore, CounterStore, RequestFilter, RiskStore, WhitelistStore};

/// Upper bound on a case timeline read.
pub const TIMELINE_LIMIT: usize = 500;

/// Upper bound on the cases scanned when looking for a reusable one.
pub const CASE_SCAN_LIMIT: usize = 50;

/// Upper bound on list endpoints.
pub const LIST_LIMIT: usize = 200;

/// Trait-object handles to every store, backed by one implementation.
#[derive(Clone)]
pub struct Stores {
    pub whitelist: Arc<dyn WhitelistStore>,
    pub cases: Arc<dyn CaseStore>,
    pub actions: Arc<dyn ActionStore>,
    pub risk: Arc<dyn RiskStore>,
    pub counters: Arc<dyn CounterStore>,
}

impl Stores {
    /// All stores backed by a single in-memory store.
    pub fn memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Self::from_shared(store.clone()), store)
    }

    /// All stores backed by PostgreSQL.
    pub fn postgres(store: Arc<PostgresStore>) -> Self {
        Self::from_shared(store)
    }

    fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: WhitelistStore + CaseStore + ActionStore + RiskStore + CounterStore + 'static,
    {
        Stores {
            whitelist: store.clone(),
            cases: store.clone(),
            actions: store.clone(),
            risk: store.clone(),
            counters: store,
        }
    }
}
