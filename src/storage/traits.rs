use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{
    ActionRequest, ActionStatus, AlertId, CaseEvent, CaseId, CaseStatus, CustomerNo,
    CustomerRiskState, EventId, FraudAlert, FraudCase, Priority, RequestId, WhitelistEntry,
    WhitelistId, WhitelistType,
};

/// Whitelist exceptions keyed by (type, value).
#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// Exact lookup, expired entries included.
    async fn find_whitelist(
        &self,
        entry_type: WhitelistType,
        value: &str,
    ) -> anyhow::Result<Option<WhitelistEntry>>;

    /// Replace any entry with the same (type, value).
    async fn replace_whitelist(&self, entry: &WhitelistEntry) -> anyhow::Result<()>;

    /// Returns false if no entry had this id.
    async fn delete_whitelist(&self, id: WhitelistId) -> anyhow::Result<bool>;

    /// Newest first.
    async fn list_whitelist(
        &self,
        entry_type: Option<WhitelistType>,
        limit: usize,
    ) -> anyhow::Result<Vec<WhitelistEntry>>;
}

/// Alerts, cases and case timelines.
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn insert_alert(&self, alert: &FraudAlert) -> anyhow::Result<()>;

    /// Look up the alert produced by a given rule for a given event.
    async fn find_alert(&self, event_id: &EventId, rule_id: &str)
        -> anyhow::Result<Option<FraudAlert>>;

    async fn set_alert_case(&self, alert_id: AlertId, case_id: CaseId) -> anyhow::Result<()>;

    async fn insert_case(&self, case: &FraudCase) -> anyhow::Result<()>;

    async fn get_case(&self, id: CaseId) -> anyhow::Result<Option<FraudCase>>;

    /// Most recently opened first.
    async fn list_customer_cases(
        &self,
        customer_no: &CustomerNo,
        limit: usize,
    ) -> anyhow::Result<Vec<FraudCase>>;

    async fn set_case_status(&self, id: CaseId, status: CaseStatus) -> anyhow::Result<()>;

    async fn set_case_priority(&self, id: CaseId, priority: Priority) -> anyhow::Result<()>;

    async fn append_case_event(&self, event: &CaseEvent) -> anyhow::Result<()>;

    /// Oldest first.
    async fn list_case_events(&self, case_id: CaseId, limit: usize)
        -> anyhow::Result<Vec<CaseEvent>>;
}

/// Filter for listing action requests.
#[derive(Debug, Clone)]
pub enum RequestFilter {
    Customer(CustomerNo),
    Status(ActionStatus),
}

/// Maker-checker action requests.
#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn insert_request(&self, request: &ActionRequest) -> anyhow::Result<()>;

    async fn get_request(&self, id: RequestId) -> anyhow::Result<Option<ActionRequest>>;

    /// Persist `request` if the stored version still equals `request.version`.
    ///
    /// Returns false on a version conflict. The stored version is bumped.
    async fn update_request(&self, request: &ActionRequest) -> anyhow::Result<bool>;

    /// Newest first.
    async fn list_requests(
        &self,
        filter: &RequestFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<ActionRequest>>;
}

/// Per-customer credit state.
#[async_trait]
pub trait RiskStore: Send + Sync {
    async fn get_risk(&self, customer_no: &CustomerNo) -> anyhow::Result<Option<CustomerRiskState>>;

    async fn put_risk(&self, state: &CustomerRiskState) -> anyhow::Result<()>;
}

/// Shared expiring counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add `delta` and return the new value.
    ///
    /// The expiry is set when the key is created, or re-created after it
    /// lapsed; later increments inside the window leave it alone.
    async fn incr_with_expiry(&self, key: &str, delta: i64, ttl: Duration) -> anyhow::Result<i64>;

    /// Current value, 0 for an absent or lapsed key.
    async fn get_counter(&self, key: &str) -> anyhow::Result<i64>;

    /// Create `key` with the given expiry unless it already exists.
    ///
    /// Returns true if this call created it.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;

    async fn delete_counter(&self, key: &str) -> anyhow::Result<()>;

    /// Drop every lapsed key and return how many were removed.
    async fn purge_expired_counters(&self) -> anyhow::Result<u64>;
}
