use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::{
    ActionRequest, AlertId, CaseEvent, CaseId, CaseStatus, CustomerNo, CustomerRiskState,
    EventId, FraudAlert, FraudCase, Priority, RequestId, WhitelistEntry, WhitelistId,
    WhitelistType,
};

use super::traits::{
    ActionStore, CaseStore, CounterStore, RequestFilter, RiskStore, WhitelistStore,
};

/// Map size at which inserts first sweep out lapsed counters.
pub const COUNTER_SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Counter {
    value: i64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    entries: HashMap<String, Counter>,
    sweep_at: usize,
}

impl Counters {
    /// Sweep before an insert once the map has grown past the last sweep.
    fn sweep_if_due(&mut self, now: Instant) {
        if self.entries.len() < self.sweep_at.max(COUNTER_SWEEP_THRESHOLD) {
            return;
        }
        self.purge(now);
        // Back off while live keys dominate.
        self.sweep_at = self.entries.len() * 2;
    }

    fn purge(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, c| c.expires_at > now);
        before - self.entries.len()
    }
}

/// In-memory store for tests and single-process deployments.
///
/// Counter expiry follows the tokio clock, so paused-time tests can
/// advance through a velocity window.
#[derive(Debug, Default)]
pub struct MemoryStore {
    whitelist: Mutex<Vec<WhitelistEntry>>,
    alerts: Mutex<Vec<FraudAlert>>,
    cases: Mutex<Vec<FraudCase>>,
    case_events: Mutex<Vec<CaseEvent>>,
    requests: Mutex<HashMap<RequestId, ActionRequest>>,
    risk: Mutex<HashMap<String, CustomerRiskState>>,
    counters: Mutex<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored alerts (for assertions).
    pub fn alerts(&self) -> Vec<FraudAlert> {
        self.alerts.lock().clone()
    }

    /// All stored cases (for assertions).
    pub fn cases(&self) -> Vec<FraudCase> {
        self.cases.lock().clone()
    }

    /// Number of counter keys held, lapsed ones included.
    pub fn counter_len(&self) -> usize {
        self.counters.lock().entries.len()
    }
}

#[async_trait]
impl WhitelistStore for MemoryStore {
    async fn find_whitelist(
        &self,
        entry_type: WhitelistType,
        value: &str,
    ) -> anyhow::Result<Option<WhitelistEntry>> {
        Ok(self
            .whitelist
            .lock()
            .iter()
            .find(|e| e.entry_type == entry_type && e.value == value)
            .cloned())
    }

    async fn replace_whitelist(&self, entry: &WhitelistEntry) -> anyhow::Result<()> {
        let mut whitelist = self.whitelist.lock();
        whitelist.retain(|e| !(e.entry_type == entry.entry_type && e.value == entry.value));
        whitelist.push(entry.clone());
        Ok(())
    }

    async fn delete_whitelist(&self, id: WhitelistId) -> anyhow::Result<bool> {
        let mut whitelist = self.whitelist.lock();
        let before = whitelist.len();
        whitelist.retain(|e| e.id != id);
        Ok(whitelist.len() != before)
    }

    async fn list_whitelist(
        &self,
        entry_type: Option<WhitelistType>,
        limit: usize,
    ) -> anyhow::Result<Vec<WhitelistEntry>> {
        let mut entries: Vec<_> = self
            .whitelist
            .lock()
            .iter()
            .filter(|e| entry_type.map_or(true, |t| e.entry_type == t))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn insert_alert(&self, alert: &FraudAlert) -> anyhow::Result<()> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }

    async fn find_alert(
        &self,
        event_id: &EventId,
        rule_id: &str,
    ) -> anyhow::Result<Option<FraudAlert>> {
        Ok(self
            .alerts
            .lock()
            .iter()
            .find(|a| &a.event_id == event_id && a.rule_id == rule_id)
            .cloned())
    }

    async fn set_alert_case(&self, alert_id: AlertId, case_id: CaseId) -> anyhow::Result<()> {
        if let Some(alert) = self.alerts.lock().iter_mut().find(|a| a.id == alert_id) {
            alert.case_id = Some(case_id);
        }
        Ok(())
    }

    async fn insert_case(&self, case: &FraudCase) -> anyhow::Result<()> {
        self.cases.lock().push(case.clone());
        Ok(())
    }

    async fn get_case(&self, id: CaseId) -> anyhow::Result<Option<FraudCase>> {
        Ok(self.cases.lock().iter().find(|c| c.id == id).cloned())
    }

    async fn list_customer_cases(
        &self,
        customer_no: &CustomerNo,
        limit: usize,
    ) -> anyhow::Result<Vec<FraudCase>> {
        let mut cases: Vec<_> = self
            .cases
            .lock()
            .iter()
            .filter(|c| &c.customer_no == customer_no)
            .cloned()
            .collect();
        // Insertion order breaks ties between cases opened in the same instant.
        cases.reverse();
        cases.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        cases.truncate(limit);
        Ok(cases)
    }

    async fn set_case_status(&self, id: CaseId, status: CaseStatus) -> anyhow::Result<()> {
        if let Some(case) = self.cases.lock().iter_mut().find(|c| c.id == id) {
            case.status = status;
        }
        Ok(())
    }

    async fn set_case_priority(&self, id: CaseId, priority: Priority) -> anyhow::Result<()> {
        if let Some(case) = self.cases.lock().iter_mut().find(|c| c.id == id) {
            case.priority = priority;
        }
        Ok(())
    }

    async fn append_case_event(&self, event: &CaseEvent) -> anyhow::Result<()> {
        self.case_events.lock().push(event.clone());
        Ok(())
    }

    async fn list_case_events(
        &self,
        case_id: CaseId,
        limit: usize,
    ) -> anyhow::Result<Vec<CaseEvent>> {
        Ok(self
            .case_events
            .lock()
            .iter()
            .filter(|e| e.case_id == case_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn insert_request(&self, request: &ActionRequest) -> anyhow::Result<()> {
        self.requests.lock().insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> anyhow::Result<Option<ActionRequest>> {
        Ok(self.requests.lock().get(&id).cloned())
    }

    async fn update_request(&self, request: &ActionRequest) -> anyhow::Result<bool> {
        let mut requests = self.requests.lock();
        match requests.get_mut(&request.id) {
            Some(stored) if stored.version == request.version => {
                *stored = request.clone();
                stored.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<ActionRequest>> {
        let mut requests: Vec<_> = self
            .requests
            .lock()
            .values()
            .filter(|r| match filter {
                RequestFilter::Customer(customer_no) => &r.customer_no == customer_no,
                RequestFilter::Status(status) => &r.status == status,
            })
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        requests.truncate(limit);
        Ok(requests)
    }
}

#[async_trait]
impl RiskStore for MemoryStore {
    async fn get_risk(&self, customer_no: &CustomerNo) -> anyhow::Result<Option<CustomerRiskState>> {
        Ok(self.risk.lock().get(customer_no.as_str()).cloned())
    }

    async fn put_risk(&self, state: &CustomerRiskState) -> anyhow::Result<()> {
        self.risk
            .lock()
            .insert(state.customer_no.as_str().to_string(), state.clone());
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr_with_expiry(&self, key: &str, delta: i64, ttl: Duration) -> anyhow::Result<i64> {
        let now = Instant::now();
        let mut guard = self.counters.lock();
        let counters = &mut *guard;
        if !counters.entries.contains_key(key) {
            counters.sweep_if_due(now);
        }
        let counter = counters.entries.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: now + ttl,
        });
        if counter.expires_at <= now {
            *counter = Counter {
                value: 0,
                expires_at: now + ttl,
            };
        }
        counter.value += delta;
        Ok(counter.value)
    }

    async fn get_counter(&self, key: &str) -> anyhow::Result<i64> {
        let now = Instant::now();
        Ok(self
            .counters
            .lock()
            .entries
            .get(key)
            .filter(|c| c.expires_at > now)
            .map_or(0, |c| c.value))
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let now = Instant::now();
        let mut guard = self.counters.lock();
        let counters = &mut *guard;
        match counters.entries.get(key) {
            Some(existing) if existing.expires_at > now => return Ok(false),
            Some(_) => {}
            None => counters.sweep_if_due(now),
        }
        counters.entries.insert(
            key.to_string(),
            Counter {
                value: 1,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_counter(&self, key: &str) -> anyhow::Result<()> {
        self.counters.lock().entries.remove(key);
        Ok(())
    }

    async fn purge_expired_counters(&self) -> anyhow::Result<u64> {
        let removed = self.counters.lock().purge(Instant::now());
        Ok(removed as u64)
    }
}
