use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Append-only record of a state-changing operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub detail: Value,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
        detail: Value,
    ) -> Self {
        AuditRecord {
            actor: actor.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
            detail,
            at: Utc::now(),
        }
    }
}

/// Destination for audit records.
///
/// Fire-and-forget: implementations must not fail or block the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Emits audit records as structured events on the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            actor = %record.actor,
            action = %record.action,
            resource_type = %record.resource_type,
            resource_id = %record.resource_id,
            detail = %record.detail,
            "audit"
        );
    }
}

/// Keeps audit records in memory (for assertions).
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Actions recorded so far, in order.
    pub fn actions(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.action.clone()).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}
