use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::{AuditRecord, AuditSink};
use crate::domain::{
    CaseEvent, CaseEventType, CaseId, CaseStatus, CustomerNo, EventId, FraudAlert, FraudCase,
    NewAlert, Priority,
};
use crate::error::{FraudError, FraudResult};
use crate::locks::KeyedLocks;
use crate::observability::metrics;
use crate::storage::{CaseStore, CASE_SCAN_LIMIT, TIMELINE_LIMIT};

/// Alerts, cases and their timelines.
///
/// All timeline writes go through this component.
pub struct CaseManager {
    store: Arc<dyn CaseStore>,
    audit: Arc<dyn AuditSink>,
    customer_locks: KeyedLocks,
}

impl CaseManager {
    pub fn new(store: Arc<dyn CaseStore>, audit: Arc<dyn AuditSink>) -> Self {
        CaseManager {
            store,
            audit,
            customer_locks: KeyedLocks::new(),
        }
    }

    /// Insert a new alert. No deduplication happens here.
    pub async fn create_alert(&self, new_alert: NewAlert) -> FraudResult<FraudAlert> {
        let alert = new_alert.into_alert(Utc::now());
        self.store.insert_alert(&alert).await?;

        metrics::record_alert(alert.alert_type.as_str(), alert.severity.as_str());
        info!(
            alert_id = %alert.id,
            event_id = %alert.event_id,
            customer_no = %alert.customer_no,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            rule_id = %alert.rule_id,
            "Alert created"
        );

        Ok(alert)
    }

    /// Alert previously raised by `rule_id` for `event_id`, if any.
    pub async fn find_alert(&self, event_id: &EventId, rule_id: &str) -> FraudResult<Option<FraudAlert>> {
        Ok(self.store.find_alert(event_id, rule_id).await?)
    }

    pub async fn get_case(&self, case_id: CaseId) -> FraudResult<FraudCase> {
        self.store
            .get_case(case_id)
            .await?
            .ok_or_else(|| FraudError::not_found("case", case_id))
    }

    /// The customer's most recently opened case that is still OPEN or
    /// INVESTIGATING.
    pub async fn find_reusable_case(&self, customer_no: &CustomerNo) -> FraudResult<Option<FraudCase>> {
        let cases = self
            .store
            .list_customer_cases(customer_no, CASE_SCAN_LIMIT)
            .await?;
        Ok(cases.into_iter().find(|c| c.status.is_reusable()))
    }

    /// Reuse the customer's open case or open a new one.
    ///
    /// Serialized per customer, so concurrent detections for the same
    /// customer end up on one case. A reused case is escalated when the
    /// requested priority is more urgent; it is never lowered.
    pub async fn open_or_reuse_case(
        &self,
        customer_no: &CustomerNo,
        priority: Priority,
        summary: &str,
        evidence: Value,
        actor: &str,
    ) -> FraudResult<FraudCase> {
        let _guard = self.customer_locks.lock(customer_no.as_str()).await;

        if let Some(mut case) = self.find_reusable_case(customer_no).await? {
            debug!(case_id = %case.id, customer_no = %customer_no, "Reusing open case");
            if priority.outranks(case.priority) {
                self.escalate(&mut case, priority, actor).await?;
            }
            return Ok(case);
        }

        let case = FraudCase::open(customer_no.clone(), priority, summary, evidence, Utc::now());
        self.store.insert_case(&case).await?;
        self.append_event(
            case.id,
            CaseEventType::Status,
            "CASE_OPENED",
            actor,
            json!({ "priority": priority.as_str(), "summary": summary }),
        )
        .await?;

        metrics::record_case_opened(priority.as_str());
        info!(case_id = %case.id, customer_no = %customer_no, priority = %priority, "Case opened");
        self.audit.record(AuditRecord::new(
            actor,
            "OPEN_CASE",
            "CASE",
            case.id,
            json!({ "customerNo": customer_no.as_str(), "priority": priority.as_str() }),
        ));

        Ok(case)
    }

    async fn escalate(&self, case: &mut FraudCase, priority: Priority, actor: &str) -> FraudResult<()> {
        let from = case.priority;
        self.store.set_case_priority(case.id, priority).await?;
        case.priority = priority;

        self.append_event(
            case.id,
            CaseEventType::System,
            "PRIORITY_ESCALATED",
            actor,
            json!({ "from": from.as_str(), "to": priority.as_str() }),
        )
        .await?;
        info!(case_id = %case.id, from = %from, to = %priority, "Case priority escalated");

        Ok(())
    }

    /// Link an alert to a case and record it on the timeline.
    pub async fn attach_alert(&self, case_id: CaseId, alert: &FraudAlert, actor: &str) -> FraudResult<()> {
        self.store.set_alert_case(alert.id, case_id).await?;
        self.append_event(
            case_id,
            CaseEventType::Alert,
            alert.rule_id.clone(),
            actor,
            alert.evidence.clone(),
        )
        .await?;
        Ok(())
    }

    /// Overwrite the case status. Any status may follow any other.
    pub async fn update_status(
        &self,
        case_id: CaseId,
        status: CaseStatus,
        actor: &str,
    ) -> FraudResult<FraudCase> {
        let mut case = self.get_case(case_id).await?;
        let from = case.status;

        self.store.set_case_status(case_id, status).await?;
        case.status = status;

        self.append_event(
            case_id,
            CaseEventType::Status,
            "STATUS_CHANGE",
            actor,
            json!({ "from": from.as_str(), "to": status.as_str() }),
        )
        .await?;

        info!(case_id = %case_id, from = %from, to = %status, actor, "Case status updated");
        self.audit.record(AuditRecord::new(
            actor,
            "UPDATE_CASE_STATUS",
            "CASE",
            case_id,
            json!({ "from": from.as_str(), "to": status.as_str() }),
        ));

        Ok(case)
    }

    pub async fn add_note(&self, case_id: CaseId, actor: &str, note: &str) -> FraudResult<CaseEvent> {
        if note.trim().is_empty() {
            return Err(FraudError::InvalidArgument("note must not be empty".to_string()));
        }
        self.get_case(case_id).await?;

        let event = self
            .append_event(
                case_id,
                CaseEventType::Note,
                "ANALYST_NOTE",
                actor,
                json!({ "note": note }),
            )
            .await?;

        self.audit.record(AuditRecord::new(
            actor,
            "ADD_CASE_NOTE",
            "CASE",
            case_id,
            json!({ "note": note }),
        ));

        Ok(event)
    }

    /// Append a timeline entry.
    pub async fn append_event(
        &self,
        case_id: CaseId,
        event_type: CaseEventType,
        code: impl Into<String>,
        actor: &str,
        payload: Value,
    ) -> FraudResult<CaseEvent> {
        let event = CaseEvent::new(case_id, event_type, code, actor, payload);
        self.store.append_case_event(&event).await?;
        Ok(event)
    }

    /// Timeline entries in creation order.
    pub async fn timeline(&self, case_id: CaseId) -> FraudResult<Vec<CaseEvent>> {
        self.get_case(case_id).await?;
        Ok(self.store.list_case_events(case_id, TIMELINE_LIMIT).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::{AlertType, Severity};
    use crate::storage::MemoryStore;

    fn manager() -> (CaseManager, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        (
            CaseManager::new(Arc::new(MemoryStore::new()), audit.clone()),
            audit,
        )
    }

    fn customer() -> CustomerNo {
        CustomerNo::new("C1")
    }

    async fn open(manager: &CaseManager, priority: Priority) -> FraudCase {
        manager
            .open_or_reuse_case(&customer(), priority, "summary", json!({}), "system")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_then_reuse() {
        let (manager, audit) = manager();

        let first = open(&manager, Priority::P2).await;
        let second = open(&manager, Priority::P3).await;

        assert_eq!(first.id, second.id);
        assert_eq!(second.priority, Priority::P2);
        assert_eq!(audit.actions(), vec!["OPEN_CASE"]);

        let timeline = manager.timeline(first.id).await.unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].code, "CASE_OPENED");
        assert_eq!(timeline[0].event_type, CaseEventType::Status);
    }

    #[tokio::test]
    async fn test_closed_case_is_not_reused() {
        let (manager, _) = manager();

        let first = open(&manager, Priority::P1).await;
        manager
            .update_status(first.id, CaseStatus::Closed, "analyst")
            .await
            .unwrap();

        let second = open(&manager, Priority::P1).await;
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_investigating_case_is_reused() {
        let (manager, _) = manager();

        let first = open(&manager, Priority::P3).await;
        manager
            .update_status(first.id, CaseStatus::Investigating, "analyst")
            .await
            .unwrap();

        assert_eq!(open(&manager, Priority::P3).await.id, first.id);
    }

    #[tokio::test]
    async fn test_reuse_escalates_priority() {
        let (manager, _) = manager();

        let case = open(&manager, Priority::P3).await;
        let reused = open(&manager, Priority::P1).await;

        assert_eq!(reused.id, case.id);
        assert_eq!(reused.priority, Priority::P1);
        assert_eq!(manager.get_case(case.id).await.unwrap().priority, Priority::P1);

        let timeline = manager.timeline(case.id).await.unwrap();
        let escalation = timeline.last().unwrap();
        assert_eq!(escalation.event_type, CaseEventType::System);
        assert_eq!(escalation.code, "PRIORITY_ESCALATED");
        assert_eq!(escalation.payload["from"], "P3");
        assert_eq!(escalation.payload["to"], "P1");
    }

    #[tokio::test]
    async fn test_concurrent_open_creates_one_case() {
        let (manager, _) = manager();
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .open_or_reuse_case(&customer(), Priority::P2, "s", json!({}), "system")
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_alert_records_evidence() {
        let (manager, _) = manager();
        let case = open(&manager, Priority::P1).await;

        let alert = manager
            .create_alert(NewAlert {
                event_id: EventId::from_string("evt-1"),
                customer_no: customer(),
                alert_type: AlertType::Velocity,
                severity: Severity::High,
                rule_id: "velocity_rule_v1".to_string(),
                evidence: json!({ "eventId": "evt-1" }),
            })
            .await
            .unwrap();
        manager.attach_alert(case.id, &alert, "system").await.unwrap();

        let stored = manager
            .find_alert(&EventId::from_string("evt-1"), "velocity_rule_v1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.case_id, Some(case.id));

        let timeline = manager.timeline(case.id).await.unwrap();
        let entry = timeline.last().unwrap();
        assert_eq!(entry.event_type, CaseEventType::Alert);
        assert_eq!(entry.code, "velocity_rule_v1");
        assert_eq!(entry.payload["eventId"], "evt-1");
    }

    #[tokio::test]
    async fn test_status_change_and_note() {
        let (manager, audit) = manager();
        let case = open(&manager, Priority::P2).await;

        let updated = manager
            .update_status(case.id, CaseStatus::Actioned, "analyst")
            .await
            .unwrap();
        assert_eq!(updated.status, CaseStatus::Actioned);

        let note = manager
            .add_note(case.id, "analyst", "called the customer")
            .await
            .unwrap();
        assert_eq!(note.code, "ANALYST_NOTE");
        assert_eq!(note.payload["note"], "called the customer");

        let codes: Vec<_> = manager
            .timeline(case.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.code)
            .collect();
        assert_eq!(codes, vec!["CASE_OPENED", "STATUS_CHANGE", "ANALYST_NOTE"]);
        assert_eq!(
            audit.actions(),
            vec!["OPEN_CASE", "UPDATE_CASE_STATUS", "ADD_CASE_NOTE"]
        );
    }

    #[tokio::test]
    async fn test_unknown_case_is_not_found() {
        let (manager, _) = manager();
        let missing = CaseId::new();

        assert!(matches!(
            manager.update_status(missing, CaseStatus::Closed, "a").await,
            Err(FraudError::NotFound { .. })
        ));
        assert!(matches!(
            manager.add_note(missing, "a", "n").await,
            Err(FraudError::NotFound { .. })
        ));
        assert!(matches!(
            manager.timeline(missing).await,
            Err(FraudError::NotFound { .. })
        ));
    }
}
