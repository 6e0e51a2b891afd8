use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cases::CaseManager;
use crate::domain::{
    AlertId, AlertType, CaseId, Evidence, EventId, NewAlert, Priority, RecommendedAction,
    RuleMatch, Severity, TransactionEvent, WhitelistDecision, SYSTEM_ACTOR,
};
use crate::error::{FraudError, FraudResult};
use crate::observability::metrics;
use crate::policy::PolicyEvaluator;
use crate::risk::CreditRiskStore;
use crate::velocity::VelocityLimiter;
use crate::whitelist::WhitelistResolver;

/// Rule id recorded on velocity alerts.
pub const VELOCITY_RULE_ID: &str = "velocity_rule_v1";

const VELOCITY_SUMMARY: &str = "Velocity rule violated (high frequency / amount burst)";
const VELOCITY_BLOCK_REASON: &str = "Velocity rule violated";

/// What processing one event produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub event_id: EventId,
    /// A hard-bypass whitelist entry stopped processing
    pub bypassed: bool,
    pub alerts: Vec<AlertId>,
    pub cases: Vec<CaseId>,
    pub credit_blocked: bool,
}

/// One detection to materialize as alert, case link and optional block.
struct Detection {
    rule_id: String,
    alert_type: AlertType,
    severity: Severity,
    priority: Priority,
    summary: String,
    evidence: Value,
    block_reason: Option<String>,
}

impl Detection {
    fn velocity(evidence: Value, block_allowed: bool) -> Self {
        Detection {
            rule_id: VELOCITY_RULE_ID.to_string(),
            alert_type: AlertType::Velocity,
            severity: Severity::High,
            priority: Priority::P1,
            summary: VELOCITY_SUMMARY.to_string(),
            evidence,
            block_reason: block_allowed.then(|| VELOCITY_BLOCK_REASON.to_string()),
        }
    }

    fn rule(hit: &RuleMatch, evidence: Value, block_allowed: bool) -> Self {
        let alert_type = if hit.rule_type.is_betting() {
            AlertType::BettingExposure
        } else {
            AlertType::AmlPattern
        };
        let blocks = block_allowed && hit.action == RecommendedAction::BlockCredit;

        Detection {
            rule_id: hit.id.clone(),
            alert_type,
            severity: hit.severity,
            priority: hit.severity.priority(),
            summary: format!("{} severity rule hit: {}", hit.severity, hit.id),
            evidence,
            block_reason: blocks.then(|| format!("Policy hit: {}", hit.id)),
        }
    }
}

/// Runs one transaction event through whitelist, velocity and policy
/// checks and records the resulting alerts, cases and blocks.
///
/// Every write is safe to repeat: a redelivered event finds its alerts
/// by (event id, rule id) and does not re-count velocity. The caller
/// acknowledges the event only when `process` returns `Ok`.
pub struct DetectionPipeline {
    whitelist: Arc<WhitelistResolver>,
    velocity: Arc<VelocityLimiter>,
    policy: PolicyEvaluator,
    cases: Arc<CaseManager>,
    risk: Arc<CreditRiskStore>,
    deadline: Duration,
}

impl DetectionPipeline {
    pub fn new(
        whitelist: Arc<WhitelistResolver>,
        velocity: Arc<VelocityLimiter>,
        policy: PolicyEvaluator,
        cases: Arc<CaseManager>,
        risk: Arc<CreditRiskStore>,
        deadline: Duration,
    ) -> Self {
        DetectionPipeline {
            whitelist,
            velocity,
            policy,
            cases,
            risk,
            deadline,
        }
    }

    /// Process one event within the configured deadline.
    pub async fn process(&self, event: &TransactionEvent) -> FraudResult<PipelineOutcome> {
        let result = tokio::time::timeout(self.deadline, self.run(event))
            .await
            .map_err(FraudError::from)
            .and_then(|r| r);

        match &result {
            Ok(_) => metrics::record_event_processed(),
            Err(e) => {
                metrics::record_event_failed();
                warn!(event_id = %event.event_id, error = %e, "Event processing failed");
            }
        }

        result
    }

    #[instrument(skip_all, fields(event_id = %event.event_id, customer_no = %event.customer_no))]
    async fn run(&self, event: &TransactionEvent) -> FraudResult<PipelineOutcome> {
        event.validate()?;

        let mut outcome = PipelineOutcome {
            event_id: event.event_id.clone(),
            ..Default::default()
        };

        let decision = self.whitelist.evaluate(event).await?;
        if decision.is_hard_bypass() {
            info!(
                match_type = ?decision.match_type,
                match_value = %decision.match_value,
                "Hard whitelist bypass, skipping detection"
            );
            outcome.bypassed = true;
            return Ok(outcome);
        }
        let block_allowed = decision.block_allowed();

        let mut failures: Vec<FraudError> = Vec::new();

        let verdict = self.velocity.register_and_check(event).await?;
        if verdict.violated {
            let evidence = Evidence::velocity(event, verdict, &decision).to_value();
            let detection = Detection::velocity(evidence, block_allowed);
            if let Err(e) = self.materialize(event, detection, &mut outcome).await {
                failures.push(e);
            }
        }

        for hit in self.policy.evaluate(event) {
            if let Err(e) = self.handle_rule_match(event, &hit, &decision, block_allowed, &mut outcome).await {
                warn!(rule_id = %hit.id, error = %e, "Failed to record rule match");
                failures.push(e);
            }
        }

        // Report the first failure only after every match had its chance.
        match failures.into_iter().next() {
            Some(e) => Err(e),
            None => {
                debug!(
                    alerts = outcome.alerts.len(),
                    credit_blocked = outcome.credit_blocked,
                    "Event processed"
                );
                Ok(outcome)
            }
        }
    }

    async fn handle_rule_match(
        &self,
        event: &TransactionEvent,
        hit: &RuleMatch,
        decision: &WhitelistDecision,
        block_allowed: bool,
        outcome: &mut PipelineOutcome,
    ) -> FraudResult<()> {
        if self.whitelist.is_rule_whitelisted(&hit.id).await? {
            debug!(rule_id = %hit.id, "Rule whitelisted, match suppressed");
            return Ok(());
        }

        let evidence = Evidence::rule(event, hit, decision).to_value();
        self.materialize(event, Detection::rule(hit, evidence, block_allowed), outcome)
            .await
    }

    async fn materialize(
        &self,
        event: &TransactionEvent,
        detection: Detection,
        outcome: &mut PipelineOutcome,
    ) -> FraudResult<()> {
        let alert = match self
            .cases
            .find_alert(&event.event_id, &detection.rule_id)
            .await?
        {
            Some(existing) => {
                debug!(alert_id = %existing.id, rule_id = %detection.rule_id, "Alert already recorded");
                existing
            }
            None => {
                self.cases
                    .create_alert(NewAlert {
                        event_id: event.event_id.clone(),
                        customer_no: event.customer_no.clone(),
                        alert_type: detection.alert_type,
                        severity: detection.severity,
                        rule_id: detection.rule_id.clone(),
                        evidence: detection.evidence.clone(),
                    })
                    .await?
            }
        };
        outcome.alerts.push(alert.id);

        let case_id = match alert.case_id {
            Some(case_id) => case_id,
            None => {
                let case = self
                    .cases
                    .open_or_reuse_case(
                        &event.customer_no,
                        detection.priority,
                        &detection.summary,
                        detection.evidence,
                        SYSTEM_ACTOR,
                    )
                    .await?;
                self.cases.attach_alert(case.id, &alert, SYSTEM_ACTOR).await?;
                case.id
            }
        };
        if !outcome.cases.contains(&case_id) {
            outcome.cases.push(case_id);
        }

        if let Some(reason) = detection.block_reason {
            self.risk
                .block_credit(&event.customer_no, &reason, SYSTEM_ACTOR)
                .await?;
            outcome.credit_blocked = true;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::{CustomerNo, Policy, RuleDef, RuleType, WhitelistType, WhitelistUpsert};
    use crate::observability::tracing::init_test_tracing;
    use crate::rules::RuleSet;
    use crate::domain::{
        AlertId, CaseEvent, CaseId, CaseStatus, EventId, FraudAlert, FraudCase,
    };
    use crate::storage::{CaseStore, MemoryStore};
    use crate::velocity::VelocityConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Case store whose alert inserts fail for one rule id.
    struct FailingAlerts {
        inner: Arc<MemoryStore>,
        failing_rule: Mutex<Option<String>>,
    }

    #[async_trait]
    impl CaseStore for FailingAlerts {
        async fn insert_alert(&self, alert: &FraudAlert) -> anyhow::Result<()> {
            if self.failing_rule.lock().as_deref() == Some(alert.rule_id.as_str()) {
                anyhow::bail!("alert insert failed for {}", alert.rule_id);
            }
            self.inner.insert_alert(alert).await
        }

        async fn find_alert(
            &self,
            event_id: &EventId,
            rule_id: &str,
        ) -> anyhow::Result<Option<FraudAlert>> {
            self.inner.find_alert(event_id, rule_id).await
        }

        async fn set_alert_case(&self, alert_id: AlertId, case_id: CaseId) -> anyhow::Result<()> {
            self.inner.set_alert_case(alert_id, case_id).await
        }

        async fn insert_case(&self, case: &FraudCase) -> anyhow::Result<()> {
            self.inner.insert_case(case).await
        }

        async fn get_case(&self, id: CaseId) -> anyhow::Result<Option<FraudCase>> {
            self.inner.get_case(id).await
        }

        async fn list_customer_cases(
            &self,
            customer_no: &CustomerNo,
            limit: usize,
        ) -> anyhow::Result<Vec<FraudCase>> {
            self.inner.list_customer_cases(customer_no, limit).await
        }

        async fn set_case_status(&self, id: CaseId, status: CaseStatus) -> anyhow::Result<()> {
            self.inner.set_case_status(id, status).await
        }

        async fn set_case_priority(&self, id: CaseId, priority: Priority) -> anyhow::Result<()> {
            self.inner.set_case_priority(id, priority).await
        }

        async fn append_case_event(&self, event: &CaseEvent) -> anyhow::Result<()> {
            self.inner.append_case_event(event).await
        }

        async fn list_case_events(
            &self,
            case_id: CaseId,
            limit: usize,
        ) -> anyhow::Result<Vec<CaseEvent>> {
            self.inner.list_case_events(case_id, limit).await
        }
    }

    struct Fixture {
        pipeline: DetectionPipeline,
        store: Arc<MemoryStore>,
        whitelist: Arc<WhitelistResolver>,
        risk: Arc<CreditRiskStore>,
    }

    fn rule(id: &str, rule_type: RuleType, value: &str, severity: Severity, action: RecommendedAction) -> RuleDef {
        RuleDef {
            id: id.to_string(),
            rule_type,
            value: value.to_string(),
            severity,
            action,
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        fixture_with(store.clone(), store)
    }

    fn fixture_with(store: Arc<MemoryStore>, case_store: Arc<dyn CaseStore>) -> Fixture {
        init_test_tracing();
        let audit = Arc::new(MemoryAuditSink::new());
        let whitelist = Arc::new(WhitelistResolver::new(store.clone(), audit.clone()));
        let velocity = Arc::new(VelocityLimiter::new(store.clone(), VelocityConfig::default()));
        let policy = PolicyEvaluator::fixed(RuleSet::from_policy(&Policy {
            version: "test".to_string(),
            rules: vec![
                rule("betting_iban_tr99", RuleType::BettingIbanPrefix, "TR99", Severity::High, RecommendedAction::BlockCredit),
                rule("kw_betting", RuleType::Keyword, "betting", Severity::Medium, RecommendedAction::AlertOnly),
            ],
        }));
        let cases = Arc::new(CaseManager::new(case_store, audit.clone()));
        let risk = Arc::new(CreditRiskStore::new(store.clone(), audit));
        let pipeline = DetectionPipeline::new(
            whitelist.clone(),
            velocity,
            policy,
            cases,
            risk.clone(),
            Duration::from_secs(5),
        );
        Fixture {
            pipeline,
            store,
            whitelist,
            risk,
        }
    }

    fn customer() -> CustomerNo {
        CustomerNo::new("C1")
    }

    #[tokio::test]
    async fn test_clean_event_produces_nothing() {
        let f = fixture();
        let outcome = f
            .pipeline
            .process(&TransactionEvent::new(customer(), 100))
            .await
            .unwrap();

        assert!(outcome.alerts.is_empty());
        assert!(f.store.cases().is_empty());
        assert!(!outcome.credit_blocked);
    }

    #[tokio::test]
    async fn test_policy_block_and_alert_types() {
        let f = fixture();
        let event = TransactionEvent::new(customer(), 100)
            .with_to_account("TR990001")
            .with_description("Betting suspected");

        let outcome = f.pipeline.process(&event).await.unwrap();

        assert_eq!(outcome.alerts.len(), 2);
        assert_eq!(outcome.cases.len(), 1);
        assert!(outcome.credit_blocked);

        let alerts = f.store.alerts();
        assert_eq!(alerts[0].alert_type, AlertType::BettingExposure);
        assert_eq!(alerts[1].alert_type, AlertType::AmlPattern);
        assert!(alerts.iter().all(|a| a.case_id == Some(outcome.cases[0])));

        let state = f.risk.get(&customer()).await.unwrap();
        assert_eq!(state.block_reason, "Policy hit: betting_iban_tr99");

        let case = &f.store.cases()[0];
        assert_eq!(case.priority, Priority::P1);
        assert_eq!(case.summary, "HIGH severity rule hit: betting_iban_tr99");
    }

    #[tokio::test]
    async fn test_failed_match_does_not_suppress_others() {
        let store = Arc::new(MemoryStore::new());
        let case_store = Arc::new(FailingAlerts {
            inner: store.clone(),
            failing_rule: Mutex::new(Some("betting_iban_tr99".to_string())),
        });
        let f = fixture_with(store, case_store.clone());
        let event = TransactionEvent::new(customer(), 100)
            .with_event_id("evt-partial")
            .with_to_account("TR990001")
            .with_description("Betting suspected");

        let result = f.pipeline.process(&event).await;
        assert!(matches!(result, Err(FraudError::Unavailable(_))));

        let alerts = f.store.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, "kw_betting");
        assert_eq!(f.store.cases().len(), 1);
        assert_eq!(alerts[0].case_id, Some(f.store.cases()[0].id));
        assert!(!f.risk.get(&customer()).await.unwrap().credit_blocked);

        // Redelivery completes the missing match and reuses the rest.
        *case_store.failing_rule.lock() = None;
        let outcome = f.pipeline.process(&event).await.unwrap();

        assert_eq!(outcome.alerts.len(), 2);
        assert_eq!(f.store.alerts().len(), 2);
        assert_eq!(f.store.cases().len(), 1);
        assert!(outcome.credit_blocked);
    }

    #[tokio::test]
    async fn test_blank_identifiers_have_no_effects() {
        let f = fixture();
        let no_id = TransactionEvent::new(customer(), 100_000)
            .with_event_id("")
            .with_description("betting");
        let no_customer = TransactionEvent::new(CustomerNo::new(" "), 100_000)
            .with_description("betting");

        for event in [no_id, no_customer] {
            let result = f.pipeline.process(&event).await;
            assert!(matches!(result, Err(FraudError::InvalidArgument(_))));
        }

        assert!(f.store.alerts().is_empty());
        assert!(f.store.cases().is_empty());
        assert_eq!(f.store.counter_len(), 0);
    }

    #[tokio::test]
    async fn test_alert_only_rule_does_not_block() {
        let f = fixture();
        let event = TransactionEvent::new(customer(), 100).with_description("betting");

        let outcome = f.pipeline.process(&event).await.unwrap();

        assert_eq!(outcome.alerts.len(), 1);
        assert!(!outcome.credit_blocked);
        assert_eq!(f.store.cases()[0].priority, Priority::P2);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let f = fixture();
        let event = TransactionEvent::new(customer(), 100)
            .with_event_id("evt-dup")
            .with_to_account("TR990001");

        let first = f.pipeline.process(&event).await.unwrap();
        let second = f.pipeline.process(&event).await.unwrap();

        assert_eq!(first.alerts, second.alerts);
        assert_eq!(f.store.alerts().len(), 1);
        assert_eq!(f.store.cases().len(), 1);
    }

    #[tokio::test]
    async fn test_rule_whitelist_suppresses_single_match() {
        let f = fixture();
        f.whitelist
            .upsert(WhitelistUpsert {
                entry_type: WhitelistType::RuleId,
                value: "betting_iban_tr99".to_string(),
                hard_bypass: false,
                reason: "tuning".to_string(),
                created_by: "ops".to_string(),
                ticket_ref: None,
                expires_at: None,
            })
            .await
            .unwrap();

        let event = TransactionEvent::new(customer(), 100)
            .with_to_account("TR990001")
            .with_description("betting");
        let outcome = f.pipeline.process(&event).await.unwrap();

        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(f.store.alerts()[0].rule_id, "kw_betting");
        assert!(!outcome.credit_blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_velocity_alert_evidence() {
        let f = fixture();

        let outcome = f
            .pipeline
            .process(&TransactionEvent::new(customer(), 100_000))
            .await
            .unwrap();

        assert!(outcome.credit_blocked);
        let alert = &f.store.alerts()[0];
        assert_eq!(alert.rule_id, VELOCITY_RULE_ID);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.evidence["velocity"]["violated"], true);
        assert_eq!(alert.evidence["whitelist"]["active"], false);
        assert_eq!(
            f.risk.get(&customer()).await.unwrap().block_reason,
            "Velocity rule violated"
        );
    }
}
