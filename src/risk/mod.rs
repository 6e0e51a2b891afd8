use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditRecord, AuditSink};
use crate::domain::{CustomerNo, CustomerRiskState};
use crate::error::FraudResult;
use crate::observability::metrics;
use crate::storage::RiskStore;

/// Current credit block status per customer.
///
/// Mutated only by the detection pipeline's automatic block and by
/// executed action requests.
pub struct CreditRiskStore {
    store: Arc<dyn RiskStore>,
    audit: Arc<dyn AuditSink>,
}

impl CreditRiskStore {
    pub fn new(store: Arc<dyn RiskStore>, audit: Arc<dyn AuditSink>) -> Self {
        CreditRiskStore { store, audit }
    }

    /// Current state. A customer with no history is unblocked.
    pub async fn get(&self, customer_no: &CustomerNo) -> FraudResult<CustomerRiskState> {
        Ok(self
            .store
            .get_risk(customer_no)
            .await?
            .unwrap_or_else(|| CustomerRiskState::new(customer_no.clone())))
    }

    /// Block credit. Repeating the same block is a no-op.
    pub async fn block_credit(
        &self,
        customer_no: &CustomerNo,
        reason: &str,
        actor: &str,
    ) -> FraudResult<CustomerRiskState> {
        let mut state = self.get(customer_no).await?;
        if state.credit_blocked && state.block_reason == reason {
            return Ok(state);
        }

        state.block(reason, Utc::now());
        self.store.put_risk(&state).await?;

        metrics::record_credit_block(reason);
        info!(customer_no = %customer_no, reason, actor, "Credit blocked");
        self.audit.record(AuditRecord::new(
            actor,
            "BLOCK_CREDIT",
            "CUSTOMER",
            customer_no,
            json!({ "reason": reason }),
        ));

        Ok(state)
    }

    pub async fn unblock_credit(
        &self,
        customer_no: &CustomerNo,
        actor: &str,
    ) -> FraudResult<CustomerRiskState> {
        let mut state = self.get(customer_no).await?;
        state.unblock(Utc::now());
        self.store.put_risk(&state).await?;

        info!(customer_no = %customer_no, actor, "Credit unblocked");
        self.audit.record(AuditRecord::new(
            actor,
            "UNBLOCK_CREDIT",
            "CUSTOMER",
            customer_no,
            json!({}),
        ));

        Ok(state)
    }
}
