use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::{AuditRecord, AuditSink};
use crate::cases::CaseManager;
use crate::domain::{
    ActionRequest, ActionStatus, ActionType, CaseEventType, CaseId, CustomerNo,
    CustomerRiskState, RequestId, SYSTEM_ACTOR,
};
use crate::error::{FraudError, FraudResult};
use crate::locks::KeyedLocks;
use crate::risk::CreditRiskStore;
use crate::storage::{ActionStore, RequestFilter, LIST_LIMIT};

/// Parse an action type name, rejecting anything unsupported.
pub fn parse_action_type(name: &str) -> FraudResult<ActionType> {
    ActionType::from_str(name)
        .ok_or_else(|| FraudError::InvalidArgument(format!("unsupported action type: {name}")))
}

/// Maker-checker workflow for credit actions.
///
/// ```text
/// request ──> PENDING ──approve──> APPROVED ──execute──> EXECUTED
///                │                    └──failure──> PENDING
///                └─────reject────> REJECTED
/// ```
///
/// Every transition is a versioned write; the store rejects stale ones.
/// Operations on one request are also serialized in-process.
pub struct ActionWorkflow {
    store: Arc<dyn ActionStore>,
    cases: Arc<CaseManager>,
    risk: Arc<CreditRiskStore>,
    audit: Arc<dyn AuditSink>,
    request_locks: KeyedLocks,
}

impl ActionWorkflow {
    pub fn new(
        store: Arc<dyn ActionStore>,
        cases: Arc<CaseManager>,
        risk: Arc<CreditRiskStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        ActionWorkflow {
            store,
            cases,
            risk,
            audit,
            request_locks: KeyedLocks::new(),
        }
    }

    /// Create a PENDING request.
    ///
    /// The request is linked to `case_id` when given, otherwise to the
    /// customer's open case if there is one.
    pub async fn request(
        &self,
        customer_no: CustomerNo,
        case_id: Option<CaseId>,
        action_type: ActionType,
        maker: &str,
        reason: &str,
    ) -> FraudResult<ActionRequest> {
        require_non_empty("customer number", customer_no.as_str())?;
        require_non_empty("maker", maker)?;
        require_non_empty("reason", reason)?;

        let case_id = match case_id {
            Some(id) => Some(self.cases.get_case(id).await?.id),
            None => self
                .cases
                .find_reusable_case(&customer_no)
                .await?
                .map(|c| c.id),
        };

        let request = ActionRequest::pending(
            customer_no,
            case_id,
            action_type,
            maker,
            reason,
            Utc::now(),
        );
        self.store.insert_request(&request).await?;

        info!(
            request_id = %request.id,
            customer_no = %request.customer_no,
            action_type = %action_type,
            maker,
            "Action requested"
        );

        if let Some(case_id) = case_id {
            self.cases
                .append_event(
                    case_id,
                    CaseEventType::Action,
                    format!("REQUEST_{}", action_type),
                    maker,
                    json!({ "requestId": request.id, "reason": reason }),
                )
                .await?;
        }

        self.audit.record(AuditRecord::new(
            maker,
            "REQUEST_ACTION",
            "ACTION_REQUEST",
            request.id,
            json!({
                "customerNo": request.customer_no.as_str(),
                "type": action_type.as_str(),
                "reason": reason,
                "caseId": case_id,
            }),
        ));

        Ok(request)
    }

    pub async fn request_block_credit(
        &self,
        customer_no: CustomerNo,
        maker: &str,
        reason: &str,
    ) -> FraudResult<ActionRequest> {
        self.request(customer_no, None, ActionType::BlockCredit, maker, reason)
            .await
    }

    pub async fn request_unblock_credit(
        &self,
        customer_no: CustomerNo,
        maker: &str,
        reason: &str,
    ) -> FraudResult<ActionRequest> {
        self.request(customer_no, None, ActionType::UnblockCredit, maker, reason)
            .await
    }

    pub async fn get(&self, id: RequestId) -> FraudResult<ActionRequest> {
        self.store
            .get_request(id)
            .await?
            .ok_or_else(|| FraudError::not_found("action request", id))
    }

    /// Load a PENDING request for review by `checker`.
    async fn load_for_review(&self, id: RequestId, checker: &str) -> FraudResult<ActionRequest> {
        require_non_empty("checker", checker)?;

        let request = self.get(id).await?;
        if request.status != ActionStatus::Pending {
            return Err(FraudError::InvalidState(format!(
                "request {} is {}, expected PENDING",
                id, request.status
            )));
        }
        if request.requested_by == checker {
            return Err(FraudError::InvalidArgument(
                "checker must differ from the maker".to_string(),
            ));
        }

        Ok(request)
    }

    /// Approve a PENDING request and execute it.
    ///
    /// APPROVED is committed with the version check before the credit
    /// change. A failed execution reverts the request to PENDING.
    pub async fn approve_and_execute(
        &self,
        id: RequestId,
        checker: &str,
        note: &str,
    ) -> FraudResult<CustomerRiskState> {
        let _guard = self.request_locks.lock(&id.to_string()).await;
        let mut request = self.load_for_review(id, checker).await?;

        request.approve(checker, note, Utc::now())?;
        self.commit(&mut request).await?;

        let state = match self.execute(&request).await {
            Ok(state) => state,
            Err(e) => {
                self.revert_approval(&mut request).await;
                error!(
                    request_id = %id,
                    action_type = %request.action_type,
                    error = %e,
                    "Action execution failed"
                );
                return Err(e);
            }
        };

        request.mark_executed(Utc::now())?;
        if let Err(e) = self.commit(&mut request).await {
            error!(
                request_id = %id,
                customer_no = %request.customer_no,
                error = %e,
                "Action executed but request left APPROVED"
            );
            return Err(e);
        }

        info!(
            request_id = %id,
            customer_no = %request.customer_no,
            action_type = %request.action_type,
            checker,
            "Action approved and executed"
        );

        self.record_transition(&request, "APPROVE", checker).await;
        self.record_transition(&request, "EXECUTE", SYSTEM_ACTOR).await;
        self.audit.record(AuditRecord::new(
            checker,
            "APPROVE_ACTION",
            "ACTION_REQUEST",
            id,
            json!({ "note": note }),
        ));
        self.audit.record(AuditRecord::new(
            SYSTEM_ACTOR,
            "EXECUTE_ACTION",
            "ACTION_REQUEST",
            id,
            json!({
                "type": request.action_type.as_str(),
                "customerNo": request.customer_no.as_str(),
                "creditBlocked": state.credit_blocked,
            }),
        ));

        Ok(state)
    }

    /// Persist a transition against the version it was loaded at.
    async fn commit(&self, request: &mut ActionRequest) -> FraudResult<()> {
        if !self.store.update_request(request).await? {
            return Err(FraudError::InvalidState(format!(
                "request {} was modified concurrently",
                request.id
            )));
        }
        request.version += 1;
        Ok(())
    }

    async fn revert_approval(&self, request: &mut ActionRequest) {
        let result = match request.revert_approval() {
            Ok(()) => self.commit(request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(request_id = %request.id, error = %e, "Failed to revert approval to PENDING");
        }
    }

    async fn execute(&self, request: &ActionRequest) -> FraudResult<CustomerRiskState> {
        match request.action_type {
            ActionType::BlockCredit => {
                let reason = format!("Approved: {}", request.reason);
                self.risk
                    .block_credit(&request.customer_no, &reason, SYSTEM_ACTOR)
                    .await
            }
            ActionType::UnblockCredit => {
                self.risk
                    .unblock_credit(&request.customer_no, SYSTEM_ACTOR)
                    .await
            }
        }
    }

    /// Reject a PENDING request.
    pub async fn reject(&self, id: RequestId, checker: &str, note: &str) -> FraudResult<ActionRequest> {
        let _guard = self.request_locks.lock(&id.to_string()).await;
        let mut request = self.load_for_review(id, checker).await?;

        request.reject(checker, note, Utc::now())?;
        self.commit(&mut request).await?;

        info!(request_id = %id, checker, "Action rejected");

        self.record_transition(&request, "REJECT", checker).await;
        self.audit.record(AuditRecord::new(
            checker,
            "REJECT_ACTION",
            "ACTION_REQUEST",
            id,
            json!({ "note": note }),
        ));

        Ok(request)
    }

    /// Timeline entry for a committed transition. The transition is
    /// already durable, so a failed write here is only logged.
    async fn record_transition(&self, request: &ActionRequest, verb: &str, actor: &str) {
        let Some(case_id) = request.case_id else {
            return;
        };

        let result = self
            .cases
            .append_event(
                case_id,
                CaseEventType::Action,
                format!("{}_{}", verb, request.action_type),
                actor,
                json!({
                    "requestId": request.id,
                    "status": request.status.as_str(),
                    "note": request.review_note,
                }),
            )
            .await;

        if let Err(e) = result {
            warn!(request_id = %request.id, case_id = %case_id, error = %e, "Failed to record timeline entry");
        }
    }

    /// Newest first. A customer filter takes precedence over a status
    /// filter; with neither, PENDING requests are listed.
    pub async fn list(
        &self,
        status: Option<ActionStatus>,
        customer_no: Option<CustomerNo>,
    ) -> FraudResult<Vec<ActionRequest>> {
        let filter = match (customer_no, status) {
            (Some(customer_no), _) => RequestFilter::Customer(customer_no),
            (None, Some(status)) => RequestFilter::Status(status),
            (None, None) => RequestFilter::Status(ActionStatus::Pending),
        };
        Ok(self.store.list_requests(&filter, LIST_LIMIT).await?)
    }
}

fn require_non_empty(field: &str, value: &str) -> FraudResult<()> {
    if value.trim().is_empty() {
        return Err(FraudError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}
