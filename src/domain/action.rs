use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::case::CaseId;
use super::event::CustomerNo;
use crate::error::{FraudError, FraudResult};

/// Action request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        RequestId::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credit action gated behind maker-checker approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    BlockCredit,
    UnblockCredit,
}

impl ActionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BLOCK_CREDIT" => Some(ActionType::BlockCredit),
            "UNBLOCK_CREDIT" => Some(ActionType::UnblockCredit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::BlockCredit => "BLOCK_CREDIT",
            ActionType::UnblockCredit => "UNBLOCK_CREDIT",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action request lifecycle.
///
/// ```text
/// PENDING ──approve──> APPROVED ──execute──> EXECUTED
///    └─────reject────> REJECTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl ActionStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(ActionStatus::Pending),
            "APPROVED" => Some(ActionStatus::Approved),
            "REJECTED" => Some(ActionStatus::Rejected),
            "EXECUTED" => Some(ActionStatus::Executed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Approved => "APPROVED",
            ActionStatus::Rejected => "REJECTED",
            ActionStatus::Executed => "EXECUTED",
        }
    }

    /// The transition table. Everything not listed is illegal.
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (ActionStatus::Pending, ActionStatus::Approved)
                | (ActionStatus::Pending, ActionStatus::Rejected)
                | (ActionStatus::Approved, ActionStatus::Executed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Rejected | ActionStatus::Executed)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maker-checker request for a credit action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: RequestId,
    pub customer_no: CustomerNo,
    pub case_id: Option<CaseId>,
    pub action_type: ActionType,
    pub status: ActionStatus,

    /// Maker
    pub requested_by: String,
    pub reason: String,
    pub requested_at: DateTime<Utc>,

    /// Checker
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,

    pub executed_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency version, bumped by the store on every update
    pub version: i64,
}

impl ActionRequest {
    /// Create a pending request.
    pub fn pending(
        customer_no: CustomerNo,
        case_id: Option<CaseId>,
        action_type: ActionType,
        maker: impl Into<String>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        ActionRequest {
            id: RequestId::new(),
            customer_no,
            case_id,
            action_type,
            status: ActionStatus::Pending,
            requested_by: maker.into(),
            reason: reason.into(),
            requested_at: now,
            reviewed_by: None,
            review_note: None,
            reviewed_at: None,
            executed_at: None,
            version: 0,
        }
    }

    fn transition(&mut self, next: ActionStatus) -> FraudResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(FraudError::InvalidState(format!(
                "request {} is {}, cannot move to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn approve(&mut self, checker: &str, note: &str, now: DateTime<Utc>) -> FraudResult<()> {
        self.transition(ActionStatus::Approved)?;
        self.record_review(checker, note, now);
        Ok(())
    }

    pub fn reject(&mut self, checker: &str, note: &str, now: DateTime<Utc>) -> FraudResult<()> {
        self.transition(ActionStatus::Rejected)?;
        self.record_review(checker, note, now);
        Ok(())
    }

    pub fn mark_executed(&mut self, now: DateTime<Utc>) -> FraudResult<()> {
        self.transition(ActionStatus::Executed)?;
        self.executed_at = Some(now);
        Ok(())
    }

    /// Undo an approval whose execution failed, back to PENDING.
    pub fn revert_approval(&mut self) -> FraudResult<()> {
        if self.status != ActionStatus::Approved {
            return Err(FraudError::InvalidState(format!(
                "request {} is {}, only an APPROVED request can be reverted",
                self.id, self.status
            )));
        }
        self.status = ActionStatus::Pending;
        self.reviewed_by = None;
        self.review_note = None;
        self.reviewed_at = None;
        Ok(())
    }

    fn record_review(&mut self, checker: &str, note: &str, now: DateTime<Utc>) {
        self.reviewed_by = Some(checker.to_string());
        self.review_note = Some(note.to_string());
        self.reviewed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ActionRequest {
        ActionRequest::pending(
            CustomerNo::new("C1"),
            None,
            ActionType::BlockCredit,
            "maker",
            "betting suspected",
            Utc::now(),
        )
    }

    #[test]
    fn test_transition_table() {
        use ActionStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Executed));

        assert!(!Pending.can_transition_to(Executed));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Executed.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Approved));
    }

    #[test]
    fn test_approve_then_execute() {
        let mut req = request();
        let now = Utc::now();

        req.approve("checker", "ok", now).unwrap();
        assert_eq!(req.status, ActionStatus::Approved);
        assert_eq!(req.reviewed_by.as_deref(), Some("checker"));

        req.mark_executed(now).unwrap();
        assert_eq!(req.status, ActionStatus::Executed);
        assert_eq!(req.executed_at, Some(now));
    }

    #[test]
    fn test_execute_requires_approval() {
        let mut req = request();
        let err = req.mark_executed(Utc::now()).unwrap_err();
        assert!(matches!(err, FraudError::InvalidState(_)));
        assert_eq!(req.status, ActionStatus::Pending);
        assert!(req.executed_at.is_none());
    }

    #[test]
    fn test_rejected_is_terminal() {
        let mut req = request();
        req.reject("checker", "no evidence", Utc::now()).unwrap();

        assert!(req.status.is_terminal());
        assert!(req.approve("checker", "changed my mind", Utc::now()).is_err());
        assert_eq!(req.review_note.as_deref(), Some("no evidence"));
    }

    #[test]
    fn test_revert_approval_clears_review() {
        let mut req = request();
        assert!(req.revert_approval().is_err());

        req.approve("checker", "ok", Utc::now()).unwrap();
        req.revert_approval().unwrap();

        assert_eq!(req.status, ActionStatus::Pending);
        assert!(req.reviewed_by.is_none());
        assert!(req.reviewed_at.is_none());

        req.approve("checker", "ok", Utc::now()).unwrap();
        req.mark_executed(Utc::now()).unwrap();
        assert!(req.revert_approval().is_err());
    }

    #[test]
    fn test_action_type_parsing() {
        assert_eq!(ActionType::from_str("block_credit"), Some(ActionType::BlockCredit));
        assert_eq!(ActionType::from_str("CLOSE_ACCOUNT"), None);
    }
}
