use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::event::CustomerNo;

/// Case identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub Uuid);

impl CaseId {
    pub fn new() -> Self {
        CaseId(Uuid::new_v4())
    }
}

impl Default for CaseId {
    fn default() -> Self {
        CaseId::new()
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Investigation case lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    Open,
    Investigating,
    Actioned,
    Closed,
}

impl CaseStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Some(CaseStatus::Open),
            "INVESTIGATING" => Some(CaseStatus::Investigating),
            "ACTIONED" => Some(CaseStatus::Actioned),
            "CLOSED" => Some(CaseStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Open => "OPEN",
            CaseStatus::Investigating => "INVESTIGATING",
            CaseStatus::Actioned => "ACTIONED",
            CaseStatus::Closed => "CLOSED",
        }
    }

    /// New alerts for the customer attach to a case in this status.
    #[inline]
    pub fn is_reusable(&self) -> bool {
        matches!(self, CaseStatus::Open | CaseStatus::Investigating)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Case priority. `P1` is the most urgent and orders first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    P1 = 1,
    P2 = 2,
    P3 = 3,
}

impl Priority {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "P1" => Some(Priority::P1),
            "P2" => Some(Priority::P2),
            "P3" => Some(Priority::P3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }

    /// Returns true if `self` is more urgent than `other`.
    #[inline]
    pub fn outranks(&self, other: Priority) -> bool {
        *self < other
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::P3
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Investigation case for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudCase {
    pub id: CaseId,
    pub customer_no: CustomerNo,
    pub status: CaseStatus,
    pub priority: Priority,
    pub summary: String,
    /// Evidence of the alert that opened the case
    pub evidence: Value,
    pub opened_at: DateTime<Utc>,
}

impl FraudCase {
    /// Open a new case.
    pub fn open(
        customer_no: CustomerNo,
        priority: Priority,
        summary: impl Into<String>,
        evidence: Value,
        now: DateTime<Utc>,
    ) -> Self {
        FraudCase {
            id: CaseId::new(),
            customer_no,
            status: CaseStatus::Open,
            priority,
            summary: summary.into(),
            evidence,
            opened_at: now,
        }
    }
}

/// Timeline entry category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseEventType {
    Alert,
    Action,
    Status,
    Note,
    System,
}

impl CaseEventType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ALERT" => Some(CaseEventType::Alert),
            "ACTION" => Some(CaseEventType::Action),
            "STATUS" => Some(CaseEventType::Status),
            "NOTE" => Some(CaseEventType::Note),
            "SYSTEM" => Some(CaseEventType::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseEventType::Alert => "ALERT",
            CaseEventType::Action => "ACTION",
            CaseEventType::Status => "STATUS",
            CaseEventType::Note => "NOTE",
            CaseEventType::System => "SYSTEM",
        }
    }
}

impl fmt::Display for CaseEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only case timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseEvent {
    pub id: Uuid,
    pub case_id: CaseId,
    pub event_type: CaseEventType,
    /// Short code, e.g. `CASE_OPENED`, a rule id, `APPROVE_BLOCK_CREDIT`
    pub code: String,
    pub actor: String,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

impl CaseEvent {
    pub fn new(
        case_id: CaseId,
        event_type: CaseEventType,
        code: impl Into<String>,
        actor: impl Into<String>,
        payload: Value,
    ) -> Self {
        CaseEvent {
            id: Uuid::new_v4(),
            case_id,
            event_type,
            code: code.into(),
            actor: actor.into(),
            created_at: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reusable_statuses() {
        assert!(CaseStatus::Open.is_reusable());
        assert!(CaseStatus::Investigating.is_reusable());
        assert!(!CaseStatus::Actioned.is_reusable());
        assert!(!CaseStatus::Closed.is_reusable());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::P1.outranks(Priority::P2));
        assert!(Priority::P2.outranks(Priority::P3));
        assert!(!Priority::P3.outranks(Priority::P1));
        assert!(!Priority::P2.outranks(Priority::P2));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(CaseStatus::from_str("investigating"), Some(CaseStatus::Investigating));
        assert_eq!(CaseStatus::from_str("ESCALATED"), None);
        assert_eq!(serde_json::to_string(&CaseStatus::Closed).unwrap(), "\"CLOSED\"");
    }

    #[test]
    fn test_new_case_is_open() {
        let case = FraudCase::open(CustomerNo::new("C1"), Priority::P2, "summary", json!({}), Utc::now());
        assert_eq!(case.status, CaseStatus::Open);
        assert_eq!(case.priority, Priority::P2);
    }
}
