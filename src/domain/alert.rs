use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::case::{CaseId, Priority};
use super::event::{CustomerNo, EventId};

/// Alert identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        AlertId(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        AlertId::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of detection that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    Velocity,
    BettingExposure,
    AmlPattern,
}

impl AlertType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "VELOCITY" => Some(AlertType::Velocity),
            "BETTING_EXPOSURE" => Some(AlertType::BettingExposure),
            "AML_PATTERN" => Some(AlertType::AmlPattern),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Velocity => "VELOCITY",
            AlertType::BettingExposure => "BETTING_EXPOSURE",
            AlertType::AmlPattern => "AML_PATTERN",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert severity.
///
/// Parsing is case-insensitive and lenient: anything that is not
/// `MEDIUM` or `HIGH` is treated as `LOW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }

    /// Case priority for alerts of this severity.
    pub fn priority(&self) -> Priority {
        match self {
            Severity::High => Priority::P1,
            Severity::Medium => Priority::P2,
            Severity::Low => Priority::P3,
        }
    }
}

impl From<String> for Severity {
    fn from(s: String) -> Self {
        Severity::from_str(&s).unwrap_or(Severity::Low)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable record of one detection hit.
///
/// Only `case_id` is ever set after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: AlertId,
    pub event_id: EventId,
    pub customer_no: CustomerNo,
    pub alert_type: AlertType,
    pub severity: Severity,
    /// Policy rule id or velocity check id that fired
    pub rule_id: String,
    pub evidence: Value,
    pub case_id: Option<CaseId>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to record a new alert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub event_id: EventId,
    pub customer_no: CustomerNo,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub rule_id: String,
    pub evidence: Value,
}

impl NewAlert {
    pub fn into_alert(self, now: DateTime<Utc>) -> FraudAlert {
        FraudAlert {
            id: AlertId::new(),
            event_id: self.event_id,
            customer_no: self.customer_no,
            alert_type: self.alert_type,
            severity: self.severity,
            rule_id: self.rule_id,
            evidence: self.evidence,
            case_id: None,
            created_at: now,
        }
    }
}
