use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

/// Whitelist entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhitelistId(pub Uuid);

impl WhitelistId {
    pub fn new() -> Self {
        WhitelistId(Uuid::new_v4())
    }
}

impl Default for WhitelistId {
    fn default() -> Self {
        WhitelistId::new()
    }
}

impl fmt::Display for WhitelistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dimension a whitelist exception applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhitelistType {
    /// Customer number
    Customer,
    /// Destination account
    Iban,
    /// Policy rule id
    RuleId,
    /// Merchant category code
    Mcc,
}

impl WhitelistType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CUSTOMER" => Some(WhitelistType::Customer),
            "IBAN" => Some(WhitelistType::Iban),
            "RULE_ID" => Some(WhitelistType::RuleId),
            "MCC" => Some(WhitelistType::Mcc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WhitelistType::Customer => "CUSTOMER",
            WhitelistType::Iban => "IBAN",
            WhitelistType::RuleId => "RULE_ID",
            WhitelistType::Mcc => "MCC",
        }
    }
}

impl fmt::Display for WhitelistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bypass exception.
///
/// At most one entry exists per `(entry_type, value)`. Expired entries stay
/// in the store but are ignored at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub id: WhitelistId,

    #[serde(rename = "type")]
    pub entry_type: WhitelistType,

    pub value: String,

    /// `true` skips alert, case and block; `false` only skips the block
    pub hard_bypass: bool,

    pub reason: String,

    pub created_by: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_ref: Option<String>,

    /// No expiry when absent
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl WhitelistEntry {
    /// Returns true if the entry expired strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry < now)
    }
}

/// Input to a whitelist upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistUpsert {
    #[serde(rename = "type")]
    pub entry_type: WhitelistType,

    pub value: String,

    #[serde(default = "default_hard_bypass")]
    pub hard_bypass: bool,

    pub reason: String,

    pub created_by: String,

    #[serde(default)]
    pub ticket_ref: Option<String>,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_hard_bypass() -> bool {
    true
}

impl WhitelistUpsert {
    /// Materialize into a fresh entry.
    pub fn into_entry(self, now: DateTime<Utc>) -> WhitelistEntry {
        WhitelistEntry {
            id: WhitelistId::new(),
            entry_type: self.entry_type,
            value: self.value,
            hard_bypass: self.hard_bypass,
            reason: self.reason,
            created_by: self.created_by,
            ticket_ref: self.ticket_ref,
            expires_at: self.expires_at,
            created_at: now,
        }
    }
}

/// Outcome of resolving the event-level whitelist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistDecision {
    pub active: bool,
    pub match_type: Option<WhitelistType>,
    pub match_value: String,
    pub reason: String,
    pub hard_bypass: bool,
}

impl WhitelistDecision {
    /// No exception applies.
    pub fn inactive() -> Self {
        WhitelistDecision {
            active: false,
            match_type: None,
            match_value: String::new(),
            reason: String::new(),
            hard_bypass: false,
        }
    }

    /// Decision derived from a live entry.
    pub fn matched(entry: &WhitelistEntry) -> Self {
        WhitelistDecision {
            active: true,
            match_type: Some(entry.entry_type),
            match_value: entry.value.clone(),
            reason: entry.reason.clone(),
            hard_bypass: entry.hard_bypass,
        }
    }

    /// Skip alerting, casing and blocking entirely.
    pub fn is_hard_bypass(&self) -> bool {
        self.active && self.hard_bypass
    }

    /// Automatic credit blocks are allowed unless a soft bypass is active.
    pub fn block_allowed(&self) -> bool {
        !(self.active && !self.hard_bypass)
    }

    /// Alert evidence form; inert decisions are still recorded.
    pub fn to_evidence(&self) -> Value {
        match self.match_type {
            Some(match_type) if self.active => json!({
                "active": true,
                "matchType": match_type.as_str(),
                "matchValue": self.match_value,
                "reason": self.reason,
                "hardBypass": self.hard_bypass,
            }),
            _ => json!({ "active": false }),
        }
    }
}

impl Default for WhitelistDecision {
    fn default() -> Self {
        WhitelistDecision::inactive()
    }
}
