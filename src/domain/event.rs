use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{FraudError, FraudResult};

/// Unique event identifier assigned by the producing feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        EventId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        EventId::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bank customer number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerNo(pub String);

impl CustomerNo {
    pub fn new(id: impl Into<String>) -> Self {
        CustomerNo(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bank transaction as published on the inbound feed.
///
/// Immutable once received; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    /// Unique event identifier, stable across redeliveries
    pub event_id: EventId,

    /// Customer that owns the source account
    pub customer_no: CustomerNo,

    /// Source account (IBAN)
    #[serde(alias = "fromIban")]
    pub from_account: String,

    /// Destination account (IBAN)
    #[serde(default, alias = "toIban")]
    pub to_account: Option<String>,

    /// Amount in minor currency units
    pub amount_cents: i64,

    /// ISO 4217 currency code
    pub currency: String,

    /// Originating channel (mobile, branch, card, ...)
    pub channel: String,

    /// Merchant category code for card payments
    #[serde(default)]
    pub mcc: Option<String>,

    /// Free-text payment description
    #[serde(default)]
    pub description: Option<String>,
}

impl TransactionEvent {
    /// Create a transfer event with a fresh event id.
    pub fn new(customer_no: CustomerNo, amount_cents: i64) -> Self {
        TransactionEvent {
            event_id: EventId::new(),
            customer_no,
            from_account: String::new(),
            to_account: None,
            amount_cents,
            currency: "EUR".to_string(),
            channel: "mobile".to_string(),
            mcc: None,
            description: None,
        }
    }

    /// Reject events that cannot be keyed for dedup or attributed to a customer.
    pub fn validate(&self) -> FraudResult<()> {
        if self.event_id.as_str().trim().is_empty() {
            return Err(FraudError::InvalidArgument("eventId must not be blank".to_string()));
        }
        if self.customer_no.as_str().trim().is_empty() {
            return Err(FraudError::InvalidArgument(
                "customerNo must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = EventId::from_string(event_id);
        self
    }

    pub fn with_to_account(mut self, account: impl Into<String>) -> Self {
        self.to_account = Some(account.into());
        self
    }

    pub fn with_mcc(mut self, mcc: impl Into<String>) -> Self {
        self.mcc = Some(mcc.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
