use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::CustomerNo;

/// Current credit status of a customer, as read by credit decisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRiskState {
    pub customer_no: CustomerNo,
    pub credit_blocked: bool,
    pub block_reason: String,
    pub updated_at: DateTime<Utc>,
}

impl CustomerRiskState {
    /// Unblocked state for a customer with no history.
    pub fn new(customer_no: CustomerNo) -> Self {
        CustomerRiskState {
            customer_no,
            credit_blocked: false,
            block_reason: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn block(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.credit_blocked = true;
        self.block_reason = reason.into();
        self.updated_at = now;
    }

    pub fn unblock(&mut self, now: DateTime<Utc>) {
        self.credit_blocked = false;
        self.block_reason.clear();
        self.updated_at = now;
    }
}
