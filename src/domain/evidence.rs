use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::alert::Severity;
use super::event::TransactionEvent;
use super::policy::{RecommendedAction, RuleDef, RuleType};
use super::whitelist::WhitelistDecision;

/// Result of a velocity check for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityVerdict {
    pub count_in_window: i64,
    pub sum_amount_cents_in_window: i64,
    pub violated: bool,
    pub window_seconds: u64,
    pub max_tx_count: i64,
    pub max_total_amount_cents: i64,
}

/// A policy rule that matched an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub value: String,
    pub severity: Severity,
    pub action: RecommendedAction,
}

impl From<&RuleDef> for RuleMatch {
    fn from(def: &RuleDef) -> Self {
        RuleMatch {
            id: def.id.clone(),
            rule_type: def.rule_type,
            value: def.value.clone(),
            severity: def.severity,
            action: def.action,
        }
    }
}

/// Transaction fields copied into every alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    pub event_id: String,
    pub customer_no: String,
    pub from_account: String,
    pub to_account: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub channel: String,
    pub mcc: Option<String>,
    pub description: Option<String>,
}

impl From<&TransactionEvent> for EventSnapshot {
    fn from(event: &TransactionEvent) -> Self {
        EventSnapshot {
            event_id: event.event_id.0.clone(),
            customer_no: event.customer_no.0.clone(),
            from_account: event.from_account.clone(),
            to_account: event.to_account.clone(),
            amount_cents: event.amount_cents,
            currency: event.currency.clone(),
            channel: event.channel.clone(),
            mcc: event.mcc.clone(),
            description: event.description.clone(),
        }
    }
}

/// Evidence captured when a detection fires.
///
/// The whitelist decision is always included, even when inert, so the
/// audit trail shows why a block was or was not applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(flatten)]
    pub event: EventSnapshot,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<VelocityVerdict>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<RuleMatch>,

    pub whitelist: Value,
}

impl Evidence {
    /// Evidence for a velocity violation.
    pub fn velocity(
        event: &TransactionEvent,
        verdict: VelocityVerdict,
        whitelist: &WhitelistDecision,
    ) -> Self {
        Evidence {
            event: EventSnapshot::from(event),
            velocity: Some(verdict),
            rule: None,
            whitelist: whitelist.to_evidence(),
        }
    }

    /// Evidence for a policy rule hit.
    pub fn rule(event: &TransactionEvent, hit: &RuleMatch, whitelist: &WhitelistDecision) -> Self {
        Evidence {
            event: EventSnapshot::from(event),
            velocity: None,
            rule: Some(hit.clone()),
            whitelist: whitelist.to_evidence(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
