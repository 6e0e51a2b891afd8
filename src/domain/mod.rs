pub mod action;
pub mod alert;
pub mod case;
pub mod event;
pub mod evidence;
pub mod policy;
pub mod risk;
pub mod whitelist;

pub use action::{ActionRequest, ActionStatus, ActionType, RequestId};
pub use alert::{AlertId, AlertType, FraudAlert, NewAlert, Severity};
pub use case::{CaseEvent, CaseEventType, CaseId, CaseStatus, FraudCase, Priority};
pub use event::{CustomerNo, EventId, TransactionEvent};
pub use evidence::{Evidence, RuleMatch, VelocityVerdict};
pub use policy::{Policy, RecommendedAction, RuleDef, RuleType};
pub use risk::CustomerRiskState;
pub use whitelist::{WhitelistDecision, WhitelistEntry, WhitelistId, WhitelistType, WhitelistUpsert};

/// Actor recorded for automated, non-human effects.
pub const SYSTEM_ACTOR: &str = "system";
