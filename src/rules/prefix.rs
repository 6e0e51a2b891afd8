use crate::domain::{RuleDef, TransactionEvent};
use crate::rules::traits::PolicyRule;

/// Destination account prefix rule.
///
/// Matches when the destination account starts with the configured
/// prefix. Comparison is case-sensitive; events without a destination
/// never match.
#[derive(Debug)]
pub struct AccountPrefixRule {
    def: RuleDef,
}

impl AccountPrefixRule {
    pub fn new(def: RuleDef) -> Self {
        AccountPrefixRule { def }
    }
}

impl PolicyRule for AccountPrefixRule {
    fn definition(&self) -> &RuleDef {
        &self.def
    }

    fn matches(&self, event: &TransactionEvent) -> bool {
        event
            .to_account
            .as_deref()
            .is_some_and(|account| account.starts_with(&self.def.value))
    }
}
