use crate::domain::{RuleDef, TransactionEvent};
use crate::rules::traits::PolicyRule;

/// Merchant category code rule.
///
/// Matches when the event's merchant category equals the configured
/// code, ignoring ASCII case.
#[derive(Debug)]
pub struct MerchantCategoryRule {
    def: RuleDef,
}

impl MerchantCategoryRule {
    pub fn new(def: RuleDef) -> Self {
        MerchantCategoryRule { def }
    }
}

impl PolicyRule for MerchantCategoryRule {
    fn definition(&self) -> &RuleDef {
        &self.def
    }

    fn matches(&self, event: &TransactionEvent) -> bool {
        event
            .mcc
            .as_deref()
            .is_some_and(|mcc| mcc.trim().eq_ignore_ascii_case(self.def.value.trim()))
    }
}
