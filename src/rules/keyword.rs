use crate::domain::{RuleDef, TransactionEvent};
use crate::rules::traits::PolicyRule;

/// Description keyword rule.
///
/// Case-insensitive substring match against the free-text description.
#[derive(Debug)]
pub struct KeywordRule {
    def: RuleDef,
    /// Lowercased keyword
    needle: String,
}

impl KeywordRule {
    pub fn new(def: RuleDef) -> Self {
        let needle = def.value.to_lowercase();
        KeywordRule { def, needle }
    }
}

impl PolicyRule for KeywordRule {
    fn definition(&self) -> &RuleDef {
        &self.def
    }

    fn matches(&self, event: &TransactionEvent) -> bool {
        if self.needle.is_empty() {
            return false;
        }
        event
            .description
            .as_deref()
            .is_some_and(|text| text.to_lowercase().contains(&self.needle))
    }
}
