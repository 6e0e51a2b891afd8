use std::fmt::Debug;

use crate::domain::{RuleDef, RuleMatch, TransactionEvent};

/// A compiled policy rule.
///
/// Rules are stateless predicates over a single transaction and are
/// evaluated synchronously on the pipeline path.
pub trait PolicyRule: Send + Sync + Debug {
    /// The definition this rule was compiled from.
    fn definition(&self) -> &RuleDef;

    /// Whether the rule's predicate holds for the event.
    fn matches(&self, event: &TransactionEvent) -> bool;

    /// Unique identifier for this rule.
    fn id(&self) -> &str {
        &self.definition().id
    }

    /// Evaluate the rule, returning the match when it fires.
    fn evaluate(&self, event: &TransactionEvent) -> Option<RuleMatch> {
        self.matches(event)
            .then(|| RuleMatch::from(self.definition()))
    }
}
