use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::TransactionEvent;
use crate::rules::{RuleMatches, RuleSet};

/// Matches events against the currently active rule set.
///
/// Never fails: with no usable policy the active rule set is empty and
/// nothing matches.
#[derive(Clone)]
pub struct PolicyEvaluator {
    rules: watch::Receiver<Arc<RuleSet>>,
}

impl PolicyEvaluator {
    pub fn new(rules: watch::Receiver<Arc<RuleSet>>) -> Self {
        PolicyEvaluator { rules }
    }

    /// Evaluator pinned to a single rule set.
    pub fn fixed(ruleset: RuleSet) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(ruleset));
        PolicyEvaluator { rules: rx }
    }

    /// Every matching rule, in policy order. Matches are not deduplicated.
    pub fn evaluate(&self, event: &TransactionEvent) -> RuleMatches {
        let ruleset = self.rules.borrow().clone();
        ruleset.evaluate(event)
    }

    pub fn policy_version(&self) -> String {
        self.rules.borrow().policy_version.clone()
    }
}
