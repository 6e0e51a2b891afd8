pub mod keyword;
pub mod merchant;
pub mod prefix;
pub mod traits;

pub use keyword::KeywordRule;
pub use merchant::MerchantCategoryRule;
pub use prefix::AccountPrefixRule;
pub use traits::PolicyRule;

use smallvec::SmallVec;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{Policy, RuleMatch, RuleType, TransactionEvent};

/// Matches produced for one event. Most events match nothing or one rule.
pub type RuleMatches = SmallVec<[RuleMatch; 4]>;

/// Collection of compiled rules ready for evaluation.
#[derive(Debug)]
pub struct RuleSet {
    pub rules: Vec<Arc<dyn PolicyRule>>,
    pub policy_version: String,
}

impl RuleSet {
    /// Compile rules from a policy, in policy order.
    ///
    /// Rules of an unknown type are skipped; they can never match.
    pub fn from_policy(policy: &Policy) -> Self {
        let mut rules: Vec<Arc<dyn PolicyRule>> = Vec::with_capacity(policy.rules.len());

        for rule_def in &policy.rules {
            match rule_def.rule_type {
                RuleType::BettingIbanPrefix => {
                    rules.push(Arc::new(AccountPrefixRule::new(rule_def.clone())));
                }
                RuleType::BettingMcc => {
                    rules.push(Arc::new(MerchantCategoryRule::new(rule_def.clone())));
                }
                RuleType::Keyword => {
                    rules.push(Arc::new(KeywordRule::new(rule_def.clone())));
                }
                RuleType::Unknown => {
                    warn!(rule_id = %rule_def.id, "Skipping rule with unknown type");
                }
            }
        }

        RuleSet {
            rules,
            policy_version: policy.version.clone(),
        }
    }

    /// Create an empty rule set.
    pub fn empty() -> Self {
        RuleSet::from_policy(&Policy::empty())
    }

    /// Every rule that matches the event, in rule order.
    pub fn evaluate(&self, event: &TransactionEvent) -> RuleMatches {
        self.rules
            .iter()
            .filter_map(|rule| rule.evaluate(event))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CustomerNo, RecommendedAction, RuleDef, Severity};

    fn def(id: &str, rule_type: RuleType, value: &str) -> RuleDef {
        RuleDef {
            id: id.to_string(),
            rule_type,
            value: value.to_string(),
            severity: Severity::High,
            action: RecommendedAction::AlertOnly,
        }
    }

    fn policy() -> Policy {
        Policy {
            version: "test-1".to_string(),
            rules: vec![
                def("R1", RuleType::BettingIbanPrefix, "TR99"),
                def("R2", RuleType::BettingMcc, "7995"),
                def("R3", RuleType::Keyword, "bet"),
                def("R4", RuleType::Unknown, "x"),
            ],
        }
    }

    #[test]
    fn test_ruleset_from_policy() {
        let ruleset = RuleSet::from_policy(&policy());

        assert_eq!(ruleset.len(), 3);
        assert_eq!(ruleset.policy_version, "test-1");
    }

    #[test]
    fn test_all_matching_rules_are_returned_in_order() {
        let ruleset = RuleSet::from_policy(&policy());
        let event = TransactionEvent::new(CustomerNo::new("C1"), 100)
            .with_to_account("TR99000")
            .with_mcc("7995")
            .with_description("Bet slip");

        let ids: Vec<_> = ruleset.evaluate(&event).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["R1", "R2", "R3"]);
    }

    #[test]
    fn test_empty_ruleset_matches_nothing() {
        let ruleset = RuleSet::empty();
        let event = TransactionEvent::new(CustomerNo::new("C1"), 100).with_description("bet");

        assert!(ruleset.is_empty());
        assert!(ruleset.evaluate(&event).is_empty());
        assert_eq!(ruleset.policy_version, "fallback");
    }
}
