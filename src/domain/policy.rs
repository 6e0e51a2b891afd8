use serde::{Deserialize, Serialize};
use std::fmt;

use super::alert::Severity;

/// Versioned policy document defining detection rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy version identifier
    #[serde(rename = "policy_id", alias = "policyId", alias = "policy_version")]
    pub version: String,

    /// Rule definitions, evaluated in order
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

impl Policy {
    /// Create an empty policy.
    pub fn empty() -> Self {
        Policy {
            version: "fallback".to_string(),
            rules: Vec::new(),
        }
    }
}

/// Rule type identifier.
///
/// Unrecognized types deserialize to `Unknown` and never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum RuleType {
    /// Destination account starts with a prefix (case-sensitive)
    BettingIbanPrefix,
    /// Merchant category equals a code (case-insensitive)
    BettingMcc,
    /// Description contains a keyword (case-insensitive)
    Keyword,
    Unknown,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::BettingIbanPrefix => "BETTING_IBAN_PREFIX",
            RuleType::BettingMcc => "BETTING_MCC",
            RuleType::Keyword => "KEYWORD",
            RuleType::Unknown => "UNKNOWN",
        }
    }

    /// Betting-related rules raise `BETTING_EXPOSURE` alerts.
    pub fn is_betting(&self) -> bool {
        matches!(self, RuleType::BettingIbanPrefix | RuleType::BettingMcc)
    }
}

impl From<String> for RuleType {
    fn from(s: String) -> Self {
        match s.trim().to_uppercase().as_str() {
            "BETTING_IBAN_PREFIX" => RuleType::BettingIbanPrefix,
            "BETTING_MCC" => RuleType::BettingMcc,
            "KEYWORD" => RuleType::Keyword,
            _ => RuleType::Unknown,
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a rule recommends when it matches.
///
/// Anything other than `BLOCK_CREDIT` is treated as alert-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum RecommendedAction {
    AlertOnly,
    BlockCredit,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::AlertOnly => "ALERT_ONLY",
            RecommendedAction::BlockCredit => "BLOCK_CREDIT",
        }
    }
}

impl From<String> for RecommendedAction {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("BLOCK_CREDIT") {
            RecommendedAction::BlockCredit
        } else {
            RecommendedAction::AlertOnly
        }
    }
}

impl Default for RecommendedAction {
    fn default() -> Self {
        RecommendedAction::AlertOnly
    }
}

/// Definition of a single rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDef {
    /// Unique rule identifier
    pub id: String,

    /// Rule type
    #[serde(rename = "type")]
    pub rule_type: RuleType,

    /// Prefix, merchant code or keyword, depending on the type
    pub value: String,

    pub severity: Severity,

    #[serde(default)]
    pub action: RecommendedAction,
}
