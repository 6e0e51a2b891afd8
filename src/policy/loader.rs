use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::Policy;
use crate::rules::RuleSet;

/// Errors that can occur during policy loading.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a policy from a YAML (or JSON) file.
pub fn load_policy(path: impl AsRef<Path>) -> Result<Policy, PolicyError> {
    let content = fs::read_to_string(path)?;
    let policy: Policy = serde_yaml::from_str(&content)?;

    validate_policy(&policy)?;

    Ok(policy)
}

/// Validate policy configuration.
fn validate_policy(policy: &Policy) -> Result<(), PolicyError> {
    if policy.version.trim().is_empty() {
        return Err(PolicyError::Validation(
            "Policy version cannot be empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for rule in &policy.rules {
        if rule.id.trim().is_empty() {
            return Err(PolicyError::Validation("Rule ID cannot be empty".to_string()));
        }
        if !seen_ids.insert(&rule.id) {
            return Err(PolicyError::Validation(format!(
                "Duplicate rule ID: {}",
                rule.id
            )));
        }
    }

    Ok(())
}

/// Loads the policy file and compiles it.
#[derive(Debug, Clone)]
pub struct PolicyLoader {
    policy_path: PathBuf,
}

impl PolicyLoader {
    pub fn new(policy_path: impl Into<PathBuf>) -> Self {
        PolicyLoader {
            policy_path: policy_path.into(),
        }
    }

    /// Load the policy and compile a RuleSet.
    pub fn load(&self) -> Result<(Policy, RuleSet), PolicyError> {
        let policy = self.load_policy()?;
        let ruleset = RuleSet::from_policy(&policy);
        Ok((policy, ruleset))
    }

    /// Load only the policy (without compiling rules).
    pub fn load_policy(&self) -> Result<Policy, PolicyError> {
        load_policy(&self.policy_path)
    }

    pub fn policy_path(&self) -> &Path {
        &self.policy_path
    }
}
