use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::observability::metrics;
use crate::rules::RuleSet;

use super::loader::{PolicyError, PolicyLoader};

/// Owns the active rule set and swaps it when the policy file changes.
///
/// Readers hold a `watch::Receiver` and always see a complete rule set.
/// A failed load never replaces a working rule set; a failed initial
/// load installs the empty rule set.
pub struct PolicyWatcher {
    loader: PolicyLoader,
    tx: watch::Sender<Arc<RuleSet>>,
    last_version: Mutex<Option<String>>,
}

impl PolicyWatcher {
    /// Load the initial policy, falling back to an empty rule set.
    pub fn load(loader: PolicyLoader) -> Self {
        let (initial_ruleset, last_version) = match loader.load() {
            Ok((policy, ruleset)) => {
                info!(
                    version = %policy.version,
                    rules = ruleset.len(),
                    "Loaded initial policy"
                );
                (Arc::new(ruleset), Some(policy.version))
            }
            Err(e) => {
                error!(
                    path = %loader.policy_path().display(),
                    error = %e,
                    "Failed to load policy, running with empty rule set (degraded)"
                );
                (Arc::new(RuleSet::empty()), None)
            }
        };

        let (tx, _rx) = watch::channel(initial_ruleset);

        PolicyWatcher {
            loader,
            tx,
            last_version: Mutex::new(last_version),
        }
    }

    /// Receiver for the active rule set.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RuleSet>> {
        self.tx.subscribe()
    }

    /// Version of the active rule set.
    pub fn current_version(&self) -> String {
        self.tx.borrow().policy_version.clone()
    }

    /// Reload the policy now, swapping even if the version is unchanged.
    ///
    /// Returns the version now in effect.
    pub fn reload(&self) -> Result<String, PolicyError> {
        let result = self.loader.load();
        metrics::record_policy_reload(result.is_ok());

        let (policy, ruleset) = result.map_err(|e| {
            warn!(error = %e, "Policy reload failed, keeping current rule set");
            e
        })?;

        info!(version = %policy.version, rules = ruleset.len(), "Policy reloaded");
        *self.last_version.lock() = Some(policy.version.clone());
        self.tx.send_replace(Arc::new(ruleset));

        Ok(policy.version)
    }

    /// Check for policy updates and swap if the version changed.
    fn check_for_updates(&self) -> Result<bool, PolicyError> {
        let policy = self.loader.load_policy()?;

        if self.last_version.lock().as_ref() == Some(&policy.version) {
            return Ok(false);
        }

        info!(
            "Policy version changed: {:?} -> {}",
            self.last_version.lock(),
            policy.version
        );
        self.reload()?;

        Ok(true)
    }

    /// Poll the policy file in the background.
    pub fn spawn(self: Arc<Self>, check_interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = interval(check_interval);
            // The first tick completes immediately and the policy was just loaded.
            interval.tick().await;

            loop {
                interval.tick().await;

                match self.check_for_updates() {
                    Ok(true) => info!("Policy reloaded successfully"),
                    Ok(false) => {}
                    Err(e) => warn!("Error checking for policy updates: {}", e),
                }
            }
        })
    }
}
