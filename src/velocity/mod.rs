use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::domain::{TransactionEvent, VelocityVerdict};
use crate::error::{FraudError, FraudResult};
use crate::storage::CounterStore;

/// Velocity thresholds, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VelocityConfig {
    pub window: Duration,
    pub max_tx_count: i64,
    pub max_total_amount_cents: i64,
}

impl VelocityConfig {
    pub fn validate(&self) -> FraudResult<()> {
        if self.window.is_zero() {
            return Err(FraudError::InvalidArgument(
                "velocity window must be positive".to_string(),
            ));
        }
        if self.max_tx_count <= 0 {
            return Err(FraudError::InvalidArgument(
                "velocity max count must be positive".to_string(),
            ));
        }
        if self.max_total_amount_cents <= 0 {
            return Err(FraudError::InvalidArgument(
                "velocity max amount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for VelocityConfig {
    fn default() -> Self {
        VelocityConfig {
            window: Duration::from_secs(60),
            max_tx_count: 5,
            max_total_amount_cents: 100_000,
        }
    }
}

/// Per-customer rolling count and amount over a fixed window.
pub struct VelocityLimiter {
    counters: Arc<dyn CounterStore>,
    config: VelocityConfig,
}

impl VelocityLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, config: VelocityConfig) -> Self {
        VelocityLimiter { counters, config }
    }

    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    /// Count the event and report whether either threshold is reached.
    ///
    /// Each event id is counted at most once per window; a redelivered
    /// event reads the current totals instead of adding to them. If the
    /// increments fail, the claim on the event id is released so the
    /// redelivery counts it.
    pub async fn register_and_check(&self, event: &TransactionEvent) -> FraudResult<VelocityVerdict> {
        let customer = event.customer_no.as_str();
        let count_key = format!("vel:cnt:{customer}");
        let sum_key = format!("vel:sum:{customer}");
        let seen_key = format!("vel:seen:{customer}:{}", event.event_id);

        let first_delivery = self
            .counters
            .set_if_absent(&seen_key, self.config.window)
            .await?;

        let (count, sum) = if first_delivery {
            match self.count(&count_key, &sum_key, event.amount_cents).await {
                Ok(totals) => totals,
                Err(e) => {
                    if let Err(release) = self.counters.delete_counter(&seen_key).await {
                        warn!(
                            event_id = %event.event_id,
                            error = %release,
                            "Failed to release velocity claim"
                        );
                    }
                    return Err(e.into());
                }
            }
        } else {
            debug!(event_id = %event.event_id, "Redelivered event, velocity not re-counted");
            (
                self.counters.get_counter(&count_key).await?,
                self.counters.get_counter(&sum_key).await?,
            )
        };

        Ok(self.verdict(count, sum))
    }

    /// Add one event to both totals, or to neither.
    async fn count(&self, count_key: &str, sum_key: &str, amount: i64) -> anyhow::Result<(i64, i64)> {
        let window = self.config.window;
        let count = self.counters.incr_with_expiry(count_key, 1, window).await?;
        match self.counters.incr_with_expiry(sum_key, amount, window).await {
            Ok(sum) => Ok((count, sum)),
            Err(e) => {
                if let Err(undo) = self.counters.incr_with_expiry(count_key, -1, window).await {
                    warn!(key = count_key, error = %undo, "Failed to roll back velocity count");
                }
                Err(e)
            }
        }
    }

    fn verdict(&self, count: i64, sum: i64) -> VelocityVerdict {
        VelocityVerdict {
            count_in_window: count,
            sum_amount_cents_in_window: sum,
            violated: count >= self.config.max_tx_count
                || sum >= self.config.max_total_amount_cents,
            window_seconds: self.config.window.as_secs(),
            max_tx_count: self.config.max_tx_count,
            max_total_amount_cents: self.config.max_total_amount_cents,
        }
    }
}

/// Periodically drop lapsed counters from the store.
pub fn spawn_counter_sweeper(counters: Arc<dyn CounterStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match counters.purge_expired_counters().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Swept expired counters"),
                Err(e) => warn!(error = %e, "Counter sweep failed"),
            }
        }
    })
}
