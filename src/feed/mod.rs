use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::TransactionEvent;
use crate::error::{FraudError, FraudResult};
use crate::observability::metrics;
use crate::pipeline::DetectionPipeline;

/// One delivery of an event from the feed.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event: TransactionEvent,
    /// 1 for the first delivery
    pub attempt: u32,
}

/// Publishing side of the in-process feed.
#[derive(Clone)]
pub struct FeedProducer {
    tx: mpsc::Sender<Delivery>,
}

impl FeedProducer {
    /// Enqueue an event, waiting for capacity.
    pub async fn publish(&self, event: TransactionEvent) -> FraudResult<()> {
        self.tx
            .send(Delivery { event, attempt: 1 })
            .await
            .map_err(|_| FraudError::Unavailable("feed is closed".to_string()))
    }

    /// Enqueue without waiting; a full feed is reported as unavailable.
    pub fn try_publish(&self, event: TransactionEvent) -> FraudResult<()> {
        self.tx
            .try_send(Delivery { event, attempt: 1 })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    FraudError::Unavailable("feed is full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    FraudError::Unavailable("feed is closed".to_string())
                }
            })
    }
}

/// Delivery settings for the consumer.
#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub capacity: usize,
    /// Deliveries per event before it is dead-lettered
    pub max_attempts: u32,
    /// Base delay before a redelivery; grows linearly with the attempt
    pub retry_backoff: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            capacity: 1024,
            max_attempts: 5,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Counters returned when the consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub acked: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
}

/// Create a feed bound to the given pipeline.
pub fn channel(pipeline: Arc<DetectionPipeline>, settings: FeedSettings) -> (FeedProducer, FeedConsumer) {
    let (tx, rx) = mpsc::channel(settings.capacity.max(1));
    (
        FeedProducer { tx },
        FeedConsumer {
            rx,
            pipeline,
            settings,
            pending: VecDeque::new(),
            stats: FeedStats::default(),
        },
    )
}

/// At-least-once consumer.
///
/// An event is acknowledged only after the pipeline returned `Ok`. A
/// failed event is redelivered before anything newer is pulled, which
/// keeps per-customer order, until `max_attempts` is reached.
pub struct FeedConsumer {
    rx: mpsc::Receiver<Delivery>,
    pipeline: Arc<DetectionPipeline>,
    settings: FeedSettings,
    pending: VecDeque<Delivery>,
    stats: FeedStats,
}

impl FeedConsumer {
    /// Consume until every producer is dropped and the feed is drained.
    pub async fn run(mut self) -> FeedStats {
        info!(
            max_attempts = self.settings.max_attempts,
            "Feed consumer started"
        );

        loop {
            let delivery = match self.pending.pop_front() {
                Some(delivery) => {
                    let delay = self.settings.retry_backoff * delivery.attempt.saturating_sub(1);
                    tokio::time::sleep(delay).await;
                    delivery
                }
                None => match self.rx.recv().await {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            self.handle(delivery).await;
        }

        info!(
            acked = self.stats.acked,
            redelivered = self.stats.redelivered,
            dead_lettered = self.stats.dead_lettered,
            "Feed consumer stopped"
        );
        self.stats
    }

    async fn handle(&mut self, delivery: Delivery) {
        match self.pipeline.process(&delivery.event).await {
            Ok(outcome) => {
                debug!(
                    event_id = %outcome.event_id,
                    attempt = delivery.attempt,
                    "Event acknowledged"
                );
                self.stats.acked += 1;
            }
            Err(e) if !e.is_retryable() || delivery.attempt >= self.settings.max_attempts => {
                error!(
                    event_id = %delivery.event.event_id,
                    customer_no = %delivery.event.customer_no,
                    attempts = delivery.attempt,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Event dead-lettered"
                );
                metrics::record_dead_letter();
                self.stats.dead_lettered += 1;
            }
            Err(e) => {
                warn!(
                    event_id = %delivery.event.event_id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Event will be redelivered"
                );
                self.stats.redelivered += 1;
                self.pending.push_back(Delivery {
                    event: delivery.event,
                    attempt: delivery.attempt + 1,
                });
            }
        }
    }
}
