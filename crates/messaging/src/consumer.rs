//! Consumer for the `orders.create` queue.
//!
//! Each delivery is decoded into a [`NewOrder`], persisted through the order
//! store, announced through the event publisher and then settled:
//!
//! | Result                         | Settlement               |
//! |--------------------------------|--------------------------|
//! | order stored                   | ack                      |
//! | order stored, publish failed   | ack (failure is logged)  |
//! | body is not a valid order      | reject, no requeue       |
//! | store failed                   | reject, no requeue       |
//!
//! Rejected messages go to the queue's dead-letter exchange when a broker
//! policy configures one and are dropped otherwise. No failure of a single message stops the consumer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::{NewOrder, Order};
use futures_util::StreamExt;
use order_store::OrderStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::broker::{Broker, Delivery};
use crate::error::{BrokerError, DecodeError, IngestError};
use crate::publisher::EventPublisher;

/// Durable queue carrying order-creation requests.
pub const CREATE_ORDER_QUEUE: &str = "orders.create";

/// How store failures are retried inside a single delivery.
///
/// Only transient failures are retried, with exponential backoff between
/// attempts. The default makes a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Makes up to `max_attempts` attempts, starting at `initial_backoff`.
    pub fn exponential(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub queue: String,
    pub consumer_tag: String,
    /// Maximum number of deliveries handled concurrently. Match it to the
    /// broker prefetch count.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue: CREATE_ORDER_QUEUE.to_string(),
            consumer_tag: "orders-api-ingest".to_string(),
            max_in_flight: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of processing one message body.
#[derive(Debug)]
pub enum Outcome {
    /// The order was stored. `event_published` is false if the
    /// `order.created` event could not be published.
    Created { order: Order, event_published: bool },
    /// The message was not turned into an order.
    Rejected(IngestError),
}

impl Outcome {
    /// How the delivery carrying this message must be settled.
    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::Created { .. } => Disposition::Ack,
            Outcome::Rejected(_) => Disposition::Reject { requeue: false },
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Outcome::Created { .. })
    }
}

/// Settlement applied to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject { requeue: bool },
}

/// Drains the order-creation queue into the order store.
pub struct OrderIngestionConsumer<S, P, B> {
    store: S,
    publisher: P,
    broker: Arc<B>,
    config: ConsumerConfig,
}

impl<S, P, B> OrderIngestionConsumer<S, P, B>
where
    S: OrderStore + 'static,
    P: EventPublisher + 'static,
    B: Broker + 'static,
{
    pub fn new(store: S, publisher: P, broker: Arc<B>, config: ConsumerConfig) -> Self {
        Self {
            store,
            publisher,
            broker,
            config,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Consumes the queue until the delivery stream ends.
    ///
    /// Declares the queue, then handles every delivery in its own task with
    /// at most `max_in_flight` running at once. When the stream ends (the
    /// channel or connection closed) waits for running handlers to finish.
    /// Fails only if the queue cannot be declared or consumed.
    #[tracing::instrument(skip(self), fields(queue = %self.config.queue))]
    pub async fn start(self: Arc<Self>) -> Result<(), BrokerError> {
        self.broker.declare_queue(&self.config.queue).await?;
        let mut deliveries = self
            .broker
            .consume(&self.config.queue, &self.config.consumer_tag)
            .await?;

        tracing::info!(
            max_in_flight = self.config.max_in_flight,
            max_attempts = self.config.retry.max_attempts,
            "order ingestion consumer started"
        );

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut handlers = JoinSet::new();

        while let Some(next) = deliveries.next().await {
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(e) => {
                    tracing::error!(error = %e, "delivery stream error");
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let consumer = Arc::clone(&self);
            handlers.spawn(async move {
                let _permit = permit;
                consumer.handle_delivery(delivery).await
            });

            while let Some(finished) = handlers.try_join_next() {
                log_join_error(finished);
            }
        }

        tracing::info!(in_flight = handlers.len(), "delivery stream ended, draining");
        while let Some(finished) = handlers.join_next().await {
            log_join_error(finished);
        }

        tracing::info!("order ingestion consumer stopped");
        Ok(())
    }

    /// Processes one delivery and settles it with the broker.
    ///
    /// Settlement failures are logged; the returned disposition is the one
    /// that was attempted.
    #[tracing::instrument(
        skip(self, delivery),
        fields(delivery_tag = delivery.delivery_tag, redelivered = delivery.redelivered)
    )]
    pub async fn handle_delivery(&self, delivery: Delivery) -> Disposition {
        let start = Instant::now();
        let outcome = self.process(&delivery.body).await;
        metrics::histogram!("order_ingest_duration_seconds").record(start.elapsed().as_secs_f64());

        match &outcome {
            Outcome::Created {
                order,
                event_published,
            } => {
                metrics::counter!("orders_ingested_total").increment(1);
                tracing::info!(order_id = %order.id, event_published, "order ingested");
            }
            Outcome::Rejected(e) => {
                let reason = match e {
                    IngestError::Decode(_) => "decode",
                    IngestError::Store { .. } => "store",
                };
                metrics::counter!("orders_ingest_rejected_total", "reason" => reason).increment(1);
                tracing::warn!(error = %e, "order message rejected");
            }
        }

        let disposition = outcome.disposition();
        let settled = match disposition {
            Disposition::Ack => self.broker.ack(delivery.delivery_tag).await,
            Disposition::Reject { requeue } => {
                self.broker.reject(delivery.delivery_tag, requeue).await
            }
        };
        if let Err(e) = settled {
            tracing::error!(error = %e, ?disposition, "failed to settle delivery");
        }

        disposition
    }

    /// Turns one message body into an order.
    ///
    /// Does not touch the broker's delivery state.
    pub async fn process(&self, body: &[u8]) -> Outcome {
        let new_order: NewOrder = match serde_json::from_slice(body) {
            Ok(new_order) => new_order,
            Err(e) => return Outcome::Rejected(DecodeError(e).into()),
        };

        let order = match self.create_with_retry(new_order).await {
            Ok(order) => order,
            Err(e) => return Outcome::Rejected(e),
        };

        // The order is kept even if the event cannot be published.
        let event_published = match self.publisher.publish_order_created(&order).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "order stored but event not published");
                false
            }
        };

        Outcome::Created {
            order,
            event_published,
        }
    }

    async fn create_with_retry(&self, new_order: NewOrder) -> Result<Order, IngestError> {
        let policy = self.config.retry;
        let mut attempt = 1;

        loop {
            match self.store.create(new_order.clone()).await {
                Ok(order) => return Ok(order),
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        ?delay,
                        error = %e,
                        "transient store failure, retrying"
                    );
                    metrics::counter!("order_ingest_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(IngestError::Store {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

fn log_join_error(result: Result<Disposition, tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "delivery handler failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::error::PublishError;
    use async_trait::async_trait;
    use domain::OrderStatus;
    use order_store::{InMemoryOrderStore, OrderStoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingPublisher {
        published: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish_order_created(&self, _order: &Order) -> Result<(), PublishError> {
            if self.fail {
                return Err(BrokerError::NotConnected.into());
            }
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    type TestConsumer = OrderIngestionConsumer<InMemoryOrderStore, Arc<RecordingPublisher>, InMemoryBroker>;

    fn consumer(
        store: &InMemoryOrderStore,
        publisher: &Arc<RecordingPublisher>,
        retry: RetryPolicy,
    ) -> TestConsumer {
        OrderIngestionConsumer::new(
            store.clone(),
            Arc::clone(publisher),
            Arc::new(InMemoryBroker::new()),
            ConsumerConfig {
                retry,
                ..Default::default()
            },
        )
    }

    const VALID: &[u8] =
        br#"{"clientId":"c1","items":[{"productId":"p1","quantity":2,"price":10}],"total":20}"#;

    #[test]
    fn test_retry_policy_defaults_to_single_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy, RetryPolicy::no_retry());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(100));

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
        assert_eq!(policy.backoff(64), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_requires_one_attempt() {
        assert_eq!(RetryPolicy::exponential(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_disposition() {
        let rejected = Outcome::Rejected(IngestError::Store {
            attempts: 1,
            source: OrderStoreError::Unavailable("down".into()),
        });
        assert_eq!(rejected.disposition(), Disposition::Reject { requeue: false });
        assert!(!rejected.is_created());
    }

    #[tokio::test]
    async fn test_process_valid_message() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());

        let outcome = consumer(&store, &publisher, RetryPolicy::default())
            .process(VALID)
            .await;

        let Outcome::Created {
            order,
            event_published,
        } = outcome
        else {
            panic!("expected the order to be created");
        };
        assert!(event_published);
        assert_eq!(order.client_id, "c1");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, 20.0);
        assert_eq!(store.order_count().await, 1);
        assert_eq!(publisher.published.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_process_malformed_message() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());

        let outcome = consumer(&store, &publisher, RetryPolicy::default())
            .process(b"not-json")
            .await;

        assert!(matches!(outcome, Outcome::Rejected(IngestError::Decode(_))));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(publisher.published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_process_rejects_invalid_fields() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());

        let outcome = consumer(&store, &publisher, RetryPolicy::default())
            .process(br#"{"clientId":"","items":[],"total":0}"#)
            .await;

        assert!(matches!(
            outcome,
            Outcome::Rejected(IngestError::Store {
                attempts: 1,
                source: OrderStoreError::Validation(_)
            })
        ));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_process_store_failure_without_retry() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());
        store.fail_next(1);

        let outcome = consumer(&store, &publisher, RetryPolicy::default())
            .process(VALID)
            .await;

        assert!(matches!(
            outcome,
            Outcome::Rejected(IngestError::Store { attempts: 1, .. })
        ));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(publisher.published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_retries_transient_failures() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());
        store.fail_next(2);

        let outcome = consumer(
            &store,
            &publisher,
            RetryPolicy::exponential(3, Duration::from_millis(50)),
        )
        .process(VALID)
        .await;

        assert!(outcome.is_created());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_retries_with_oversized_backoff() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());
        store.fail_next(1);
        let policy = RetryPolicy::exponential(2, Duration::from_secs(u64::MAX));
        assert_eq!(policy.backoff(1), policy.max_backoff);

        let started = tokio::time::Instant::now();
        let outcome = consumer(&store, &publisher, policy).process(VALID).await;

        assert!(outcome.is_created());
        let waited = started.elapsed();
        assert!(waited >= policy.max_backoff);
        assert!(waited < policy.max_backoff * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_gives_up_after_max_attempts() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());
        store.fail_next(5);

        let outcome = consumer(
            &store,
            &publisher,
            RetryPolicy::exponential(3, Duration::from_millis(50)),
        )
        .process(VALID)
        .await;

        assert!(matches!(
            outcome,
            Outcome::Rejected(IngestError::Store { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_validation_failures_are_not_retried() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher::default());

        let outcome = consumer(
            &store,
            &publisher,
            RetryPolicy::exponential(5, Duration::from_millis(50)),
        )
        .process(br#"{"clientId":"c1","items":[],"total":0}"#)
        .await;

        assert!(matches!(
            outcome,
            Outcome::Rejected(IngestError::Store { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_process_publish_failure_keeps_order() {
        let store = InMemoryOrderStore::new();
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });

        let outcome = consumer(&store, &publisher, RetryPolicy::default())
            .process(VALID)
            .await;

        assert!(matches!(
            outcome,
            Outcome::Created {
                event_published: false,
                ..
            }
        ));
        assert_eq!(outcome.disposition(), Disposition::Ack);
        assert_eq!(store.order_count().await, 1);
    }
}
