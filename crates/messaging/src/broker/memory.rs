//! In-memory broker for tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Broker, Delivery, DeliveryStream, DeliveryTag, Result};
use crate::error::BrokerError;

/// The exchange that routes straight to the queue named by the routing key.
const DEFAULT_EXCHANGE: &str = "";

/// A message accepted by [`InMemoryBroker::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
}

impl PublishedMessage {
    /// Parses the body as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    sender: Option<mpsc::UnboundedSender<Delivery>>,
    receiver: Option<mpsc::UnboundedReceiver<Delivery>>,
    dead_letters: Vec<Vec<u8>>,
}

impl QueueState {
    fn open(&mut self) {
        if self.sender.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            self.sender = Some(tx);
            self.receiver = Some(rx);
        }
    }
}

#[derive(Debug)]
struct InFlight {
    queue: String,
    body: Vec<u8>,
}

#[derive(Debug, Default)]
struct InMemoryBrokerState {
    connected: bool,
    queues: HashMap<String, QueueState>,
    exchanges: HashSet<String>,
    published: Vec<PublishedMessage>,
    in_flight: HashMap<DeliveryTag, InFlight>,
    acked: Vec<DeliveryTag>,
    rejected: Vec<(DeliveryTag, bool)>,
    next_tag: DeliveryTag,
    fail_on_publish: bool,
}

impl InMemoryBrokerState {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    fn enqueue(&mut self, queue: &str, body: Vec<u8>, redelivered: bool) -> Result<()> {
        self.next_tag += 1;
        let delivery_tag = self.next_tag;

        let state = self.queues.entry(queue.to_string()).or_default();
        state.open();
        let sender = state
            .sender
            .as_ref()
            .ok_or_else(|| BrokerError::publish(DEFAULT_EXCHANGE, queue, "queue is closed"))?;

        sender
            .send(Delivery {
                delivery_tag,
                body: body.clone(),
                redelivered,
            })
            .map_err(|_| BrokerError::publish(DEFAULT_EXCHANGE, queue, "queue is closed"))?;

        self.in_flight.insert(
            delivery_tag,
            InFlight {
                queue: queue.to_string(),
                body,
            },
        );
        Ok(())
    }
}

/// Broker that keeps queues and published messages in memory.
///
/// Queues are unbounded channels with a single consumer each. Messages
/// published to the default exchange (`""`) are delivered to the queue named
/// by the routing key; messages published to a topic exchange are only
/// recorded, since nothing in this process subscribes to them. Rejecting a
/// delivery with requeue delivers it again flagged as redelivered; rejecting
/// without requeue moves it to the queue's dead letters.
///
/// Starts connected unless built with [`disconnected`](Self::disconnected).
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    state: Arc<RwLock<InMemoryBrokerState>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Creates a connected in-memory broker.
    pub fn new() -> Self {
        let state = InMemoryBrokerState {
            connected: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Creates a broker that fails every operation until [`connect`](Self::connect).
    pub fn disconnected() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryBrokerState::default())),
        }
    }

    pub fn connect(&self) {
        self.state.write().unwrap().connected = true;
    }

    /// Disconnects and ends every open delivery stream.
    ///
    /// A consumer still receives what was already queued before its stream
    /// ends, but can no longer settle it.
    pub fn close(&self) {
        let mut state = self.state.write().unwrap();
        state.connected = false;
        for queue in state.queues.values_mut() {
            queue.sender = None;
            queue.receiver = None;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().unwrap().connected
    }

    /// Configures the broker to fail every publish call.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns every message published so far, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns the messages published to `exchange`, in order.
    pub fn published_to(&self, exchange: &str) -> Vec<PublishedMessage> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.exchange == exchange)
            .cloned()
            .collect()
    }

    /// Returns true if `exchange` has been declared.
    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.state.read().unwrap().exchanges.contains(exchange)
    }

    /// Returns true if `queue` has been declared or published to.
    pub fn has_queue(&self, queue: &str) -> bool {
        self.state.read().unwrap().queues.contains_key(queue)
    }

    /// Returns the tags of acknowledged deliveries, in order.
    pub fn acked(&self) -> Vec<DeliveryTag> {
        self.state.read().unwrap().acked.clone()
    }

    /// Returns the tags of rejected deliveries with their requeue flag, in order.
    pub fn rejected(&self) -> Vec<(DeliveryTag, bool)> {
        self.state.read().unwrap().rejected.clone()
    }

    /// Returns the bodies rejected from `queue` without requeue.
    pub fn dead_letters(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .read()
            .unwrap()
            .queues
            .get(queue)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Returns the number of deliveries sent but not yet acked or rejected.
    pub fn unsettled(&self) -> usize {
        self.state.read().unwrap().in_flight.len()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ensure_connected()?;
        state.queues.entry(queue.to_string()).or_default().open();
        Ok(())
    }

    async fn declare_topic_exchange(&self, exchange: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ensure_connected()?;
        state.exchanges.insert(exchange.to_string());
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ensure_connected()?;

        if state.fail_on_publish {
            return Err(BrokerError::publish(
                exchange,
                routing_key,
                "injected publish failure",
            ));
        }

        if exchange == DEFAULT_EXCHANGE {
            state.enqueue(routing_key, payload.to_vec(), false)?;
        } else if !state.exchanges.contains(exchange) {
            return Err(BrokerError::publish(
                exchange,
                routing_key,
                "exchange not declared",
            ));
        }

        state.published.push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: payload.to_vec(),
        });
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream> {
        let mut state = self.state.write().unwrap();
        state.ensure_connected()?;

        let receiver = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::consume(queue, "queue not declared"))?
            .receiver
            .take()
            .ok_or_else(|| BrokerError::consume(queue, "queue already has a consumer"))?;

        let stream = futures_util::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|delivery| (Ok(delivery), receiver))
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery_tag: DeliveryTag) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ensure_connected()?;

        if state.in_flight.remove(&delivery_tag).is_none() {
            return Err(BrokerError::settle(delivery_tag, "unknown delivery tag"));
        }
        state.acked.push(delivery_tag);
        Ok(())
    }

    async fn reject(&self, delivery_tag: DeliveryTag, requeue: bool) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.ensure_connected()?;

        let in_flight = state
            .in_flight
            .remove(&delivery_tag)
            .ok_or_else(|| BrokerError::settle(delivery_tag, "unknown delivery tag"))?;
        state.rejected.push((delivery_tag, requeue));

        if requeue {
            state.enqueue(&in_flight.queue, in_flight.body, true)?;
        } else {
            state
                .queues
                .entry(in_flight.queue)
                .or_default()
                .dead_letters
                .push(in_flight.body);
        }
        Ok(())
    }
}
