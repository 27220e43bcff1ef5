//! In-process message bus.

use super::{
    DeadLetter, Delivery, MessageBus, MessageId, RedeliveryDecision, RedeliveryPolicy,
    Subscription,
};
use crate::core::{Message, Topic};
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A record of one accepted publish.
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    /// Assigned message id.
    pub message_id: MessageId,
    /// Topic.
    pub topic: Topic,
    /// Message body.
    pub message: Message,
    /// Number of subscriptions the message was delivered to.
    pub fanout: usize,
    /// When it was accepted.
    pub published_at: DateTime<Utc>,
}

struct SubscriptionState {
    name: String,
    topic: Topic,
    tx: mpsc::UnboundedSender<Delivery>,
    backlog: AtomicUsize,
}

impl SubscriptionState {
    fn enqueue(&self, delivery: Delivery) {
        self.backlog.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(delivery).is_err() {
            self.release();
            warn!(subscription = %self.name, topic = %self.topic, "Subscription closed, delivery dropped");
        }
    }

    fn release(&self) {
        let _ = self
            .backlog
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }
}

/// An in-memory bus with per-subscription queues.
///
/// Nacked deliveries come back after the [`RedeliveryPolicy`] delay until
/// attempts run out, then land in the dead-letter list. An optional
/// de-duplication window drops re-publishes of an identical message on the
/// same topic, which keeps a retried fan-out from doubling its branches.
pub struct InMemoryBus {
    topics: DashMap<Topic, Vec<Arc<SubscriptionState>>>,
    policy: RedeliveryPolicy,
    dedup_window: Option<Duration>,
    recent: DashMap<String, (MessageId, Instant)>,
    log: RwLock<Vec<PublishedRecord>>,
    dead_letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(RedeliveryPolicy::default())
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBus")
            .field("topics", &self.topics.len())
            .field("policy", &self.policy)
            .field("dedup_window", &self.dedup_window)
            .finish()
    }
}

impl InMemoryBus {
    /// Creates a bus with the given redelivery policy.
    #[must_use]
    pub fn new(policy: RedeliveryPolicy) -> Self {
        Self {
            topics: DashMap::new(),
            policy,
            dedup_window: None,
            recent: DashMap::new(),
            log: RwLock::new(Vec::new()),
            dead_letters: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Enables publish de-duplication within the window.
    #[must_use]
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = Some(window);
        self
    }

    /// The redelivery policy.
    #[must_use]
    pub fn policy(&self) -> &RedeliveryPolicy {
        &self.policy
    }

    /// Every accepted publish, in order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedRecord> {
        self.log.read().clone()
    }

    /// Messages accepted on one topic, in order.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<Message> {
        self.log
            .read()
            .iter()
            .filter(|record| record.topic.as_str() == topic)
            .map(|record| record.message.clone())
            .collect()
    }

    /// Parked deliveries.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.read().clone()
    }

    /// Total backlog across all subscriptions.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.topics
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .map(|s| s.backlog.load(Ordering::SeqCst))
                    .collect::<Vec<_>>()
            })
            .sum()
    }

    /// Number of subscriptions attached to a topic.
    #[must_use]
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.topics
            .get(&Topic::new(topic))
            .map_or(0, |subs| subs.len())
    }

    /// Returns the id of an identical recent publish, or claims the
    /// fingerprint for `id`. Expired fingerprints are evicted first.
    fn check_duplicate(&self, topic: &Topic, message: &Message, id: MessageId) -> Option<MessageId> {
        let window = self.dedup_window?;
        self.recent.retain(|_, (_, claimed)| claimed.elapsed() < window);

        let fingerprint = message.fingerprint(topic.as_str());
        let mut entry = self
            .recent
            .entry(fingerprint)
            .or_insert((id, Instant::now()));

        if entry.0 == id {
            return None;
        }
        if entry.1.elapsed() < window {
            return Some(entry.0);
        }
        *entry = (id, Instant::now());
        None
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &Topic, message: Message) -> Result<MessageId> {
        let message_id = Uuid::new_v4();

        if let Some(existing) = self.check_duplicate(topic, &message, message_id) {
            debug!(topic = %topic, message_id = %existing, "Duplicate publish absorbed");
            return Ok(existing);
        }

        let published_at = Utc::now();
        let subscribers = self
            .topics
            .get(topic)
            .map(|subs| subs.clone())
            .unwrap_or_default();

        for state in &subscribers {
            state.enqueue(Delivery {
                message_id,
                topic: topic.clone(),
                subscription: state.name.clone(),
                message: message.clone(),
                attempt: 1,
                published_at,
            });
        }

        debug!(
            topic = %topic,
            message_id = %message_id,
            subscribers = subscribers.len(),
            "Message published"
        );

        self.log.write().push(PublishedRecord {
            message_id,
            topic: topic.clone(),
            message,
            fanout: subscribers.len(),
            published_at,
        });

        Ok(message_id)
    }

    async fn subscribe(&self, topic: &Topic, subscription: &str) -> Result<Box<dyn Subscription>> {
        let mut subs = self.topics.entry(topic.clone()).or_default();
        if subs.iter().any(|s| s.name == subscription) {
            return Err(PipelineError::Unsupported(format!(
                "subscription '{subscription}' is already attached to {topic}"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(SubscriptionState {
            name: subscription.to_string(),
            topic: topic.clone(),
            tx,
            backlog: AtomicUsize::new(0),
        });
        subs.push(state.clone());

        Ok(Box::new(InMemorySubscription {
            state,
            rx,
            policy: self.policy.clone(),
            dead_letters: self.dead_letters.clone(),
        }))
    }
}

/// Pull handle returned by [`InMemoryBus::subscribe`].
pub struct InMemorySubscription {
    state: Arc<SubscriptionState>,
    rx: mpsc::UnboundedReceiver<Delivery>,
    policy: RedeliveryPolicy,
    dead_letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemorySubscription {
    fn park(&self, delivery: &Delivery, reason: &str) {
        self.dead_letters.write().push(DeadLetter {
            delivery: delivery.clone(),
            reason: reason.to_string(),
            parked_at: Utc::now(),
        });
        self.state.release();
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn topic(&self) -> &Topic {
        &self.state.topic
    }

    async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<()> {
        self.state.release();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<()> {
        match self.policy.decide(delivery.attempt) {
            RedeliveryDecision::DeadLetter => {
                warn!(
                    subscription = %self.state.name,
                    message_id = %delivery.message_id,
                    attempts = delivery.attempt,
                    "Delivery attempts exhausted, dead-lettering"
                );
                self.park(delivery, "max delivery attempts exceeded");
            }
            RedeliveryDecision::Redeliver(delay) => {
                let mut next = delivery.clone();
                next.attempt += 1;
                debug!(
                    subscription = %self.state.name,
                    message_id = %delivery.message_id,
                    next_attempt = next.attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling redelivery"
                );

                let state = self.state.clone();
                if delay.is_zero() {
                    if state.tx.send(next).is_err() {
                        state.release();
                    }
                } else {
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if state.tx.send(next).is_err() {
                            state.release();
                        }
                    });
                }
            }
        }
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        self.park(delivery, reason);
        Ok(())
    }

    fn backlog(&self) -> usize {
        self.state.backlog.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(lang: &str) -> Message {
        Message::new().with_field("filename", "photo.jpg").with_field("lang", lang)
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscription() {
        let bus = InMemoryBus::default();
        let topic = Topic::new("labels-topic");
        let mut a = bus.subscribe(&topic, "a").await.unwrap();
        let mut b = bus.subscribe(&topic, "b").await.unwrap();

        let id = bus.publish(&topic, message("fr")).await.unwrap();

        let da = a.try_recv().unwrap();
        let db = b.try_recv().unwrap();
        assert_eq!(da.message_id, id);
        assert_eq!(db.message_id, id);
        assert_eq!(da.subscription, "a");
        assert_eq!(da.attempt, 1);
        assert_eq!(bus.backlog(), 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_accepted() {
        let bus = InMemoryBus::default();
        bus.publish(&Topic::new("nobody"), message("en")).await.unwrap();

        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.published()[0].fanout, 0);
    }

    #[tokio::test]
    async fn test_ack_clears_backlog() {
        let bus = InMemoryBus::default();
        let topic = Topic::new("t");
        let mut sub = bus.subscribe(&topic, "s").await.unwrap();
        bus.publish(&topic, message("en")).await.unwrap();

        let delivery = sub.recv().await.unwrap();
        assert_eq!(sub.backlog(), 1);
        sub.ack(&delivery).await.unwrap();
        assert_eq!(sub.backlog(), 0);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_nack_redelivers_then_dead_letters() {
        let bus = InMemoryBus::new(RedeliveryPolicy::immediate(3));
        let topic = Topic::new("t");
        let mut sub = bus.subscribe(&topic, "s").await.unwrap();
        bus.publish(&topic, message("en")).await.unwrap();

        for expected_attempt in 1..=3 {
            let delivery = sub.try_recv().unwrap();
            assert_eq!(delivery.attempt, expected_attempt);
            sub.nack(&delivery).await.unwrap();
        }

        assert!(sub.try_recv().is_none());
        assert_eq!(sub.backlog(), 0);
        let parked = bus.dead_letters();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].delivery.attempt, 3);
    }

    #[tokio::test]
    async fn test_delayed_redelivery() {
        let policy = RedeliveryPolicy::immediate(2).with_base_delay_ms(10).with_max_delay_ms(10);
        let bus = InMemoryBus::new(policy);
        let topic = Topic::new("t");
        let mut sub = bus.subscribe(&topic, "s").await.unwrap();
        bus.publish(&topic, message("en")).await.unwrap();

        let first = sub.recv().await.unwrap();
        sub.nack(&first).await.unwrap();
        assert!(sub.try_recv().is_none());
        assert_eq!(sub.backlog(), 1);

        let second = sub.recv().await.unwrap();
        assert!(second.is_redelivery());
        assert_eq!(second.message_id, first.message_id);
    }

    #[tokio::test]
    async fn test_reject_parks_with_reason() {
        let bus = InMemoryBus::default();
        let topic = Topic::new("t");
        let mut sub = bus.subscribe(&topic, "s").await.unwrap();
        bus.publish(&topic, message("en")).await.unwrap();

        let delivery = sub.try_recv().unwrap();
        sub.reject(&delivery, "text is not provided").await.unwrap();

        assert_eq!(sub.backlog(), 0);
        assert_eq!(bus.dead_letters()[0].reason, "text is not provided");
    }

    #[tokio::test]
    async fn test_dedup_window_absorbs_identical_publish() {
        let bus = InMemoryBus::default().with_dedup_window(Duration::from_secs(60));
        let topic = Topic::new("t");
        let mut sub = bus.subscribe(&topic, "s").await.unwrap();

        let first = bus.publish(&topic, message("fr")).await.unwrap();
        let second = bus.publish(&topic, message("fr")).await.unwrap();
        let other = bus.publish(&topic, message("en")).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(bus.published().len(), 2);
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dedup_window_evicts_expired_fingerprints() {
        let bus = InMemoryBus::default().with_dedup_window(Duration::from_millis(20));
        let topic = Topic::new("t");

        let first = bus.publish(&topic, message("fr")).await.unwrap();
        bus.publish(&topic, message("en")).await.unwrap();
        assert_eq!(bus.recent.len(), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let again = bus.publish(&topic, message("fr")).await.unwrap();

        assert_ne!(first, again);
        assert_eq!(bus.recent.len(), 1);
        assert_eq!(bus.published().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_subscription_name_rejected() {
        let bus = InMemoryBus::default();
        let topic = Topic::new("t");
        let _sub = bus.subscribe(&topic, "s").await.unwrap();

        assert!(bus.subscribe(&topic, "s").await.is_err());
        assert_eq!(bus.subscription_count("t"), 1);
    }
}
