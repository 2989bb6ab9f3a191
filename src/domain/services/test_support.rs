//! In-memory broker channel for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rabbitmq::{ChannelProvider, Delivery, DeliveryStream, MessageChannel, PublishOptions, RabbitMQError};
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Debug, Clone)]
pub(crate) struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub content: Vec<u8>,
    pub options: PublishOptions,
}

/// Records every publish, ack and nack. Publishing to a routing key bound
/// with [`FakeChannel::bind`] delivers the message straight back to the
/// consumer of that queue.
pub(crate) struct FakeChannel {
    closed: AtomicBool,
    fail_publish: AtomicBool,
    publish_limit: AtomicUsize,
    failing_queue: Mutex<Option<String>>,
    next_tag: AtomicU64,
    published: Mutex<Vec<PublishedMessage>>,
    acks: Mutex<Vec<u64>>,
    nacks: Mutex<Vec<(u64, bool)>>,
    consumers: Mutex<HashMap<String, UnboundedSender<Delivery>>>,
    bindings: Mutex<HashMap<String, String>>,
    message_counts: Mutex<HashMap<String, u32>>,
}

impl Default for FakeChannel {
    fn default() -> Self {
        Self {
            closed: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            publish_limit: AtomicUsize::new(usize::MAX),
            failing_queue: Mutex::new(None),
            next_tag: AtomicU64::new(0),
            published: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
            nacks: Mutex::new(Vec::new()),
            consumers: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
            message_counts: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn bind(&self, routing_key: &str, queue: &str) {
        self.bindings.lock().insert(routing_key.to_owned(), queue.to_owned());
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Accepts `limit` more publishes in total, then refuses every one after.
    pub fn fail_publishes_after(&self, limit: usize) {
        self.publish_limit.store(limit, Ordering::SeqCst);
    }

    /// Makes `consume` on `queue` fail; `None` clears it.
    pub fn fail_consume(&self, queue: Option<&str>) {
        *self.failing_queue.lock() = queue.map(str::to_owned);
    }

    /// Ends every delivery stream, as a dropped broker connection does.
    pub fn drop_consumers(&self) {
        self.consumers.lock().clear();
    }

    pub fn set_message_count(&self, queue: &str, count: u32) {
        self.message_counts.lock().insert(queue.to_owned(), count);
    }

    /// Pushes a raw delivery to the consumer of `queue` and returns its tag.
    pub fn deliver(&self, queue: &str, routing_key: &str, content: Vec<u8>) -> u64 {
        let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let consumers = self.consumers.lock();
        if let Some(sender) = consumers.get(queue) {
            let _ = sender.send(Delivery {
                delivery_tag,
                routing_key: routing_key.to_owned(),
                redelivered: false,
                content,
            });
        }
        delivery_tag
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.acks.lock().clone()
    }

    pub fn nacks(&self) -> Vec<(u64, bool)> {
        self.nacks.lock().clone()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageChannel for FakeChannel {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        content: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), RabbitMQError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(RabbitMQError::PublishError("write buffer full".into()));
        }
        {
            let mut published = self.published.lock();
            if published.len() >= self.publish_limit.load(Ordering::SeqCst) {
                return Err(RabbitMQError::PublishError("write buffer full".into()));
            }
            published.push(PublishedMessage {
                exchange: exchange.to_owned(),
                routing_key: routing_key.to_owned(),
                content: content.clone(),
                options,
            });
        }

        let queue = self.bindings.lock().get(routing_key).cloned();
        if let Some(queue) = queue {
            self.deliver(&queue, routing_key, content);
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, RabbitMQError> {
        if self.failing_queue.lock().as_deref() == Some(queue) {
            return Err(RabbitMQError::SubscriptionError(format!("queue {queue} not found")));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.consumers.lock().insert(queue.to_owned(), tx);
        Ok(rx)
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), RabbitMQError> {
        self.acks.lock().push(delivery_tag);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), RabbitMQError> {
        self.nacks.lock().push((delivery_tag, requeue));
        Ok(())
    }

    async fn message_count(&self, queue: &str) -> Result<u32, RabbitMQError> {
        Ok(self.message_counts.lock().get(queue).copied().unwrap_or(0))
    }

    async fn close(&self) -> Result<(), RabbitMQError> {
        self.closed.store(true, Ordering::SeqCst);
        self.consumers.lock().clear();
        Ok(())
    }
}

/// Hands out the same [`FakeChannel`] under every name.
pub(crate) struct FakeProvider {
    pub channel: Arc<FakeChannel>,
    requested: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channel: FakeChannel::new(),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl ChannelProvider for FakeProvider {
    async fn create_channel(&self, name: &str) -> Result<Arc<dyn MessageChannel>, RabbitMQError> {
        self.requested.lock().push(name.to_owned());
        let channel: Arc<dyn MessageChannel> = self.channel.clone();
        Ok(channel)
    }
}

/// Polls `condition` on the (usually paused) tokio clock until it holds or
/// `timeout` elapses.
pub(crate) async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
