use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rabbitmq::{
    ChannelProvider, Delivery, DeliveryStream, MessageChannel, PublishOptions, RabbitMQError,
};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::retry::retry_delay;
use super::stats::SharedState;
use super::validator::{DefaultMessageValidator, MessageValidator};
use super::{ConsumerConfig, ConsumerError, ConsumerState, ConsumerStats, DeliveryError};
use crate::domain::models::{EventMessage, ReceivedEnvelope};
use crate::domain::services::processor::EventProcessor;
use crate::domain::services::publisher::event_publisher::publish_received;

const RETRY_COUNT_HEADER: &str = "x-retry-count";
const ORIGINAL_MESSAGE_ID_HEADER: &str = "x-original-message-id";

/// Consumes the configured queues and resolves every delivery to an ack, a
/// delayed republish or a dead-letter.
pub struct EventConsumer {
    provider: Arc<dyn ChannelProvider>,
    pipeline: Arc<DeliveryPipeline>,
    session: Mutex<Option<Session>>,
}

/// Everything created by `start` and torn down by `stop`.
struct Session {
    cancel: CancellationToken,
    tracker: TaskTracker,
    channels: Vec<(String, Arc<dyn MessageChannel>)>,
}

impl Session {
    /// Set once a consume loop lost its delivery stream.
    fn is_halted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        for (queue, channel) in &self.channels {
            close_channel(queue, channel.as_ref()).await;
        }
    }
}

struct DeliveryPipeline {
    processor: Arc<dyn EventProcessor>,
    validator: Arc<dyn MessageValidator>,
    config: ConsumerConfig,
    shared: SharedState,
}

impl EventConsumer {
    pub fn new(
        provider: Arc<dyn ChannelProvider>,
        processor: Arc<dyn EventProcessor>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            provider,
            pipeline: Arc::new(DeliveryPipeline {
                processor,
                validator: Arc::new(DefaultMessageValidator),
                config,
                shared: SharedState::default(),
            }),
            session: Mutex::new(None),
        }
    }

    /// Replaces the default validator. Only takes effect before `start`.
    pub fn with_validator(mut self, validator: Arc<dyn MessageValidator>) -> Self {
        if let Some(pipeline) = Arc::get_mut(&mut self.pipeline) {
            pipeline.validator = validator;
        } else {
            warn!("validator not replaced, consumer already shared");
        }
        self
    }

    /// Opens one channel per configured queue and starts consuming with
    /// manual acknowledgement.
    ///
    /// A consumer halted because the broker ended its deliveries can be
    /// started again. If a queue cannot be consumed, the channels already
    /// subscribed are closed before the error is returned.
    ///
    /// # Errors
    /// * `ConsumerError::AlreadyRunning` - If the consumer was started before and not stopped
    /// * `ConsumerError::Broker` - If a channel cannot be opened or a queue cannot be consumed
    pub async fn start(&self) -> Result<(), ConsumerError> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|current| !current.is_halted()) {
            return Err(ConsumerError::AlreadyRunning);
        }
        if let Some(halted) = session.take() {
            info!("clearing halted consumer session");
            halted.shutdown().await;
        }

        let config = &self.pipeline.config;
        let mut opened = Vec::with_capacity(config.queues.len());
        for queue in &config.queues {
            match self.subscribe(queue).await {
                Ok((channel, stream)) => opened.push((queue.clone(), channel, stream)),
                Err(err) => {
                    error!(%queue, "failed to start consuming: {}", err);
                    for (queue, channel, _) in &opened {
                        close_channel(queue, channel.as_ref()).await;
                    }
                    return Err(err.into());
                }
            }
        }

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let mut channels = Vec::with_capacity(opened.len());

        self.pipeline.shared.paused.store(false, Ordering::SeqCst);
        self.pipeline.shared.running.store(true, Ordering::SeqCst);
        for (queue, channel, stream) in opened {
            tracker.spawn(consume_loop(
                queue.clone(),
                channel.clone(),
                stream,
                self.pipeline.clone(),
                permits.clone(),
                cancel.clone(),
                tracker.clone(),
            ));
            channels.push((queue, channel));
        }

        *session = Some(Session {
            cancel,
            tracker,
            channels,
        });

        info!(queues = ?config.queues, concurrency = config.concurrency, "consumer started");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
    ) -> Result<(Arc<dyn MessageChannel>, DeliveryStream), RabbitMQError> {
        let channel = self.provider.create_channel(&format!("consumer.{queue}")).await?;
        let consumer_tag = format!("{queue}-consumer-{}", Uuid::new_v4());
        let stream = channel.consume(queue, &consumer_tag).await?;
        Ok((channel, stream))
    }

    /// Stops consuming and waits for in-flight deliveries.
    ///
    /// Retries still waiting for their delay are republished immediately, so
    /// none of them can fire after this returns. Stopping a stopped consumer
    /// is a no-op.
    pub async fn stop(&self) -> Result<(), ConsumerError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        info!("stopping consumer");
        session.shutdown().await;

        self.pipeline.shared.running.store(false, Ordering::SeqCst);
        self.pipeline.shared.paused.store(false, Ordering::SeqCst);
        info!("consumer stopped");
        Ok(())
    }

    /// Requeues every delivery until [`EventConsumer::resume`] is called.
    pub fn pause(&self) {
        self.pipeline.shared.paused.store(true, Ordering::SeqCst);
        info!("consumer paused");
    }

    pub fn resume(&self) {
        self.pipeline.shared.paused.store(false, Ordering::SeqCst);
        info!("consumer resumed");
    }

    pub fn state(&self) -> ConsumerState {
        self.pipeline.shared.state()
    }

    /// Counters plus the current depth of the consumed queues.
    pub async fn get_consumer_stats(&self) -> ConsumerStats {
        let mut queue_depth = 0u64;
        let session = self.session.lock().await;
        if let Some(session) = session.as_ref().filter(|session| !session.is_halted()) {
            for (queue, channel) in &session.channels {
                match channel.message_count(queue).await {
                    Ok(count) => queue_depth += u64::from(count),
                    Err(err) => warn!(%queue, "queue depth unavailable: {}", err),
                }
            }
        }
        self.pipeline.shared.snapshot(queue_depth)
    }
}

async fn consume_loop(
    queue: String,
    channel: Arc<dyn MessageChannel>,
    mut stream: DeliveryStream,
    pipeline: Arc<DeliveryPipeline>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    debug!(%queue, "consume loop started");
    loop {
        let delivery = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            delivery = stream.recv() => delivery,
        };
        let Some(delivery) = delivery else {
            if !cancel.is_cancelled() {
                error!(%queue, "delivery stream ended by the broker, halting consumer");
                pipeline.shared.running.store(false, Ordering::SeqCst);
                cancel.cancel();
            }
            break;
        };

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                requeue(channel.as_ref(), delivery.delivery_tag).await;
                break;
            }
            permit = permits.clone().acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            break;
        };

        let channel = channel.clone();
        let pipeline = pipeline.clone();
        let retries = RetryScheduler {
            cancel: cancel.clone(),
            tracker: tracker.clone(),
        };
        tracker.spawn(async move {
            pipeline.handle(channel, delivery, &retries).await;
            drop(permit);
        });
    }
    debug!(%queue, "consume loop finished");
}

async fn close_channel(queue: &str, channel: &dyn MessageChannel) {
    if let Err(err) = channel.close().await {
        warn!(%queue, "failed to close consumer channel: {}", err);
    }
}

async fn requeue(channel: &dyn MessageChannel, delivery_tag: u64) {
    if let Err(err) = channel.nack(delivery_tag, true).await {
        error!(delivery_tag, "failed to requeue delivery: {}", err);
    }
}

/// Runs delayed republishes as tracked tasks; cancelling the token flushes
/// them right away.
struct RetryScheduler {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl RetryScheduler {
    fn schedule(
        &self,
        channel: Arc<dyn MessageChannel>,
        exchange: String,
        retry: ReceivedEnvelope,
        delay: Duration,
    ) {
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let envelope = &retry.envelope;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    debug!(message_id = %envelope.id, "consumer stopping, republishing retry now");
                }
            }

            let options = PublishOptions::persistent()
                .with_header(RETRY_COUNT_HEADER, envelope.retry_count().to_string())
                .with_header(ORIGINAL_MESSAGE_ID_HEADER, envelope.id.clone());
            match publish_received(channel.as_ref(), &exchange, &retry, options).await {
                Ok(()) => debug!(
                    message_id = %envelope.id,
                    retry_count = envelope.retry_count(),
                    routing_key = %envelope.routing_key(),
                    "retry republished"
                ),
                Err(err) => error!(
                    message_id = %envelope.id,
                    retry_count = envelope.retry_count(),
                    "failed to republish retry, message lost: {}",
                    err
                ),
            }
        });
    }
}

impl DeliveryPipeline {
    async fn handle(&self, channel: Arc<dyn MessageChannel>, delivery: Delivery, retries: &RetryScheduler) {
        let delivery_tag = delivery.delivery_tag;

        if self.shared.is_paused() {
            requeue(channel.as_ref(), delivery_tag).await;
            return;
        }

        let started = Instant::now();
        let received = match ReceivedEnvelope::from_slice(&delivery.content) {
            Ok(received) => received,
            Err(err) => {
                let err = DeliveryError::from(err);
                warn!(
                    delivery_tag,
                    routing_key = %delivery.routing_key,
                    "rejecting undecodable message: {}",
                    err
                );
                self.reject(channel.as_ref(), delivery_tag).await;
                return;
            }
        };

        let envelope = &received.envelope;
        match self.process(envelope).await {
            Ok(()) => {
                if let Err(err) = channel.ack(delivery_tag).await {
                    error!(message_id = %envelope.id, "failed to ack message: {}", err);
                    return;
                }
                self.shared.record_success(started.elapsed());
                debug!(
                    message_id = %envelope.id,
                    correlation_id = %envelope.correlation_id,
                    "message processed"
                );
            }
            Err(err) if envelope.retry_count() < self.config.max_retries => {
                let delay = retry_delay(
                    envelope.retry_count(),
                    self.config.retry_delay,
                    self.config.max_retry_delay,
                );
                warn!(
                    message_id = %envelope.id,
                    correlation_id = %envelope.correlation_id,
                    retry_count = envelope.retry_count(),
                    delay_ms = delay.as_millis() as u64,
                    "message failed, scheduling retry: {}",
                    err
                );
                self.shared.record_nack();
                retries.schedule(
                    channel.clone(),
                    self.config.exchange.clone(),
                    received.with_retry(),
                    delay,
                );
                // The scheduled copy replaces this delivery. Acking keeps it out
                // of the dead-letter queue, which only takes exhausted or
                // undecodable messages.
                if let Err(ack_err) = channel.ack(delivery_tag).await {
                    error!(message_id = %envelope.id, "failed to settle retried message: {}", ack_err);
                }
            }
            Err(err) => {
                error!(
                    message_id = %envelope.id,
                    correlation_id = %envelope.correlation_id,
                    retry_count = envelope.retry_count(),
                    "retries exhausted, dead-lettering message: {}",
                    err
                );
                self.reject(channel.as_ref(), delivery_tag).await;
            }
        }
    }

    async fn process(&self, envelope: &EventMessage) -> Result<(), DeliveryError> {
        if !envelope.skips_validation() {
            self.validator.validate(envelope).await?;
        }
        self.processor.process_event(envelope.payload.clone()).await?;
        Ok(())
    }

    async fn reject(&self, channel: &dyn MessageChannel, delivery_tag: u64) {
        if let Err(err) = channel.nack(delivery_tag, false).await {
            error!(delivery_tag, "failed to reject message: {}", err);
        }
        self.shared.record_reject();
    }
}
