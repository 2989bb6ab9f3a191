use amqprs::{
    Ack, BasicProperties, Cancel, Close, CloseChannel, Nack, Return,
    callbacks::{ChannelCallback, ConnectionCallback},
    channel::Channel,
    connection::Connection,
};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

/// Asynchronous connection notifications forwarded to the manager's
/// supervisor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionEvent {
    /// Network I/O on the connection failed
    Error(String),
    /// Broker closed the connection
    Closed(String),
    Blocked(String),
    Unblocked,
}

/// Events tagged with the generation of the connection that raised them.
pub(crate) type ConnectionEventSender = UnboundedSender<(u64, ConnectionEvent)>;

pub(crate) struct RabbitConnectionCallback {
    generation: u64,
    events: ConnectionEventSender,
}

impl RabbitConnectionCallback {
    pub(crate) fn new(generation: u64, events: ConnectionEventSender) -> Self {
        Self { generation, events }
    }

    fn forward(&self, event: ConnectionEvent) {
        if self.events.send((self.generation, event)).is_err() {
            debug!("connection supervisor is gone, event dropped");
        }
    }
}

#[async_trait]
impl ConnectionCallback for RabbitConnectionCallback {
    async fn close(
        &mut self,
        _connection: &Connection,
        close: Close,
    ) -> Result<(), amqprs::error::Error> {
        warn!("connection closed by broker {:?}", close);
        self.forward(ConnectionEvent::Closed(format!("{:?}", close)));
        Ok(())
    }

    /// Callback to handle connection `blocked` indication from server
    async fn blocked(&mut self, _connection: &Connection, reason: String) {
        warn!("connection blocked {:?}", reason);
        self.forward(ConnectionEvent::Blocked(reason));
    }

    /// Callback to handle connection `unblocked` indication from server
    async fn unblocked(&mut self, _connection: &Connection) {
        info!("connection unblocked");
        self.forward(ConnectionEvent::Unblocked);
    }

    /// Callback to handle secret updated indication from server
    async fn secret_updated(&mut self, _connection: &Connection) {
        debug!("connection secret updated");
    }
}

pub(crate) struct RabbitChannelCallback {
    name: String,
}

impl RabbitChannelCallback {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }
}

#[async_trait]
impl ChannelCallback for RabbitChannelCallback {
    async fn close(
        &mut self,
        _channel: &Channel,
        close: CloseChannel,
    ) -> Result<(), amqprs::error::Error> {
        error!(channel = %self.name, "channel closed by broker {:?}", close);
        Ok(())
    }

    async fn cancel(&mut self, _channel: &Channel, cancel: Cancel) -> Result<(), amqprs::error::Error> {
        warn!(channel = %self.name, "consumer cancelled by broker {:?}", cancel);
        Ok(())
    }

    async fn flow(&mut self, _channel: &Channel, active: bool) -> Result<bool, amqprs::error::Error> {
        debug!(channel = %self.name, "channel flow {:?}", active);
        Ok(true)
    }

    async fn publish_ack(&mut self, _channel: &Channel, _ack: Ack) {}

    async fn publish_nack(&mut self, _channel: &Channel, nack: Nack) {
        warn!(channel = %self.name, "publish nacked by broker {:?}", nack);
    }

    async fn publish_return(
        &mut self,
        _channel: &Channel,
        ret: Return,
        _props: BasicProperties,
        _content: Vec<u8>,
    ) {
        warn!(channel = %self.name, "unroutable message returned {:?}", ret);
    }
}
