use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use rabbitmq::ConnectionManager;
use tracing::{Level, error, info};

use game_event_queue::{
    ConsumerState, Event, EventConsumer, EventHandler, EventType, HandlerRegistry, HandlerResult,
    ModuleEventProcessor, QueueConfig, StaticRoutingTable, build_topology,
};

/// Consumes game-server events from RabbitMQ
#[derive(Parser, Debug)]
#[command(author, version, about = "Consumes game-server telemetry events from RabbitMQ")]
struct Args {
    /// Comma-separated queues to consume, overrides CONSUMER_QUEUES
    #[arg(short, long, value_delimiter = ',')]
    queues: Option<Vec<String>>,

    /// Seconds between two consumer statistics log lines
    #[arg(short, long, default_value = "30")]
    stats_interval: u64,
}

/// Logs every event it receives.
struct EventLogger;

#[async_trait]
impl EventHandler for EventLogger {
    fn name(&self) -> &str {
        "event-logger"
    }

    fn event_types(&self) -> Vec<EventType> {
        EventType::ALL.into_iter().chain([EventType::Unknown]).collect()
    }

    async fn handle_event(&self, event: &Event) -> HandlerResult {
        info!(
            event_type = %event.event_type,
            server_id = event.server_id,
            event_id = event.event_id.as_deref().unwrap_or_default(),
            correlation_id = event.correlation_id.as_deref().unwrap_or_default(),
            "event received"
        );
        Ok(())
    }
}

fn log_level() -> Level {
    std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    tracing_subscriber::fmt().with_max_level(log_level()).init();

    let mut config = QueueConfig::try_from_env().context("invalid configuration")?;
    if let Some(queues) = args.queues {
        config.queues = queues;
    }

    let topology = build_topology(&StaticRoutingTable);
    let exchange = topology.exchange.clone();
    let manager = ConnectionManager::new(config.connection_config(topology));
    manager
        .connect()
        .await
        .context("could not connect to RabbitMQ")?;

    let registry = Arc::new(HandlerRegistry::new());
    registry.register_handler(Arc::new(EventLogger));
    let processor = Arc::new(ModuleEventProcessor::new(registry));

    let consumer = EventConsumer::new(
        Arc::new(manager.clone()),
        processor,
        config.consumer_config(&exchange),
    );
    consumer.start().await.context("could not start the consumer")?;
    info!(queues = ?config.queues, "event consumer running, press Ctrl-C to stop");

    let mut stats_interval = tokio::time::interval(Duration::from_secs(args.stats_interval.max(1)));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    error!("failed to listen for Ctrl-C: {}", err);
                }
                break;
            }
            _ = stats_interval.tick() => {
                let stats = consumer.get_consumer_stats().await;
                let connection = manager.get_connection_stats().await;
                info!(
                    connected = connection.connected,
                    processed = stats.messages_processed,
                    acked = stats.messages_acked,
                    nacked = stats.messages_nacked,
                    rejected = stats.messages_rejected,
                    avg_ms = stats.average_processing_time.as_millis() as u64,
                    queue_depth = stats.queue_depth,
                    "consumer stats"
                );
                if stats.state == ConsumerState::Stopped {
                    break;
                }
            }
        }
    }

    info!("shutting down");
    consumer.stop().await.context("could not stop the consumer")?;
    manager
        .disconnect()
        .await
        .context("could not disconnect from RabbitMQ")?;
    info!("event consumer stopped");
    Ok(())
}
