use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

/// Latency samples kept for the rolling average.
pub(super) const LATENCY_WINDOW: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Running,
    Paused,
}

/// Point-in-time view of the consumer. Reading it never changes behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub state: ConsumerState,
    pub messages_processed: u64,
    pub messages_acked: u64,
    pub messages_nacked: u64,
    pub messages_rejected: u64,
    /// Mean of the last 1000 successful processing times
    pub average_processing_time: Duration,
    /// Ready messages across the consumed queues
    pub queue_depth: u64,
}

/// Counters and flags shared by the consume loops and delivery tasks.
#[derive(Debug, Default)]
pub(super) struct SharedState {
    pub running: AtomicBool,
    pub paused: AtomicBool,
    pub processed: AtomicU64,
    pub acked: AtomicU64,
    pub nacked: AtomicU64,
    pub rejected: AtomicU64,
    latencies: Mutex<VecDeque<Duration>>,
}

impl SharedState {
    pub fn state(&self) -> ConsumerState {
        if !self.running.load(Ordering::SeqCst) {
            ConsumerState::Stopped
        } else if self.paused.load(Ordering::SeqCst) {
            ConsumerState::Paused
        } else {
            ConsumerState::Running
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.acked.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);

        let mut latencies = self.latencies.lock();
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(elapsed);
    }

    pub fn record_nack(&self) {
        self.nacked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reject(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn average_processing_time(&self) -> Duration {
        let latencies = self.latencies.lock();
        if latencies.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = latencies.iter().sum();
        total / latencies.len() as u32
    }

    pub fn snapshot(&self, queue_depth: u64) -> ConsumerStats {
        ConsumerStats {
            state: self.state(),
            messages_processed: self.processed.load(Ordering::Relaxed),
            messages_acked: self.acked.load(Ordering::Relaxed),
            messages_nacked: self.nacked.load(Ordering::Relaxed),
            messages_rejected: self.rejected.load(Ordering::Relaxed),
            average_processing_time: self.average_processing_time(),
            queue_depth,
        }
    }
}
