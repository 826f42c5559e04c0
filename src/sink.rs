//! Sink interface: the push point for emitted events, plus the bounded,
//! per-sink delivery queue that keeps a slow sink from blocking ingestion.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
#[cfg(test)]
use std::sync::atomic::Ordering;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;
use crate::events::WallEvent;

/// One delivery destination for the event stream. Implementations must
/// never panic; a failed delivery is reported via `Err` and counted, not
/// allowed to kill the ingestion loop.
pub trait Sink: Send + Sync {
    fn deliver(&self, event: &WallEvent) -> Result<(), SinkError>;
}

/// Writes every event to stdout. The one concrete sink this crate ships;
/// real deployments plug in their own `Sink` implementation (chat bot,
/// metrics exporter, and so on).
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn deliver(&self, event: &WallEvent) -> Result<(), SinkError> {
        println!("{}", event);
        Ok(())
    }
}

/// A fixed-capacity FIFO that drops its oldest entry rather than reject a
/// new one, tracking how many it has dropped. Pure and synchronous so it
/// can be tested without a runtime; `SinkDispatcher` wraps one per sink.
struct DropOldestQueue {
    items: VecDeque<WallEvent>,
    capacity: usize,
    dropped: u64,
}

impl DropOldestQueue {
    fn new(capacity: usize) -> Self {
        Self { items: VecDeque::with_capacity(capacity), capacity, dropped: 0 }
    }

    fn push(&mut self, event: WallEvent) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
            self.dropped += 1;
        }
        self.items.push_back(event);
    }

    fn pop(&mut self) -> Option<WallEvent> {
        self.items.pop_front()
    }
}

/// Owns one sink's bounded queue and the dedicated task that drains it.
/// `push` never blocks the caller: on overflow the oldest queued event is
/// dropped and `dropped_count` is incremented, mirroring the drop-oldest
/// backpressure policy used elsewhere in this crate's ingestion path.
pub struct SinkDispatcher {
    queue: Arc<Mutex<DropOldestQueue>>,
    notify: Arc<Notify>,
    worker: JoinHandle<()>,
}

impl SinkDispatcher {
    pub fn spawn(sink: Arc<dyn Sink>, capacity: usize, cancel: CancellationToken) -> Self {
        let queue = Arc::new(Mutex::new(DropOldestQueue::new(capacity)));
        let notify = Arc::new(Notify::new());

        let worker_queue = queue.clone();
        let worker_notify = notify.clone();
        let worker = tokio::spawn(async move {
            loop {
                let next = worker_queue.lock().unwrap().pop();
                match next {
                    Some(event) => {
                        if let Err(err) = sink.deliver(&event) {
                            tracing::warn!("sink delivery failed: {}", err);
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = worker_notify.notified() => {}
                            _ = cancel.cancelled() => break,
                        }
                    }
                }
            }
            // Drain whatever arrived after cancellation was observed but
            // before the loop actually exited.
            while let Some(event) = worker_queue.lock().unwrap().pop() {
                let _ = sink.deliver(&event);
            }
        });

        Self { queue, notify, worker }
    }

    /// Enqueues an event for delivery. Never blocks; drops the oldest
    /// queued event if the sink is falling behind.
    pub fn push(&self, event: WallEvent) {
        self.queue.lock().unwrap().push(event);
        self.notify.notify_one();
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.lock().unwrap().dropped
    }

    pub async fn shutdown(self) {
        self.notify.notify_one();
        let _ = self.worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn sample_event(price: rust_decimal::Decimal) -> WallEvent {
        WallEvent::WallCandidate {
            symbol: "AAPL".to_string(),
            side: Side::Bid,
            price,
            quantity: 100,
            distance_ticks: 1,
            at: Utc::now(),
        }
    }

    #[test]
    fn drop_oldest_queue_evicts_front_on_overflow() {
        let mut queue = DropOldestQueue::new(2);
        queue.push(sample_event(dec!(1)));
        queue.push(sample_event(dec!(2)));
        queue.push(sample_event(dec!(3)));

        assert_eq!(queue.dropped, 1);
        assert_eq!(queue.pop().unwrap().price(), dec!(2));
        assert_eq!(queue.pop().unwrap().price(), dec!(3));
        assert!(queue.pop().is_none());
    }

    struct CountingSink {
        count: AtomicUsize,
    }

    impl Sink for CountingSink {
        fn deliver(&self, _event: &WallEvent) -> Result<(), SinkError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn deliver(&self, _event: &WallEvent) -> Result<(), SinkError> {
            Err(SinkError::DeliveryFailed("always fails".to_string()))
        }
    }

    #[tokio::test]
    async fn dispatcher_delivers_to_a_working_sink() {
        let sink = Arc::new(CountingSink { count: AtomicUsize::new(0) });
        let cancel = CancellationToken::new();
        let dispatcher = SinkDispatcher::spawn(sink.clone(), 16, cancel.clone());

        dispatcher.push(sample_event(dec!(1)));
        dispatcher.push(sample_event(dec!(2)));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(sink.count.load(Ordering::SeqCst), 2);
        cancel.cancel();
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn failing_sink_does_not_panic_the_worker() {
        let cancel = CancellationToken::new();
        let dispatcher = SinkDispatcher::spawn(Arc::new(FailingSink), 16, cancel.clone());

        dispatcher.push(sample_event(dec!(1)));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        cancel.cancel();
        dispatcher.shutdown().await;
    }
}
