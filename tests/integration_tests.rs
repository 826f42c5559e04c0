//! Integration tests for the stream supervisor, exercised against the
//! in-memory `Transport`/`InstrumentResolver` test doubles this crate ships
//! rather than a real network connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use wallwatch::transport::fakes::{ScriptedTransport, StaticResolver};
use wallwatch::{
    DepthFrame, DepthLevel, Frame, Sink, SinkDispatcher, Supervisor, SupervisorConfig,
    SubscriptionChange, WallEvent, WallWatchError,
};

fn config(symbols: &[&str]) -> SupervisorConfig {
    SupervisorConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        depth: 10,
        max_symbols: 10,
        stream_idle_sleep_seconds: 3600.0,
        retry_backoff_initial_seconds: 0.01,
        retry_backoff_max_seconds: 0.02,
        sink_queue_capacity: 4,
        transport_endpoint: None,
        detector: Default::default(),
    }
}

fn wall_depth_frame() -> Frame {
    Frame::Depth(DepthFrame {
        instrument_id: "AAPL-ID".to_string(),
        bids: vec![
            DepthLevel { price: dec!(100.00), quantity: 10 },
            DepthLevel { price: dec!(99.99), quantity: 10 },
            DepthLevel { price: dec!(99.98), quantity: 10 },
        ],
        asks: vec![
            DepthLevel { price: dec!(100.01), quantity: 10 },
            DepthLevel { price: dec!(100.02), quantity: 10 },
            DepthLevel { price: dec!(100.03), quantity: 500 },
        ],
    })
}

#[tokio::test]
async fn resolver_failure_aborts_with_no_partial_subscription() {
    let resolver = Arc::new(StaticResolver::new(vec![("AAPL", "AAPL-ID", dec!(0.01))]));
    let transport = ScriptedTransport::new(vec![]);
    let cancel = CancellationToken::new();

    let mut supervisor = Supervisor::new(
        config(&["AAPL", "MSFT"]),
        resolver,
        Box::new(transport),
        vec![],
        cancel,
    );

    let result = supervisor.run().await;
    assert!(matches!(result, Err(WallWatchError::Resolver(_))));
}

struct CountingSink {
    count: AtomicUsize,
}

impl Sink for CountingSink {
    fn deliver(&self, _event: &WallEvent) -> Result<(), wallwatch::error::SinkError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct AlwaysFailingSink;

impl Sink for AlwaysFailingSink {
    fn deliver(&self, _event: &WallEvent) -> Result<(), wallwatch::error::SinkError> {
        Err(wallwatch::error::SinkError::DeliveryFailed("nope".to_string()))
    }
}

#[tokio::test]
async fn failing_sink_does_not_block_delivery_to_other_sinks() {
    let resolver = Arc::new(StaticResolver::new(vec![("AAPL", "AAPL-ID", dec!(0.01))]));
    let transport = ScriptedTransport::new(vec![Ok(wall_depth_frame())]);
    let cancel = CancellationToken::new();

    let counting = Arc::new(CountingSink { count: AtomicUsize::new(0) });
    let sinks = vec![
        SinkDispatcher::spawn(counting.clone(), 16, cancel.clone()),
        SinkDispatcher::spawn(Arc::new(AlwaysFailingSink), 16, cancel.clone()),
    ];

    let mut supervisor =
        Supervisor::new(config(&["AAPL"]), resolver, Box::new(transport), sinks, cancel.clone());

    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { supervisor.run().await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    run_cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(counting.count.load(Ordering::SeqCst), 1);
}

struct SlowSink;

impl Sink for SlowSink {
    fn deliver(&self, _event: &WallEvent) -> Result<(), wallwatch::error::SinkError> {
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    }
}

#[tokio::test]
async fn slow_sink_queue_drops_oldest_under_backpressure() {
    let cancel = CancellationToken::new();
    let dispatcher = SinkDispatcher::spawn(Arc::new(SlowSink), 2, cancel.clone());

    for _ in 0..10 {
        dispatcher.push(wallwatch::WallEvent::WallLost {
            symbol: "AAPL".to_string(),
            side: wallwatch::Side::Ask,
            price: dec!(100.03),
            last_quantity: 0,
            age_seconds: 1.0,
            previous_state: wallwatch::WallState::Confirmed,
            at: chrono::Utc::now(),
        });
    }

    assert!(dispatcher.dropped_count() > 0);
    cancel.cancel();
    dispatcher.shutdown().await;
}

/// A transport that never yields a frame, so the supervisor's idle-guard
/// timer is the only thing that can move the loop forward. Records how many
/// times it was asked to (re)subscribe.
struct NeverArrivesTransport {
    resubscribe_count: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl wallwatch::Transport for NeverArrivesTransport {
    async fn subscribe(
        &mut self,
        _instrument_ids: &[String],
    ) -> Result<(), wallwatch::error::TransportError> {
        self.resubscribe_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, wallwatch::error::TransportError> {
        std::future::pending().await
    }

    async fn close(&mut self) {}
}

/// A transport that never yields a frame but records every `subscribe` call
/// it receives, so a test can observe a resubscribe triggered by a
/// subscription-mutation request without racing an idle-guard reconnect.
struct RecordingTransport {
    calls: Arc<std::sync::Mutex<Vec<Vec<String>>>>,
}

#[async_trait::async_trait]
impl wallwatch::Transport for RecordingTransport {
    async fn subscribe(
        &mut self,
        instrument_ids: &[String],
    ) -> Result<(), wallwatch::error::TransportError> {
        self.calls.lock().unwrap().push(instrument_ids.to_vec());
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame, wallwatch::error::TransportError> {
        std::future::pending().await
    }

    async fn close(&mut self) {}
}

#[tokio::test]
async fn subscription_change_triggers_resubscribe_with_new_symbol_set() {
    let resolver = Arc::new(StaticResolver::new(vec![
        ("AAPL", "AAPL-ID", dec!(0.01)),
        ("MSFT", "MSFT-ID", dec!(0.01)),
    ]));
    let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
    let transport = RecordingTransport { calls: calls.clone() };
    let cancel = CancellationToken::new();

    let mut cfg = config(&["AAPL"]);
    cfg.stream_idle_sleep_seconds = 3600.0;
    cfg.max_symbols = 5;

    let mut supervisor =
        Supervisor::new(cfg, resolver, Box::new(transport), vec![], cancel.clone());

    // Queued before `run()` starts: picked up on the loop's first pass over
    // pending changes, which forces an immediate resubscribe with the
    // enlarged symbol set.
    supervisor.request_change(SubscriptionChange::Add("MSFT".to_string())).await;

    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { supervisor.run().await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    run_cancel.cancel();
    handle.await.unwrap().unwrap();

    let recorded = calls.lock().unwrap();
    assert_eq!(recorded.len(), 2, "startup subscribe, then one resubscribe for the change");
    assert_eq!(recorded[0], vec!["AAPL-ID".to_string()]);
    let mut second = recorded[1].clone();
    second.sort();
    assert_eq!(second, vec!["AAPL-ID".to_string(), "MSFT-ID".to_string()]);
}

#[tokio::test]
async fn idle_guard_forces_a_reconnect_after_no_frames() {
    let resolver = Arc::new(StaticResolver::new(vec![("AAPL", "AAPL-ID", dec!(0.01))]));
    let resubscribe_count = Arc::new(AtomicUsize::new(0));
    let transport = NeverArrivesTransport { resubscribe_count: resubscribe_count.clone() };
    let cancel = CancellationToken::new();

    let mut cfg = config(&["AAPL"]);
    cfg.stream_idle_sleep_seconds = 0.02;

    let mut supervisor =
        Supervisor::new(cfg, resolver, Box::new(transport), vec![], cancel.clone());

    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { supervisor.run().await });

    tokio::time::sleep(Duration::from_millis(150)).await;
    run_cancel.cancel();
    let _ = handle.await.unwrap();

    // One subscribe at startup, then at least one more forced by the
    // idle-guard timer firing before cancellation.
    assert!(resubscribe_count.load(Ordering::SeqCst) >= 2);
}
