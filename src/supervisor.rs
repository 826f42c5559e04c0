//! Stream supervisor: owns the subscription to the upstream transport,
//! multiplexes depth and trade frames into per-symbol detector state, and
//! recovers from transport failures with bounded exponential backoff.
//!
//! Detector state survives reconnects deliberately -- a wall candidate seen
//! before a brief disconnect should not be forgotten just because the
//! subscription had to be reopened.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::book::{BookSnapshot, PriceLevel};
use crate::config::SupervisorConfig;
use crate::detector::{on_book_snapshot, on_trade, SymbolState};
use crate::error::{TransportError, WallWatchError};
use crate::sink::SinkDispatcher;
use crate::trade_window::Trade;
use crate::transport::{DepthFrame, Frame, InstrumentResolver, Transport, TradeFrame};

/// Exponential backoff with no attempt ceiling: transient transport trouble
/// is retried forever, doubling the wait up to a cap and resetting to the
/// initial delay after the first frame following a reconnect.
struct ReconnectBackoff {
    initial: StdDuration,
    max: StdDuration,
    current: StdDuration,
}

impl ReconnectBackoff {
    fn new(initial_seconds: f64, max_seconds: f64) -> Self {
        let initial = StdDuration::from_secs_f64(initial_seconds.max(0.0));
        Self { initial, max: StdDuration::from_secs_f64(max_seconds.max(0.0)), current: initial }
    }

    /// Returns the delay to wait before the next attempt, then doubles and
    /// caps for the attempt after that.
    fn next_delay(&mut self) -> StdDuration {
        let delay = self.current;
        let doubled_ms = (self.current.as_millis() as f64 * 2.0) as u64;
        self.current = std::cmp::min(StdDuration::from_millis(doubled_ms), self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// A symbol to add or remove from the live subscription, requested by a
/// sink-side command and applied at the next safe point in the loop.
pub enum SubscriptionChange {
    Add(String),
    Remove(String),
}

/// One live symbol: its resolved instrument identity plus the detector
/// state that persists across reconnects.
struct Tracked {
    instrument_id: String,
    tick_size: Decimal,
    state: SymbolState,
}

/// Owns the subscription lifecycle for a fixed (but mutable) set of symbols
/// and drives frames into the detector, then out to every registered sink.
pub struct Supervisor {
    config: SupervisorConfig,
    resolver: Arc<dyn InstrumentResolver>,
    transport: Box<dyn Transport>,
    sinks: Vec<SinkDispatcher>,
    cancel: CancellationToken,
    pending_changes: Arc<Mutex<Vec<SubscriptionChange>>>,
    symbols: HashMap<String, Tracked>,
    instrument_to_symbol: HashMap<String, String>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        resolver: Arc<dyn InstrumentResolver>,
        transport: Box<dyn Transport>,
        sinks: Vec<SinkDispatcher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            resolver,
            transport,
            sinks,
            cancel,
            pending_changes: Arc::new(Mutex::new(Vec::new())),
            symbols: HashMap::new(),
            instrument_to_symbol: HashMap::new(),
        }
    }

    /// Queues a symbol add/remove for the next safe resubscription point.
    pub async fn request_change(&self, change: SubscriptionChange) {
        self.pending_changes.lock().await.push(change);
    }

    /// Resolves every configured symbol, aborting with `ResolverError` if
    /// any one fails -- partial subscriptions are not allowed.
    async fn resolve_all(&mut self) -> Result<(), WallWatchError> {
        let mut resolved = HashMap::new();
        let mut instrument_to_symbol = HashMap::new();
        for symbol in &self.config.symbols {
            let info = self.resolver.resolve(symbol).await?;
            instrument_to_symbol.insert(info.instrument_id.clone(), symbol.clone());
            let state = self
                .symbols
                .remove(symbol)
                .map(|tracked| tracked.state)
                .unwrap_or_else(|| SymbolState::new(symbol, self.config.detector.clone()));
            resolved.insert(
                symbol.clone(),
                Tracked { instrument_id: info.instrument_id, tick_size: info.tick_size, state },
            );
        }
        self.symbols = resolved;
        self.instrument_to_symbol = instrument_to_symbol;
        Ok(())
    }

    fn instrument_ids(&self) -> Vec<String> {
        self.symbols.values().map(|t| t.instrument_id.clone()).collect()
    }

    async fn apply_pending_changes(&mut self) -> Result<bool, WallWatchError> {
        let changes = std::mem::take(&mut *self.pending_changes.lock().await);
        if changes.is_empty() {
            return Ok(false);
        }
        for change in changes {
            match change {
                SubscriptionChange::Add(symbol) => {
                    if self.symbols.len() >= self.config.max_symbols {
                        tracing::warn!("ignoring add for {}: max_symbols reached", symbol);
                        continue;
                    }
                    if !self.config.symbols.contains(&symbol) {
                        self.config.symbols.push(symbol);
                    }
                }
                SubscriptionChange::Remove(symbol) => {
                    self.config.symbols.retain(|s| s != &symbol);
                    self.symbols.remove(&symbol);
                }
            }
        }
        self.resolve_all().await?;
        Ok(true)
    }

    /// Runs the supervisor to completion: resolves symbols, opens the
    /// subscription, and processes frames until cancelled or a fatal error
    /// occurs.
    pub async fn run(&mut self) -> Result<(), WallWatchError> {
        self.resolve_all().await?;
        let ids = self.instrument_ids();
        self.transport.subscribe(&ids).await?;

        let mut backoff = ReconnectBackoff::new(
            self.config.retry_backoff_initial_seconds,
            self.config.retry_backoff_max_seconds,
        );
        let idle_timeout = StdDuration::from_secs_f64(self.config.stream_idle_sleep_seconds);
        let mut last_frame_at = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if self.apply_pending_changes().await? {
                let ids = self.instrument_ids();
                self.transport.close().await;
                self.transport.subscribe(&ids).await?;
            }

            let idle_deadline = last_frame_at + idle_timeout;

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    break;
                }

                frame = self.transport.next_frame() => {
                    match frame {
                        Ok(frame) => {
                            last_frame_at = Instant::now();
                            backoff.reset();
                            self.dispatch_frame(frame, last_frame_at);
                        }
                        Err(err) => {
                            self.handle_transport_error(err, &mut backoff).await?;
                            last_frame_at = Instant::now();
                        }
                    }
                }

                _ = sleep_until(idle_deadline) => {
                    tracing::warn!("no frames for {:?}, forcing reconnect", idle_timeout);
                    self.reconnect(&mut backoff).await?;
                    last_frame_at = Instant::now();
                }
            }
        }

        self.transport.close().await;
        for sink in self.sinks.drain(..) {
            sink.shutdown().await;
        }
        Ok(())
    }

    async fn handle_transport_error(
        &mut self,
        err: TransportError,
        backoff: &mut ReconnectBackoff,
    ) -> Result<(), WallWatchError> {
        if matches!(err, TransportError::Unrecoverable(_)) {
            return Err(WallWatchError::Transport(err));
        }
        tracing::warn!("transport error, reconnecting: {}", err);
        self.reconnect(backoff).await
    }

    async fn reconnect(&mut self, backoff: &mut ReconnectBackoff) -> Result<(), WallWatchError> {
        self.transport.close().await;
        let delay = backoff.next_delay();
        tokio::select! {
            _ = sleep(delay) => {}
            _ = self.cancel.cancelled() => return Ok(()),
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.resolve_all().await?;
        let ids = self.instrument_ids();
        self.transport.subscribe(&ids).await?;
        Ok(())
    }

    fn dispatch_frame(&mut self, frame: Frame, now: Instant) {
        match frame {
            Frame::Depth(depth) => self.dispatch_depth(depth, now),
            Frame::Trade(trade) => self.dispatch_trade(trade, now),
        }
    }

    fn dispatch_depth(&mut self, frame: DepthFrame, now: Instant) {
        let Some(symbol) = self.instrument_to_symbol.get(&frame.instrument_id).cloned() else {
            tracing::debug!("depth frame for unknown instrument {}", frame.instrument_id);
            return;
        };
        let Some(tracked) = self.symbols.get_mut(&symbol) else { return };

        let book = BookSnapshot {
            symbol: symbol.clone(),
            instrument_id: frame.instrument_id,
            tick_size: tracked.tick_size,
            bids: frame
                .bids
                .into_iter()
                .map(|l| PriceLevel { price: l.price, quantity: l.quantity })
                .collect(),
            asks: frame
                .asks
                .into_iter()
                .map(|l| PriceLevel { price: l.price, quantity: l.quantity })
                .collect(),
            depth: self.config.depth as usize,
            received_at: now,
        };

        let state = std::mem::replace(&mut tracked.state, SymbolState::new(&symbol, self.config.detector.clone()));
        let (state, events) = on_book_snapshot(state, book, now, Utc::now());
        tracked.state = state;
        for event in events {
            tracing::info!("{}", event);
            for sink in &self.sinks {
                sink.push(event.clone());
            }
        }
    }

    fn dispatch_trade(&mut self, frame: TradeFrame, now: Instant) {
        let Some(symbol) = self.instrument_to_symbol.get(&frame.instrument_id).cloned() else {
            return;
        };
        let Some(tracked) = self.symbols.get_mut(&symbol) else { return };

        let trade = Trade { price: frame.price, quantity: frame.quantity, side: frame.side, at: now };
        let state = std::mem::replace(&mut tracked.state, SymbolState::new(&symbol, self.config.detector.clone()));
        let (state, _events) = on_trade(state, trade, now);
        tracked.state = state;
    }
}
