//! Trade window: a rolling, time-bounded record of executed volume, queried
//! by price to support the consuming-transition check in the detector.

use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Which side initiated an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buyer,
    Seller,
}

/// One executed print, recorded with the monotonic receipt time so stale
/// entries can be trimmed without a wall-clock read.
#[derive(Debug, Clone, Copy)]
struct Print {
    at: Instant,
    price: Decimal,
    quantity: i64,
}

/// A trade executed on the tape, as delivered by the transport.
#[derive(Debug, Clone, Copy)]
pub struct Trade {
    pub price: Decimal,
    pub quantity: i64,
    pub side: TradeSide,
    pub at: Instant,
}

/// Rolling deque of recent trades, trimmed to the longest window any caller
/// has asked about so it never grows unbounded.
#[derive(Debug, Clone, Default)]
pub struct TradeWindow {
    prints: VecDeque<Print>,
    max_seen_window: Duration,
}

impl TradeWindow {
    pub fn new() -> Self {
        Self {
            prints: VecDeque::new(),
            max_seen_window: Duration::ZERO,
        }
    }

    /// Appends a trade and evicts entries older than the widest window
    /// observed so far.
    pub fn record(&mut self, trade: &Trade) {
        self.prints.push_back(Print {
            at: trade.at,
            price: trade.price,
            quantity: trade.quantity,
        });
        self.trim(trade.at, self.max_seen_window);
    }

    fn trim(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.prints.front() {
            if now.saturating_duration_since(front.at) > window {
                self.prints.pop_front();
            } else {
                break;
            }
        }
    }

    fn widen_window(&mut self, now: Instant, window_seconds: f64) -> Duration {
        let window = Duration::from_secs_f64(window_seconds.max(0.0));
        if window > self.max_seen_window {
            self.max_seen_window = window;
        }
        self.trim(now, self.max_seen_window);
        window
    }

    /// Sum of quantities executed at exactly `price` within the last
    /// `window_seconds`, as of `now`.
    pub fn volume_at_price(&mut self, price: Decimal, window_seconds: f64, now: Instant) -> i64 {
        let window = self.widen_window(now, window_seconds);
        self.prints
            .iter()
            .filter(|p| now.saturating_duration_since(p.at) <= window && p.price == price)
            .map(|p| p.quantity)
            .sum()
    }

    /// Total quantity executed across all prices within the last
    /// `window_seconds`, used for market-activity heuristics.
    pub fn any_volume_in_window(&mut self, window_seconds: f64, now: Instant) -> i64 {
        let window = self.widen_window(now, window_seconds);
        self.prints
            .iter()
            .filter(|p| now.saturating_duration_since(p.at) <= window)
            .map(|p| p.quantity)
            .sum()
    }
}
