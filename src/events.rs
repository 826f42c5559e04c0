//! Event types emitted by the wall detector: one tagged variant per
//! lifecycle transition, carrying exactly the fields a sink needs to
//! render it. No generic event bag — sinks pattern-match on `WallEvent`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::Side;
use crate::detector::WallState;

/// A wall lifecycle event, ready for delivery to a sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum WallEvent {
    WallCandidate {
        symbol: String,
        side: Side,
        price: Decimal,
        quantity: i64,
        distance_ticks: u32,
        at: DateTime<Utc>,
    },
    WallConfirmed {
        symbol: String,
        side: Side,
        price: Decimal,
        quantity: i64,
        dwell_seconds: f64,
        at: DateTime<Utc>,
    },
    WallConsuming {
        symbol: String,
        side: Side,
        price: Decimal,
        quantity_before: i64,
        quantity_now: i64,
        drop_pct: Decimal,
        executed_volume: i64,
        at: DateTime<Utc>,
    },
    WallLost {
        symbol: String,
        side: Side,
        price: Decimal,
        last_quantity: i64,
        age_seconds: f64,
        previous_state: WallState,
        at: DateTime<Utc>,
    },
}

impl WallEvent {
    /// The cooldown bucket key this event counts against — shared across all
    /// events of the same kind, independent of payload contents.
    pub fn kind(&self) -> &'static str {
        match self {
            WallEvent::WallCandidate { .. } => "wall_candidate",
            WallEvent::WallConfirmed { .. } => "wall_confirmed",
            WallEvent::WallConsuming { .. } => "wall_consuming",
            WallEvent::WallLost { .. } => "wall_lost",
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            WallEvent::WallCandidate { symbol, .. }
            | WallEvent::WallConfirmed { symbol, .. }
            | WallEvent::WallConsuming { symbol, .. }
            | WallEvent::WallLost { symbol, .. } => symbol,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            WallEvent::WallCandidate { side, .. }
            | WallEvent::WallConfirmed { side, .. }
            | WallEvent::WallConsuming { side, .. }
            | WallEvent::WallLost { side, .. } => *side,
        }
    }

    pub fn price(&self) -> Decimal {
        match self {
            WallEvent::WallCandidate { price, .. }
            | WallEvent::WallConfirmed { price, .. }
            | WallEvent::WallConsuming { price, .. }
            | WallEvent::WallLost { price, .. } => *price,
        }
    }
}

impl std::fmt::Display for WallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WallEvent::WallCandidate {
                symbol,
                side,
                price,
                quantity,
                distance_ticks,
                at,
            } => write!(
                f,
                "[{}] CANDIDATE {} {} qty={} dist={}t @ {}",
                symbol, side, price, quantity, distance_ticks, at
            ),
            WallEvent::WallConfirmed {
                symbol,
                side,
                price,
                quantity,
                dwell_seconds,
                at,
            } => write!(
                f,
                "[{}] CONFIRMED {} {} qty={} dwell={:.1}s @ {}",
                symbol, side, price, quantity, dwell_seconds, at
            ),
            WallEvent::WallConsuming {
                symbol,
                side,
                price,
                quantity_before,
                quantity_now,
                drop_pct,
                executed_volume,
                at,
            } => write!(
                f,
                "[{}] CONSUMING {} {} {}->{} drop={} exec={} @ {}",
                symbol, side, price, quantity_before, quantity_now, drop_pct, executed_volume, at
            ),
            WallEvent::WallLost {
                symbol,
                side,
                price,
                last_quantity,
                age_seconds,
                previous_state,
                at,
            } => write!(
                f,
                "[{}] LOST {} {} last_qty={} age={:.1}s from={:?} @ {}",
                symbol, side, price, last_quantity, age_seconds, previous_state, at
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn kind_matches_variant() {
        let event = WallEvent::WallCandidate {
            symbol: "AAPL".to_string(),
            side: Side::Bid,
            price: dec!(100.00),
            quantity: 500,
            distance_ticks: 1,
            at: Utc::now(),
        };
        assert_eq!(event.kind(), "wall_candidate");
        assert_eq!(event.symbol(), "AAPL");
    }
}
