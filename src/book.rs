//! Book model: an immutable snapshot of top-N bid/ask levels plus the
//! handful of statistics the detector consults on every update.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::time::Instant;

/// Which side of the book a price level sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// One resting price level: a price and the quantity resting there, in lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: i64,
}

/// A full top-N snapshot of one instrument's book, as delivered by the
/// transport. `bids` is sorted descending by price, `asks` ascending;
/// both assumed complete (never incremental deltas).
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    pub symbol: String,
    pub instrument_id: String,
    pub tick_size: Decimal,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub depth: usize,
    pub received_at: Instant,
}

impl BookSnapshot {
    fn levels(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Top of book on `side`, or `None` if that side is empty.
    pub fn best_price(&self, side: Side) -> Option<Decimal> {
        self.levels(side).first().map(|l| l.price)
    }

    /// Resting quantity at `price` on `side`, zero if no level sits there.
    pub fn find_level(&self, side: Side, price: Decimal) -> i64 {
        self.levels(side)
            .iter()
            .find(|l| l.price == price)
            .map(|l| l.quantity)
            .unwrap_or(0)
    }

    /// Median quantity across the top `top_n` levels on `side`. Returns the
    /// lone quantity when exactly one level is present, zero when none are.
    pub fn median_quantity(&self, side: Side, top_n: usize) -> Decimal {
        let mut quantities: Vec<i64> = self
            .levels(side)
            .iter()
            .take(top_n)
            .map(|l| l.quantity)
            .collect();
        match quantities.len() {
            0 => Decimal::ZERO,
            1 => Decimal::from(quantities[0]),
            _ => {
                quantities.sort_unstable();
                let mid = quantities.len() / 2;
                if quantities.len() % 2 == 1 {
                    Decimal::from(quantities[mid])
                } else {
                    (Decimal::from(quantities[mid - 1]) + Decimal::from(quantities[mid]))
                        / Decimal::from(2)
                }
            }
        }
    }

    /// Distance from best-of-book to `price`, in ticks. For bids, a lower
    /// price is further away (positive distance downward); for asks, a
    /// higher price is further away. `None` if `price` sits on the wrong
    /// side of best, or if `tick_size` is non-positive.
    pub fn distance_ticks(&self, side: Side, price: Decimal) -> Option<u32> {
        let best = self.best_price(side)?;
        if self.tick_size <= Decimal::ZERO {
            return None;
        }
        let diff = match side {
            Side::Bid => best - price,
            Side::Ask => price - best,
        };
        if diff < Decimal::ZERO {
            return None;
        }
        let ticks = (diff / self.tick_size).round();
        u32::from_str(&ticks.to_string()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(bids: Vec<(Decimal, i64)>, asks: Vec<(Decimal, i64)>) -> BookSnapshot {
        BookSnapshot {
            symbol: "TEST".to_string(),
            instrument_id: "TEST-ID".to_string(),
            tick_size: dec!(0.01),
            bids: bids
                .into_iter()
                .map(|(price, quantity)| PriceLevel { price, quantity })
                .collect(),
            asks: asks
                .into_iter()
                .map(|(price, quantity)| PriceLevel { price, quantity })
                .collect(),
            depth: 20,
            received_at: Instant::now(),
        }
    }

    #[test]
    fn median_of_odd_count() {
        let book = snapshot(vec![(dec!(100.00), 10), (dec!(99.99), 30), (dec!(99.98), 20)], vec![]);
        assert_eq!(book.median_quantity(Side::Bid, 3), Decimal::from(20));
    }

    #[test]
    fn median_of_single_level() {
        let book = snapshot(vec![(dec!(100.00), 7)], vec![]);
        assert_eq!(book.median_quantity(Side::Bid, 3), Decimal::from(7));
    }

    #[test]
    fn median_of_empty_side_is_zero() {
        let book = snapshot(vec![], vec![]);
        assert_eq!(book.median_quantity(Side::Ask, 3), Decimal::ZERO);
    }

    #[test]
    fn distance_ticks_on_ask_side() {
        let book = snapshot(vec![], vec![(dec!(100.01), 10), (dec!(100.03), 500)]);
        assert_eq!(book.distance_ticks(Side::Ask, dec!(100.03)), Some(2));
    }

    #[test]
    fn distance_ticks_wrong_side_is_none() {
        let book = snapshot(vec![(dec!(100.00), 10)], vec![]);
        assert_eq!(book.distance_ticks(Side::Bid, dec!(100.01)), None);
    }

    #[test]
    fn find_level_absent_is_zero() {
        let book = snapshot(vec![(dec!(100.00), 10)], vec![]);
        assert_eq!(book.find_level(Side::Bid, dec!(99.00)), 0);
    }

    #[test]
    fn best_price_none_when_side_empty() {
        let book = snapshot(vec![], vec![]);
        assert_eq!(book.best_price(Side::Bid), None);
    }
}
