//! Property-based tests for the wall detector, using quickcheck to generate
//! sequences of book snapshots and check the invariants in the detector's
//! contract hold regardless of input.

use quickcheck_macros::quickcheck;
use quickcheck::TestResult;
use rust_decimal::Decimal;
use wallwatch::{on_book_snapshot, BookSnapshot, DetectorConfig, PriceLevel, Side, SymbolState, WallEvent};

fn book(ask_qty: i64, now: tokio::time::Instant) -> BookSnapshot {
    BookSnapshot {
        symbol: "PROP".to_string(),
        instrument_id: "PROP-ID".to_string(),
        tick_size: Decimal::new(1, 2),
        bids: vec![
            PriceLevel { price: Decimal::new(10000, 2), quantity: 10 },
            PriceLevel { price: Decimal::new(9999, 2), quantity: 10 },
            PriceLevel { price: Decimal::new(9998, 2), quantity: 10 },
        ],
        asks: vec![
            PriceLevel { price: Decimal::new(10001, 2), quantity: ask_qty.max(1) },
            PriceLevel { price: Decimal::new(10002, 2), quantity: 10 },
            PriceLevel { price: Decimal::new(10003, 2), quantity: 10 },
        ],
        depth: 20,
        received_at: now,
    }
}

#[quickcheck]
fn confirmed_never_precedes_candidate_for_same_key(quantities: Vec<i64>) -> TestResult {
    if quantities.is_empty() || quantities.len() > 20 {
        return TestResult::discard();
    }

    let mut state = SymbolState::new("PROP", DetectorConfig::default());
    let start = tokio::time::Instant::now();
    let mut seen_candidate = std::collections::HashSet::new();
    let wall_clock = chrono::Utc::now();

    for (i, raw) in quantities.into_iter().enumerate() {
        let qty = raw.rem_euclid(2000).max(1);
        let now = start + std::time::Duration::from_secs(i as u64 * 40);
        let b = book(qty, now);
        let (next_state, events) = on_book_snapshot(state, b, now, wall_clock);
        state = next_state;

        for event in &events {
            let key = (event.symbol().to_string(), event.side(), event.price());
            match event {
                WallEvent::WallCandidate { .. } => {
                    seen_candidate.insert(key);
                }
                WallEvent::WallConfirmed { .. } => {
                    if !seen_candidate.contains(&key) {
                        return TestResult::failed();
                    }
                }
                _ => {}
            }
        }
    }
    TestResult::passed()
}

#[quickcheck]
fn lost_is_never_emitted_for_a_candidate_only_key(appear_then_vanish_at: u8) -> TestResult {
    let mut state = SymbolState::new("PROP", DetectorConfig::default());
    let start = tokio::time::Instant::now();
    let wall_clock = chrono::Utc::now();
    let vanish_tick = (appear_then_vanish_at % 3) as u64 + 1;

    for i in 0..vanish_tick {
        let now = start + std::time::Duration::from_millis(i * 100);
        let b = book(500, now);
        let (next_state, _events) = on_book_snapshot(state, b, now, wall_clock);
        state = next_state;
    }

    let now = start + std::time::Duration::from_millis(vanish_tick * 100);
    let mut b = book(500, now);
    b.asks[0].quantity = 0;
    b.asks.remove(0);
    let (_state, events) = on_book_snapshot(state, b, now, wall_clock);

    for event in &events {
        if matches!(event, WallEvent::WallLost { side: Side::Ask, .. }) {
            return TestResult::failed();
        }
    }
    TestResult::passed()
}

#[quickcheck]
fn replaying_identical_snapshot_twice_emits_nothing_new(qty: i64) -> TestResult {
    let qty = qty.rem_euclid(2000).max(1);
    let state = SymbolState::new("PROP", DetectorConfig::default());
    let start = tokio::time::Instant::now();
    let wall_clock = chrono::Utc::now();

    let b1 = book(qty, start);
    let (state, _first_events) = on_book_snapshot(state, b1.clone(), start, wall_clock);
    let (_state, second_events) = on_book_snapshot(state, b1, start, wall_clock);
    TestResult::from_bool(second_events.is_empty())
}
