//! Wall Detector: a pure, per-symbol state machine. Each call takes the
//! current `SymbolState` plus one new input (a book snapshot or a trade)
//! and the monotonic time of receipt, and returns the updated state plus
//! any events to emit. No I/O and no wall-clock reads happen in here —
//! `now` is always supplied by the caller, which makes every transition
//! replayable and unit-testable without a runtime.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::book::{BookSnapshot, Side};
use crate::config::DetectorConfig;
use crate::events::WallEvent;
use crate::trade_window::{Trade, TradeWindow};

/// Lifecycle state of a tracked candidate. There is no explicit `Absent` or
/// `Lost` variant: those are represented by the candidate's absence from
/// `SymbolState::candidates`, not by a state value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallState {
    Candidate,
    Confirmed,
    Consuming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CandidateKey {
    side: Side,
    price: Decimal,
}

/// A resting level under observation at `(side, price)`.
#[derive(Debug, Clone)]
struct WallCandidate {
    side: Side,
    price: Decimal,
    quantity_initial: i64,
    quantity_current: i64,
    first_seen_at: Instant,
    last_seen_at: Instant,
    last_state: WallState,
    state_entered_at: Instant,
    distance_ticks_at_first_seen: u32,
    /// Recent (time, quantity) observations, trimmed to
    /// `consume_window_seconds`, used to find `q_ref` for the consuming check.
    quantity_history: VecDeque<(Instant, i64)>,
}

/// Per-symbol detector state: the latest book, the trade tape, every
/// tracked candidate, and the cooldown ledger. Owned exclusively by the
/// supervisor task that drives it; never shared.
#[derive(Debug, Clone)]
pub struct SymbolState {
    pub symbol: String,
    config: DetectorConfig,
    latest_book: Option<BookSnapshot>,
    trades: TradeWindow,
    candidates: HashMap<CandidateKey, WallCandidate>,
    last_event_at_by_kind: HashMap<(&'static str, Side, Decimal), Instant>,
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>, config: DetectorConfig) -> Self {
        Self {
            symbol: symbol.into(),
            config,
            latest_book: None,
            trades: TradeWindow::new(),
            candidates: HashMap::new(),
            last_event_at_by_kind: HashMap::new(),
        }
    }

    /// Number of candidates currently tracked, for resource-bound checks.
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }
}

/// Whether `quantity` clears the median-ratio bar. When `median` is zero
/// there is no baseline to ratio against, so the ratio term is treated as
/// vacuously satisfied and only the absolute floor applies.
fn clears_ratio(quantity: i64, median: Decimal, ratio: Decimal, shrink: Decimal) -> bool {
    if median <= Decimal::ZERO {
        return true;
    }
    Decimal::from(quantity) >= ratio * median * (Decimal::ONE - shrink)
}

fn maybe_emit(
    state: &mut SymbolState,
    events: &mut Vec<WallEvent>,
    kind: &'static str,
    side: Side,
    price: Decimal,
    now: Instant,
    event: WallEvent,
) {
    let cooldown = state.config.cooldown_for(kind);
    let key = (kind, side, price);
    let allowed = match state.last_event_at_by_kind.get(&key) {
        Some(last) => now.saturating_duration_since(*last) >= cooldown,
        None => true,
    };
    if allowed {
        state.last_event_at_by_kind.insert(key, now);
        events.push(event);
    }
}

fn ticks_between(tick_size: Decimal, a: Decimal, b: Decimal) -> Option<u32> {
    if tick_size <= Decimal::ZERO {
        return None;
    }
    let ticks = ((a - b).abs() / tick_size).round();
    u32::from_str(&ticks.to_string()).ok()
}

/// Drops every candidate on `side` without emitting `WallLost`, because the
/// top of book teleported and the prior candidates no longer describe a
/// coherent market.
fn teleport_reset_side(state: &mut SymbolState, side: Side) {
    state.candidates.retain(|key, _| key.side != side);
}

fn evaluate_lost(
    state: &mut SymbolState,
    book: &BookSnapshot,
    side: Side,
    now: Instant,
    wall_clock: DateTime<Utc>,
    events: &mut Vec<WallEvent>,
) {
    let keys: Vec<CandidateKey> = state
        .candidates
        .keys()
        .filter(|k| k.side == side)
        .copied()
        .collect();

    for key in keys {
        if book.find_level(side, key.price) != 0 {
            continue;
        }
        let candidate = state.candidates.remove(&key).unwrap();
        if matches!(candidate.last_state, WallState::Confirmed | WallState::Consuming) {
            let age_seconds = now.saturating_duration_since(candidate.first_seen_at).as_secs_f64();
            let event = WallEvent::WallLost {
                symbol: state.symbol.clone(),
                side,
                price: key.price,
                last_quantity: candidate.quantity_current,
                age_seconds,
                previous_state: candidate.last_state,
                at: wall_clock,
            };
            maybe_emit(state, events, "wall_lost", side, key.price, now, event);
        }
        // CANDIDATE-only walls vanish silently, per the lifecycle contract.
    }
}

fn evaluate_transitions(
    state: &mut SymbolState,
    book: &BookSnapshot,
    side: Side,
    now: Instant,
    wall_clock: DateTime<Utc>,
    events: &mut Vec<WallEvent>,
) {
    let median = book.median_quantity(side, state.config.top_n_levels);
    let keys: Vec<CandidateKey> = state
        .candidates
        .keys()
        .filter(|k| k.side == side)
        .copied()
        .collect();

    for key in keys {
        let quantity_now = book.find_level(side, key.price);
        let consume_window = state.config.consume_window_seconds;

        let transition = {
            let candidate = state.candidates.get_mut(&key).unwrap();
            candidate.quantity_current = quantity_now;
            candidate.last_seen_at = now;
            candidate.quantity_history.push_back((now, quantity_now));
            while let Some((t, _)) = candidate.quantity_history.front() {
                if now.saturating_duration_since(*t) > Duration::from_secs_f64(consume_window.max(0.0)) {
                    candidate.quantity_history.pop_front();
                } else {
                    break;
                }
            }
            candidate.last_state
        };

        match transition {
            WallState::Candidate => {
                let candidate = state.candidates.get(&key).unwrap();
                let dwell = now.saturating_duration_since(candidate.state_entered_at).as_secs_f64();
                let distance_ok = book
                    .distance_ticks(side, key.price)
                    .map(|d| d <= state.config.confirm_max_distance_ticks)
                    .unwrap_or(false);
                let ratio_ok = clears_ratio(
                    quantity_now,
                    median,
                    state.config.candidate_ratio_to_median,
                    state.config.confirm_shrink_tolerance,
                );
                if dwell >= state.config.confirm_dwell_seconds && distance_ok && ratio_ok {
                    let candidate = state.candidates.get_mut(&key).unwrap();
                    candidate.last_state = WallState::Confirmed;
                    candidate.state_entered_at = now;
                    let event = WallEvent::WallConfirmed {
                        symbol: state.symbol.clone(),
                        side,
                        price: key.price,
                        quantity: quantity_now,
                        dwell_seconds: dwell,
                        at: wall_clock,
                    };
                    maybe_emit(state, events, "wall_confirmed", side, key.price, now, event);
                }
            }
            WallState::Confirmed => {
                let candidate = state.candidates.get(&key).unwrap();
                let q_ref = candidate
                    .quantity_history
                    .iter()
                    .map(|(_, q)| *q)
                    .max()
                    .unwrap_or(quantity_now);
                let drop_pct = if q_ref > 0 {
                    Decimal::from(q_ref - quantity_now) / Decimal::from(q_ref)
                } else {
                    Decimal::ZERO
                };
                if drop_pct >= state.config.consume_drop_pct {
                    let executed = state.trades.volume_at_price(key.price, consume_window, now);
                    if executed >= state.config.min_exec_confirm {
                        let candidate = state.candidates.get_mut(&key).unwrap();
                        candidate.last_state = WallState::Consuming;
                        candidate.state_entered_at = now;
                        let event = WallEvent::WallConsuming {
                            symbol: state.symbol.clone(),
                            side,
                            price: key.price,
                            quantity_before: q_ref,
                            quantity_now,
                            drop_pct,
                            executed_volume: executed,
                            at: wall_clock,
                        };
                        maybe_emit(state, events, "wall_consuming", side, key.price, now, event);
                    }
                }
            }
            WallState::Consuming => {
                // Terminal besides Lost, which the earlier pass already handles.
            }
        }
    }
}

fn evaluate_candidates(
    state: &mut SymbolState,
    book: &BookSnapshot,
    side: Side,
    now: Instant,
    wall_clock: DateTime<Utc>,
    events: &mut Vec<WallEvent>,
) {
    let median = book.median_quantity(side, state.config.top_n_levels);
    let levels = match side {
        Side::Bid => &book.bids,
        Side::Ask => &book.asks,
    };

    let mut fresh: Vec<(Decimal, i64, u32)> = Vec::new();
    for level in levels {
        let key = CandidateKey { side, price: level.price };
        if state.candidates.contains_key(&key) {
            continue;
        }
        let distance = match book.distance_ticks(side, level.price) {
            Some(d) if d <= state.config.candidate_max_distance_ticks => d,
            _ => continue,
        };
        let ratio_ok = clears_ratio(
            level.quantity,
            median,
            state.config.candidate_ratio_to_median,
            Decimal::ZERO,
        );
        if ratio_ok && level.quantity >= state.config.abs_qty_threshold {
            fresh.push((level.price, level.quantity, distance));
        }
    }

    // Tie-break: process simultaneous candidates in descending quantity order.
    fresh.sort_by(|a, b| b.1.cmp(&a.1));

    for (price, quantity, distance) in fresh {
        let key = CandidateKey { side, price };
        state.candidates.insert(
            key,
            WallCandidate {
                side,
                price,
                quantity_initial: quantity,
                quantity_current: quantity,
                first_seen_at: now,
                last_seen_at: now,
                last_state: WallState::Candidate,
                state_entered_at: now,
                distance_ticks_at_first_seen: distance,
                quantity_history: VecDeque::from([(now, quantity)]),
            },
        );
        let event = WallEvent::WallCandidate {
            symbol: state.symbol.clone(),
            side,
            price,
            quantity,
            distance_ticks: distance,
            at: wall_clock,
        };
        maybe_emit(state, events, "wall_candidate", side, price, now, event);
    }
}

/// Advances the detector with one new book snapshot. Consumes and returns
/// `state` so callers can thread it through without a borrow.
pub fn on_book_snapshot(
    mut state: SymbolState,
    book: BookSnapshot,
    now: Instant,
    wall_clock: DateTime<Utc>,
) -> (SymbolState, Vec<WallEvent>) {
    let mut events = Vec::new();

    let mut sides_to_reset = Vec::new();
    if let Some(prev) = &state.latest_book {
        for side in [Side::Bid, Side::Ask] {
            if let (Some(prev_best), Some(new_best)) = (prev.best_price(side), book.best_price(side)) {
                let threshold = std::cmp::max(5, 2 * state.config.candidate_max_distance_ticks);
                if state.config.teleport_reset {
                    if let Some(jumped_ticks) = ticks_between(book.tick_size, prev_best, new_best) {
                        if jumped_ticks > threshold {
                            sides_to_reset.push(side);
                        }
                    }
                }
            }
        }
    }
    for side in sides_to_reset {
        teleport_reset_side(&mut state, side);
    }

    for side in [Side::Bid, Side::Ask] {
        evaluate_lost(&mut state, &book, side, now, wall_clock, &mut events);
        evaluate_transitions(&mut state, &book, side, now, wall_clock, &mut events);
        evaluate_candidates(&mut state, &book, side, now, wall_clock, &mut events);
    }

    state.latest_book = Some(book);
    (state, events)
}

/// Records a trade into the symbol's trade window. Trades never directly
/// emit events; their effect surfaces on the next book snapshot via the
/// consuming-transition check.
pub fn on_trade(mut state: SymbolState, trade: Trade, now: Instant) -> (SymbolState, Vec<WallEvent>) {
    state.trades.record(&trade);
    let _ = now;
    (state, Vec::new())
}
