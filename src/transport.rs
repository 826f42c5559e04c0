//! Interfaces the supervisor consumes but never implements against a real
//! network: the upstream transport and the instrument resolver. No TLS or
//! wire format lives in this crate — a concrete `Transport` is someone
//! else's integration.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{ResolverError, TransportError};
use crate::trade_window::TradeSide;

/// One instrument's identity and price grid, as returned at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentInfo {
    pub instrument_id: String,
    pub tick_size: Decimal,
}

/// Resolves a human-entered symbol to an instrument, once at startup.
/// Resolution is all-or-nothing: if any symbol fails, the supervisor must
/// not start with a partial subscription.
#[async_trait]
pub trait InstrumentResolver: Send + Sync {
    async fn resolve(&self, symbol: &str) -> Result<InstrumentInfo, ResolverError>;
}

/// One level of a depth snapshot, keyed by price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: i64,
}

/// A full top-N snapshot of one instrument's book. Assumed complete, never
/// an incremental delta — the simplest contract consistent with treating
/// the transport as an opaque frame source.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub instrument_id: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

/// One executed print.
#[derive(Debug, Clone)]
pub struct TradeFrame {
    pub instrument_id: String,
    pub price: Decimal,
    pub quantity: i64,
    pub side: TradeSide,
}

/// Tagged frame yielded by a `Transport`.
#[derive(Debug, Clone)]
pub enum Frame {
    Depth(DepthFrame),
    Trade(TradeFrame),
}

/// An async source of depth and trade frames for a subscribed set of
/// instruments. Implementations own the wire protocol; this crate only
/// consumes the trait.
#[async_trait]
pub trait Transport: Send {
    /// Opens (or re-opens) a subscription covering `instrument_ids`.
    async fn subscribe(&mut self, instrument_ids: &[String]) -> Result<(), TransportError>;

    /// Waits for the next frame. Returns `Err` on disconnect, protocol
    /// error, or a caller-defined deadline.
    async fn next_frame(&mut self) -> Result<Frame, TransportError>;

    async fn close(&mut self);
}

/// In-memory test doubles for `Transport`/`InstrumentResolver`. Exercised by
/// this crate's own integration tests; not a production implementation.
pub mod fakes {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Resolver that answers from a fixed table, erroring on anything else.
    pub struct StaticResolver {
        table: std::collections::HashMap<String, InstrumentInfo>,
    }

    impl StaticResolver {
        pub fn new(entries: Vec<(&str, &str, Decimal)>) -> Self {
            let table = entries
                .into_iter()
                .map(|(symbol, instrument_id, tick_size)| {
                    (
                        symbol.to_string(),
                        InstrumentInfo { instrument_id: instrument_id.to_string(), tick_size },
                    )
                })
                .collect();
            Self { table }
        }
    }

    #[async_trait]
    impl InstrumentResolver for StaticResolver {
        async fn resolve(&self, symbol: &str) -> Result<InstrumentInfo, ResolverError> {
            self.table
                .get(symbol)
                .cloned()
                .ok_or_else(|| ResolverError::UnknownSymbol(symbol.to_string()))
        }
    }

    /// A scripted transport: yields a preloaded queue of frames/errors, then
    /// reports the stream ended. Each `subscribe` call is recorded so tests
    /// can assert the supervisor re-subscribed as expected.
    pub struct ScriptedTransport {
        scripted: Mutex<VecDeque<Result<Frame, TransportError>>>,
        pub subscribe_calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<Frame, TransportError>>) -> Self {
            Self {
                scripted: Mutex::new(script.into()),
                subscribe_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn subscribe(&mut self, instrument_ids: &[String]) -> Result<(), TransportError> {
            self.subscribe_calls.lock().await.push(instrument_ids.to_vec());
            Ok(())
        }

        async fn next_frame(&mut self) -> Result<Frame, TransportError> {
            match self.scripted.lock().await.pop_front() {
                Some(result) => result,
                None => Err(TransportError::StreamEnded),
            }
        }

        async fn close(&mut self) {}
    }
}
