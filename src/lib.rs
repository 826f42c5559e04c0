//! # WallWatch
//!
//! Streaming order book wall detector: watches depth-of-book and trade flow
//! for a configured set of symbols and raises lifecycle alerts when a large
//! resting limit order appears, is confirmed, gets consumed by trading, or
//! disappears.
//!
//! ## Architecture
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`book`] | Immutable book snapshot and its quick statistics |
//! | [`trade_window`] | Rolling time-bounded executed-volume aggregator |
//! | [`detector`] | Per-symbol wall lifecycle state machine |
//! | [`events`] | Tagged event variants emitted by the detector |
//! | [`supervisor`] | Subscription lifecycle, reconnects, frame dispatch |
//! | [`sink`] | Event delivery interface and bounded per-sink queue |
//! | [`transport`] | Traits the supervisor consumes; no network client here |
//! | [`config`] | Detector and supervisor configuration, YAML-loaded |
//! | [`error`] | Typed error hierarchy and severity classification |
//!
//! ## MSRV
//!
//! Minimum Supported Rust Version: **1.70**

pub mod book;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod sink;
pub mod supervisor;
pub mod trade_window;
pub mod transport;

pub use book::{BookSnapshot, PriceLevel, Side};
pub use config::{DetectorConfig, SupervisorConfig};
pub use detector::{on_book_snapshot, on_trade, SymbolState, WallState};
pub use error::{ErrorSeverity, ExitCode, WallWatchError};
pub use events::WallEvent;
pub use sink::{ConsoleSink, Sink, SinkDispatcher};
pub use supervisor::{Supervisor, SubscriptionChange};
pub use trade_window::{Trade, TradeSide, TradeWindow};
pub use transport::{
    DepthFrame, DepthLevel, Frame, InstrumentInfo, InstrumentResolver, Transport, TradeFrame,
};

/// Initializes structured logging from `RUST_LOG`, defaulting to `info` when
/// unset.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
