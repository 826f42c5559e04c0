//! Error types for WallWatch

use thiserror::Error;

/// Top-level error for the ingestion pipeline.
#[derive(Error, Debug, Clone)]
pub enum WallWatchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("authentication rejected: {0}")]
    AuthPermanent(String),

    #[error("detector invariant violated: {0}")]
    DetectorLogic(String),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors raised while loading or validating configuration. Fatal at startup.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("malformed config file: {0}")]
    Malformed(String),

    #[error("invalid symbol syntax: {0}")]
    InvalidSymbol(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors raised while resolving symbols to instruments. Fatal at startup;
/// partial resolution is not allowed.
#[derive(Error, Debug, Clone)]
pub enum ResolverError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the transport. Recoverable via reconnect with backoff,
/// except where noted.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("stream ended")]
    StreamEnded,

    #[error("deadline exceeded waiting for a frame")]
    Deadline,

    #[error("credentials rejected: {0}")]
    AuthRefreshFailed(String),

    #[error("unrecoverable transport failure: {0}")]
    Unrecoverable(String),
}

/// Errors raised by a sink. Always swallowed by the supervisor; never
/// propagated, only counted.
#[derive(Error, Debug, Clone)]
pub enum SinkError {
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Severity used to route an error to the right tracing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn of(error: &WallWatchError) -> Self {
        match error {
            WallWatchError::Config(_) => ErrorSeverity::Critical,
            WallWatchError::Resolver(_) => ErrorSeverity::Critical,
            WallWatchError::AuthPermanent(_) => ErrorSeverity::Critical,
            WallWatchError::Transport(TransportError::Unrecoverable(_)) => ErrorSeverity::Critical,
            WallWatchError::Transport(_) => ErrorSeverity::Medium,
            WallWatchError::DetectorLogic(_) => ErrorSeverity::High,
            WallWatchError::Sink(_) => ErrorSeverity::Low,
        }
    }
}

/// Logs an error at the tracing level implied by its severity.
pub fn report(error: &WallWatchError) {
    match ErrorSeverity::of(error) {
        ErrorSeverity::Critical => tracing::error!("{}", error),
        ErrorSeverity::High => tracing::error!("{}", error),
        ErrorSeverity::Medium => tracing::warn!("{}", error),
        ErrorSeverity::Low => tracing::debug!("{}", error),
    }
}

/// Process exit codes, per the external interface contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Clean = 0,
    ConfigError = 2,
    AuthOrResolverError = 3,
    UnrecoverableTransport = 4,
}

impl WallWatchError {
    /// Maps a fatal startup/runtime error onto the process exit code it should
    /// produce. Retryable transport errors never reach this call because the
    /// supervisor handles them internally and keeps running.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            WallWatchError::Config(_) => ExitCode::ConfigError,
            WallWatchError::Resolver(_) | WallWatchError::AuthPermanent(_) => {
                ExitCode::AuthOrResolverError
            }
            WallWatchError::Transport(TransportError::Unrecoverable(_)) => {
                ExitCode::UnrecoverableTransport
            }
            _ => ExitCode::UnrecoverableTransport,
        }
    }
}
