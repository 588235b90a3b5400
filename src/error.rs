//! Domain error taxonomy for the signal-reputation pipeline.
//!
//! Mirrors the error table in the specification: each kind carries enough
//! context for its caller to decide whether to skip, retry, or abort, instead
//! of relying on exceptions/string matching.

use thiserror::Error;

use crate::types::ChainId;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by an individual [`crate::pricing::provider::PriceProvider`].
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("provider rate limited")]
    RateLimited,

    #[error("provider timed out")]
    Timeout,

    #[error("provider circuit open")]
    CircuitOpen,

    #[error("provider does not support this capability")]
    CapabilityMismatch,

    #[error("provider returned malformed data: {0}")]
    Malformed(String),

    #[error("provider transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the Pricing Fabric after trying every candidate provider.
#[derive(Debug, Error, Clone)]
pub enum PricingError {
    #[error("all price sources unavailable for {coin_key} on {chain:?}")]
    AllSourcesUnavailable { coin_key: String, chain: ChainId },

    #[error("rate limited after waiting the full provider timeout")]
    RateLimited,
}

/// Top-level error enum for the engine. Composed into `anyhow::Result` at the
/// orchestration layer (main, bootstrap driver), matched explicitly at
/// decision points inside the fabric/outcome engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("persistence corruption in store {store}: {detail}")]
    PersistenceCorruption { store: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("message source disconnected: {0}")]
    MessageSourceDisconnect(String),

    #[error("duplicate terminal event for signal {0}")]
    DuplicateTerminalEvent(String),
}
