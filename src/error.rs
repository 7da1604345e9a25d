//! Error types surfaced by the connector.
//!
//! Every failure is a typed value; there is no catch-all error channel.
//! I/O and parsing errors propagate to the caller unchanged, wrapped in the
//! matching variant. Log output is advisory only and never a substitute for
//! a returned error.

/// A `Result` alias where the `Err` case is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// All failure kinds the connector can return.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A signing-required call was made without a configured private key.
    #[error("no signing credentials configured")]
    NoCredentials,

    /// The configured private key is not 32 bytes of hex.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The symbol is not present in the exchange universe.
    #[error("asset not found: {symbol}")]
    AssetNotFound { symbol: String },

    /// Lookup by client or exchange order id missed.
    #[error("order not found: {id}")]
    OrderNotFound { id: String },

    /// Per-order rejection inside an otherwise `"ok"` envelope.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// Top-level `"err"` envelope from the exchange endpoint.
    #[error("exchange API error: {0}")]
    ExchangeApi(String),

    /// HTTP transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// No token available; only raised by the non-blocking acquire path.
    #[error("rate limited")]
    RateLimited,

    /// Canonical encoder fault.
    #[error("action encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// JSON serialization or parsing fault.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server-side rejection of a subscription request.
    #[error("subscription limit exceeded: {0}")]
    SubscriptionLimitExceeded(String),

    /// A WebSocket method was called before `init_websocket`, or the
    /// connector was configured with `enable_websocket: false`.
    #[error("websocket not initialized")]
    NotInitialized,

    /// Signature generation failed.
    #[error("signer error: {0}")]
    Signer(#[from] alloy::signers::Error),
}

impl Error {
    /// Returns true for failures where the order may still have reached the
    /// exchange and the caller should reconcile via an order-status query.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::WebSocket(_))
    }
}
