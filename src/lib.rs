//! # hypergate
//!
//! A client-side connector for the Hyperliquid perpetual-futures exchange.
//!
//! The crate covers the full request path for trading on Hyperliquid:
//!
//! - deterministic MessagePack encoding of order and cancel actions,
//! - phantom-agent EIP-712 signing over the encoded action, with a local
//!   recovery check after every signature,
//! - a token-bucket rate limiter in front of all outbound HTTP requests,
//! - an order store that registers every order *before* transmission and
//!   reconciles its lifecycle from responses and WebSocket updates,
//! - a lazily populated symbol → asset-index catalog,
//! - a reconnecting WebSocket session that replays its subscriptions.
//!
//! Everything is tied together by the [`Exchange`](connector::Exchange)
//! trait and its [`Hyperliquid`](connector::Hyperliquid) implementation.
//!
//! ## Quick start
//!
//! ```no_run
//! use hypergate::{ConnectorConfig, Exchange, Hyperliquid, OrderRequest};
//! use hypergate::types::{OrderType, Side, TimeInForce, TradingPair};
//! use rust_decimal::dec;
//!
//! # async fn example() -> hypergate::Result<()> {
//! let config = ConnectorConfig::new("hl-main")
//!     .with_credentials("0x...".parse().unwrap(), "0x...")
//!     .testnet(false);
//! let connector = Hyperliquid::new(config);
//! connector.connect().await?;
//!
//! let order = connector
//!     .create_order(OrderRequest {
//!         pair: TradingPair::new("BTC"),
//!         side: Side::Buy,
//!         order_type: OrderType::Limit { tif: TimeInForce::Gtc },
//!         price: dec!(87000),
//!         amount: dec!(0.001),
//!         reduce_only: false,
//!     })
//!     .await?;
//! println!("{} -> {:?}", order.client_order_id(), order.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## WebSocket data
//!
//! ```no_run
//! use hypergate::{ConnectorConfig, Exchange, Hyperliquid};
//! use hypergate::types::{Incoming, Subscription};
//! use std::sync::Arc;
//!
//! # async fn example() -> hypergate::Result<()> {
//! let connector = Hyperliquid::new(ConnectorConfig::new("hl-ws"));
//! connector.set_message_callback(Arc::new(|msg| {
//!     if let Incoming::Trades(trades) = msg {
//!         for t in trades {
//!             println!("{} {} @ {}", t.coin, t.sz, t.px);
//!         }
//!     }
//! }));
//! connector.init_websocket().await?;
//! connector
//!     .subscribe(Subscription::Trades { coin: "BTC".into() })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod config;
pub mod connector;
pub mod error;
pub mod http;
pub mod limiter;
pub mod orders;
pub mod signing;
pub mod types;
pub mod wire;
pub mod ws;

use std::sync::atomic::{AtomicU64, Ordering};

/// Re-exported Ethereum address type from Alloy.
pub use alloy::primitives::Address;
/// Re-exported signer type; holds the API wallet's private key and zeroizes
/// it on drop.
pub use alloy::signers::local::PrivateKeySigner;
use chrono::Utc;
pub use config::ConnectorConfig;
pub use connector::{Exchange, Hyperliquid, MessageCallback};
pub use error::{Error, Result};
pub use http::Client as HttpClient;
pub use orders::{Order, OrderManager, OrderState};
/// Re-exported decimal type used for all prices and sizes.
pub use rust_decimal::Decimal;
pub use types::OrderRequest;
use url::Url;
pub use ws::{Connection as WebSocket, WsConfig};

/// Network the connector talks to.
///
/// Selects the endpoint base URLs and the phantom-agent `source` field
/// (`"a"` on mainnet, `"b"` on testnet).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
    derive_more::IsVariant,
)]
#[serde(rename_all = "PascalCase")]
pub enum Chain {
    #[display("Mainnet")]
    Mainnet,
    #[display("Testnet")]
    Testnet,
}

impl Chain {
    /// Returns the HTTP API base URL for this chain.
    #[must_use]
    pub fn http_url(&self) -> Url {
        if self.is_mainnet() {
            mainnet_url()
        } else {
            testnet_url()
        }
    }

    /// Returns the WebSocket URL for this chain.
    #[must_use]
    pub fn websocket_url(&self) -> Url {
        if self.is_mainnet() {
            mainnet_websocket_url()
        } else {
            testnet_websocket_url()
        }
    }

    /// Returns the phantom-agent source tag for this chain.
    #[must_use]
    pub fn agent_source(&self) -> &'static str {
        if self.is_mainnet() { "a" } else { "b" }
    }
}

/// Returns the default mainnet HTTP API URL.
///
/// URL: `https://api.hyperliquid.xyz`
#[inline(always)]
pub fn mainnet_url() -> Url {
    "https://api.hyperliquid.xyz".parse().unwrap()
}

/// Returns the default mainnet WebSocket URL.
///
/// URL: `wss://api.hyperliquid.xyz/ws`
#[inline(always)]
pub fn mainnet_websocket_url() -> Url {
    "wss://api.hyperliquid.xyz/ws".parse().unwrap()
}

/// Returns the default testnet HTTP API URL.
///
/// URL: `https://api.hyperliquid-testnet.xyz`
#[inline(always)]
pub fn testnet_url() -> Url {
    "https://api.hyperliquid-testnet.xyz".parse().unwrap()
}

/// Returns the default testnet WebSocket URL.
///
/// URL: `wss://api.hyperliquid-testnet.xyz/ws`
#[inline(always)]
pub fn testnet_websocket_url() -> Url {
    "wss://api.hyperliquid-testnet.xyz/ws".parse().unwrap()
}

/// Thread-safe nonce source for signed actions.
///
/// The exchange requires a strictly increasing nonce per sender. Nonces are
/// based on the wall clock in milliseconds; when the clock has not advanced
/// past the previously issued nonce, the next value is `previous + 1`, so
/// the sequence stays strictly monotone even under bursts or a stalled
/// clock.
///
/// The counter lives on the connector instance, never in process-global
/// state, so independent connectors (and tests) cannot interfere with each
/// other.
///
/// # Example
///
/// ```
/// use hypergate::NonceHandler;
///
/// let nonces = NonceHandler::default();
/// let a = nonces.next();
/// let b = nonces.next();
/// assert!(b > a);
/// ```
pub struct NonceHandler {
    last: AtomicU64,
}

impl Default for NonceHandler {
    fn default() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }
}

impl NonceHandler {
    /// Issues the next nonce: `max(now_ms, previous + 1)`.
    ///
    /// Safe to call concurrently; every caller observes a unique,
    /// strictly increasing value.
    pub fn next(&self) -> u64 {
        let now = Utc::now().timestamp_millis() as u64;
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = if prev >= now { prev + 1 } else { now };
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}
