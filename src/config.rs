//! Connector configuration.

use alloy::primitives::Address;
use secrecy::{ExposeSecret, Secret};

use crate::ws::WsConfig;

/// Options the connector recognizes.
///
/// - `api_key` is the **main account** address; it is the `user` field on
///   every account query.
/// - `api_secret` is the **API wallet's** 0x-prefixed 32-byte private key;
///   it signs actions on the main account's behalf and is held as a
///   [`Secret`] so it is zeroed on drop and never appears in debug output.
///   Leaving it unset puts the connector in read-only mode: market data
///   works, trading calls return `NoCredentials`.
#[derive(Clone)]
pub struct ConnectorConfig {
    /// Human identifier for logs; no semantic effect.
    pub name: String,
    /// Main account address for account queries.
    pub api_key: Option<Address>,
    /// API wallet private key (hex). Absent = read-only mode.
    pub api_secret: Option<Secret<String>>,
    /// Use testnet endpoints and the testnet agent source.
    pub testnet: bool,
    /// When false, every WebSocket method returns `NotInitialized`.
    pub enable_websocket: bool,
    /// WebSocket session tunables.
    pub ws: WsConfig,
}

impl ConnectorConfig {
    /// Creates a mainnet, read-only, WebSocket-enabled configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: None,
            api_secret: None,
            testnet: false,
            enable_websocket: true,
            ws: WsConfig::default(),
        }
    }

    /// Sets the main account address and the API wallet key.
    #[must_use]
    pub fn with_credentials(mut self, api_key: Address, api_secret: impl Into<String>) -> Self {
        self.api_key = Some(api_key);
        self.api_secret = Some(Secret::new(api_secret.into()));
        self
    }

    /// Selects testnet endpoints.
    #[must_use]
    pub fn testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// Enables or disables the WebSocket surface.
    #[must_use]
    pub fn enable_websocket(mut self, enable: bool) -> Self {
        self.enable_websocket = enable;
        self
    }

    /// Overrides the WebSocket tunables.
    #[must_use]
    pub fn with_ws_config(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }

    /// Exposes the configured private key hex, if any. Called exactly once,
    /// when the signer is first built.
    pub(crate) fn secret_hex(&self) -> Option<&str> {
        self.api_secret
            .as_ref()
            .map(|secret| secret.expose_secret().as_str())
    }
}

impl std::fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("name", &self.name)
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[redacted]"))
            .field("testnet", &self.testnet)
            .field("enable_websocket", &self.enable_websocket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_read_only_mainnet() {
        let config = ConnectorConfig::new("test");
        assert!(config.api_secret.is_none());
        assert!(!config.testnet);
        assert!(config.enable_websocket);
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = ConnectorConfig::new("test")
            .with_credentials(Address::ZERO, "deadbeef".repeat(8));
        let debug = format!("{config:?}");
        assert!(!debug.contains("deadbeef"));
        assert!(debug.contains("redacted"));
    }
}
