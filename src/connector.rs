//! Unified exchange facade.
//!
//! [`Exchange`] is the interface trading applications hold (usually as an
//! `Arc<dyn Exchange>`); [`Hyperliquid`] is its implementation for this
//! venue, wiring together the HTTP client, the signer, the nonce source,
//! the asset catalog, the order manager, and the WebSocket session.
//!
//! The signer and the asset catalog are constructed lazily on first use;
//! concurrent first callers share one initialization. Trading calls made
//! without a configured `api_secret` fail with
//! [`Error::NoCredentials`](crate::Error::NoCredentials) before anything
//! reaches the wire.

use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicBool, Ordering},
};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use async_trait::async_trait;
use futures::StreamExt;
use rust_decimal::Decimal;
use tokio::{sync::Mutex as AsyncMutex, sync::OnceCell, task::JoinHandle};

use crate::{
    Chain, NonceHandler,
    assets::AssetCatalog,
    config::ConnectorConfig,
    error::{Error, Result},
    http,
    limiter::RateLimiter,
    orders::{Order, OrderManager},
    types::{
        Balance, BatchCancel, BatchOrder, Cancel, CancelResponseStatus, Incoming, OrderBook,
        OrderEntry, OrderRequest, OrderResponseStatus, Position, Subscription, Ticker, TradingPair,
    },
    ws,
};

/// Callback invoked for every WebSocket message.
///
/// Runs on the dispatch task; it must not block indefinitely or the
/// session falls behind.
pub type MessageCallback = Arc<dyn Fn(Incoming) + Send + Sync>;

/// The unified exchange interface.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Human identifier of this connector instance.
    fn name(&self) -> &str;

    /// Verifies the API is reachable and marks the connector connected.
    async fn connect(&self) -> Result<()>;

    /// Marks the connector disconnected and tears down the WebSocket
    /// session if one is running.
    async fn disconnect(&self) -> Result<()>;

    /// Whether `connect` has succeeded and `disconnect` has not been
    /// called.
    fn is_connected(&self) -> bool;

    /// Best-price snapshot for a pair.
    async fn get_ticker(&self, pair: &TradingPair) -> Result<Ticker>;

    /// Depth-limited order book for a pair.
    async fn get_orderbook(&self, pair: &TradingPair, depth: usize) -> Result<OrderBook>;

    /// Registers, signs, and submits an order. The returned order reflects
    /// the exchange's response (resting, filled, or rejected); on a
    /// transport error the order stays tracked as pending and the error is
    /// returned for the caller to reconcile.
    async fn create_order(&self, request: OrderRequest) -> Result<Order>;

    /// Cancels an order by its client id.
    async fn cancel_order(&self, client_order_id: &str) -> Result<Order>;

    /// Cancels all open orders, optionally restricted to one pair.
    /// Returns the number of orders cancelled.
    async fn cancel_all_orders(&self, pair: Option<&TradingPair>) -> Result<usize>;

    /// Looks up a tracked order by client id.
    async fn get_order(&self, client_order_id: &str) -> Result<Order>;

    /// Returns all tracked open orders.
    async fn get_open_orders(&self) -> Result<Vec<Order>>;

    /// Returns the account's collateral balance.
    async fn get_balance(&self) -> Result<Balance>;

    /// Returns the account's open positions.
    async fn get_positions(&self) -> Result<Vec<Position>>;

    /// Sets leverage for one pair.
    async fn update_leverage(&self, pair: &TradingPair, leverage: u32, cross: bool) -> Result<()>;

    /// Starts the WebSocket session. Idempotent.
    async fn init_websocket(&self) -> Result<()>;

    /// Adds a durable subscription (survives reconnects).
    async fn subscribe(&self, subscription: Subscription) -> Result<()>;

    /// Removes a subscription.
    async fn unsubscribe(&self, subscription: Subscription) -> Result<()>;

    /// Installs the callback invoked for every inbound message. Replaces
    /// any previous callback.
    fn set_message_callback(&self, callback: MessageCallback);

    /// Stops the WebSocket session. When this returns, no further callback
    /// will be invoked and no further network write will be attempted.
    async fn disconnect_websocket(&self) -> Result<()>;
}

struct WsState {
    cmd: ws::CommandSender,
    dispatch: JoinHandle<()>,
}

/// Hyperliquid connector.
pub struct Hyperliquid {
    config: ConnectorConfig,
    chain: Chain,
    client: http::Client,
    signer: OnceCell<PrivateKeySigner>,
    nonces: NonceHandler,
    assets: AssetCatalog,
    orders: Arc<OrderManager>,
    connected: AtomicBool,
    callback: Arc<StdMutex<Option<MessageCallback>>>,
    ws: AsyncMutex<Option<WsState>>,
}

impl Hyperliquid {
    /// Creates a connector from its configuration. No network activity
    /// happens until `connect` or the first query.
    #[must_use]
    pub fn new(config: ConnectorConfig) -> Self {
        let chain = if config.testnet {
            Chain::Testnet
        } else {
            Chain::Mainnet
        };
        let limiter = Arc::new(RateLimiter::default());

        Self {
            chain,
            client: http::Client::with_limiter(chain, limiter),
            signer: OnceCell::new(),
            nonces: NonceHandler::default(),
            assets: AssetCatalog::new(),
            orders: Arc::new(OrderManager::new()),
            connected: AtomicBool::new(false),
            callback: Arc::new(StdMutex::new(None)),
            ws: AsyncMutex::new(None),
            config,
        }
    }

    /// The chain this connector targets.
    #[must_use]
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Points the HTTP side at a custom base URL (private node, test
    /// server). Chain selection — signing domain, agent source, WebSocket
    /// endpoint — is unchanged.
    #[must_use]
    pub fn with_base_url(mut self, url: url::Url) -> Self {
        self.client = self.client.with_url(url);
        self
    }

    /// Direct access to the HTTP client, for queries the facade does not
    /// wrap (candles, fills, market context).
    #[must_use]
    pub fn http(&self) -> &http::Client {
        &self.client
    }

    /// Direct access to the order store.
    #[must_use]
    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    /// Returns the signer, building it from the configured key on first
    /// call. Subsequent calls reuse the same instance; its derived address
    /// is cached inside.
    fn ensure_signer(&self) -> Result<&PrivateKeySigner> {
        if let Some(signer) = self.signer.get() {
            return Ok(signer);
        }
        let hex = self.config.secret_hex().ok_or(Error::NoCredentials)?;
        let signer: PrivateKeySigner = hex
            .parse()
            .map_err(|err| Error::InvalidPrivateKey(format!("{err}")))?;
        // A concurrent caller may have won the race; either way the cell
        // now holds exactly one signer.
        let _ = self.signer.set(signer);
        Ok(self.signer.get().expect("signer initialized"))
    }

    /// The main-account address used for account queries.
    fn account(&self) -> Result<Address> {
        self.config.api_key.ok_or(Error::NoCredentials)
    }

    async fn asset_index(&self, pair: &TradingPair) -> Result<u64> {
        self.assets.index_of(&self.client, pair.base()).await
    }
}

#[async_trait]
impl Exchange for Hyperliquid {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> Result<()> {
        // Reachability check doubling as a catalog warm-up opportunity:
        // meta is the cheapest authoritative endpoint.
        self.client.meta().await?;
        self.connected.store(true, Ordering::SeqCst);
        log::info!("{} connected to {}", self.config.name, self.chain);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        if self.config.enable_websocket {
            self.disconnect_websocket().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_ticker(&self, pair: &TradingPair) -> Result<Ticker> {
        let mids = self.client.all_mids().await?;
        let last = mids
            .get(pair.base())
            .copied()
            .ok_or_else(|| Error::AssetNotFound {
                symbol: pair.base().to_string(),
            })?;

        let book = self.client.l2_book(pair.base()).await?;
        Ok(Ticker {
            pair: pair.clone(),
            last,
            bid: book.bids().first().map(|level| level.px),
            ask: book.asks().first().map(|level| level.px),
            timestamp: book.time,
        })
    }

    async fn get_orderbook(&self, pair: &TradingPair, depth: usize) -> Result<OrderBook> {
        let book = self.client.l2_book(pair.base()).await?;
        Ok(OrderBook {
            pair: pair.clone(),
            bids: book.bids().iter().take(depth).copied().collect(),
            asks: book.asks().iter().take(depth).copied().collect(),
            timestamp: book.time,
        })
    }

    async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        let signer = self.ensure_signer()?;
        let asset = self.asset_index(&request.pair).await?;

        // Track before submit: the order exists in the store before any
        // bytes leave the process.
        let order = self.orders.register(&request);
        let client_id = order.client_order_id().to_string();

        let entry = OrderEntry {
            asset,
            is_buy: request.side.is_buy(),
            limit_px: request.price,
            sz: request.amount,
            reduce_only: request.reduce_only,
            order_type: request.order_type.into(),
        };
        let nonce = self.nonces.next();

        let statuses = match self
            .client
            .place(signer, BatchOrder::single(entry), nonce)
            .await
        {
            Ok(statuses) => statuses,
            Err(err) => {
                if err.is_transport() {
                    // The order may or may not be on the book; it stays
                    // pending for the caller to reconcile via order_status
                    // or open_orders.
                    log::warn!("order {client_id} in limbo after transport error: {err}");
                } else {
                    let _ = self
                        .orders
                        .apply_response(&client_id, &OrderResponseStatus::Error(err.to_string()));
                }
                return Err(err);
            }
        };

        let status = statuses.into_iter().next().ok_or_else(|| {
            Error::ExchangeApi("order response carried no statuses".to_string())
        })?;
        let updated = self.orders.apply_response(&client_id, &status)?;

        if let OrderResponseStatus::Error(message) = status {
            return Err(Error::OrderRejected(message));
        }
        Ok(updated)
    }

    async fn cancel_order(&self, client_order_id: &str) -> Result<Order> {
        let signer = self.ensure_signer()?;
        let order = self.orders.get(client_order_id)?;
        let oid = order.exchange_order_id.ok_or_else(|| Error::OrderNotFound {
            id: client_order_id.to_string(),
        })?;
        let asset = self.asset_index(&order.pair).await?;

        let statuses = self
            .client
            .cancel(
                signer,
                BatchCancel {
                    cancels: vec![Cancel { asset, oid }],
                },
                self.nonces.next(),
            )
            .await?;

        match statuses.into_iter().next() {
            Some(CancelResponseStatus::Success) | None => {
                self.orders.mark_cancelled(client_order_id)
            }
            Some(CancelResponseStatus::Error(message)) => Err(Error::OrderRejected(message)),
        }
    }

    async fn cancel_all_orders(&self, pair: Option<&TradingPair>) -> Result<usize> {
        let signer = self.ensure_signer()?;

        // The wire format has no "cancel everything" form; iterate the
        // store's open orders and cancel the ones that reached the book.
        let targets: Vec<Order> = self
            .orders
            .open_orders()
            .into_iter()
            .filter(|order| order.exchange_order_id.is_some())
            .filter(|order| pair.is_none_or(|p| order.pair == *p))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let mut cancels = Vec::with_capacity(targets.len());
        for order in &targets {
            cancels.push(Cancel {
                asset: self.asset_index(&order.pair).await?,
                oid: order.exchange_order_id.expect("filtered above"),
            });
        }

        let statuses = self
            .client
            .cancel(signer, BatchCancel { cancels }, self.nonces.next())
            .await?;

        let mut cancelled = 0;
        for (order, status) in targets.iter().zip(statuses) {
            match status {
                CancelResponseStatus::Success => {
                    self.orders.mark_cancelled(order.client_order_id())?;
                    cancelled += 1;
                }
                CancelResponseStatus::Error(message) => {
                    log::warn!(
                        "cancel of {} refused: {message}",
                        order.client_order_id()
                    );
                }
            }
        }
        Ok(cancelled)
    }

    async fn get_order(&self, client_order_id: &str) -> Result<Order> {
        self.orders.get(client_order_id)
    }

    async fn get_open_orders(&self) -> Result<Vec<Order>> {
        Ok(self.orders.open_orders())
    }

    async fn get_balance(&self) -> Result<Balance> {
        let state = self.client.clearinghouse_state(self.account()?).await?;
        Ok(Balance {
            asset: TradingPair::QUOTE,
            total: state.margin_summary.account_value,
            available: state.withdrawable,
            hold: state.margin_summary.total_margin_used,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        let state = self.client.clearinghouse_state(self.account()?).await?;
        Ok(state
            .asset_positions
            .into_iter()
            .filter(|entry| entry.position.szi != Decimal::ZERO)
            .map(|entry| {
                let p = entry.position;
                Position {
                    pair: TradingPair::new(p.coin),
                    size: p.szi,
                    entry_price: p.entry_px,
                    unrealized_pnl: p.unrealized_pnl,
                    liquidation_price: p.liquidation_px,
                    leverage: p.leverage.value(),
                    margin_used: p.margin_used,
                }
            })
            .collect())
    }

    async fn update_leverage(&self, pair: &TradingPair, leverage: u32, cross: bool) -> Result<()> {
        let signer = self.ensure_signer()?;
        let asset = self.asset_index(pair).await?;
        self.client
            .update_leverage(signer, asset, leverage, cross, self.nonces.next())
            .await
    }

    async fn init_websocket(&self) -> Result<()> {
        if !self.config.enable_websocket {
            return Err(Error::NotInitialized);
        }
        let mut guard = self.ws.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut conn = ws::Connection::connect(self.chain.websocket_url(), self.config.ws.clone());
        let cmd = conn.commands();
        let callback = Arc::clone(&self.callback);
        let orders = Arc::clone(&self.orders);

        // Dispatch task: reconcile account streams into the order store,
        // then hand every message to the user callback.
        let dispatch = tokio::spawn(async move {
            while let Some(msg) = conn.next().await {
                match &msg {
                    Incoming::OrderUpdates(updates) => {
                        for update in updates {
                            if orders.apply_update(update).is_none() {
                                log::debug!(
                                    "order update for unknown oid {}",
                                    update.order.oid
                                );
                            }
                        }
                    }
                    Incoming::UserFills {
                        fills,
                        is_snapshot,
                        ..
                    } if !*is_snapshot => {
                        for fill in fills {
                            if orders.apply_wire_fill(fill).is_none() {
                                log::debug!("fill for unknown oid {}", fill.oid);
                            }
                        }
                    }
                    _ => {}
                }

                let callback = callback.lock().map(|cb| cb.clone()).unwrap_or(None);
                if let Some(callback) = callback {
                    callback(msg);
                }
            }
            // Session task is gone; join it so shutdown is fully settled.
            conn.shutdown().await;
        });

        *guard = Some(WsState { cmd, dispatch });
        Ok(())
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<()> {
        let guard = self.ws.lock().await;
        let state = guard.as_ref().ok_or(Error::NotInitialized)?;
        state.cmd.subscribe(subscription)
    }

    async fn unsubscribe(&self, subscription: Subscription) -> Result<()> {
        let guard = self.ws.lock().await;
        let state = guard.as_ref().ok_or(Error::NotInitialized)?;
        state.cmd.unsubscribe(subscription)
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    async fn disconnect_websocket(&self) -> Result<()> {
        if !self.config.enable_websocket {
            return Err(Error::NotInitialized);
        }
        let state = self.ws.lock().await.take();
        if let Some(WsState { cmd, dispatch }) = state {
            cmd.close();
            // Joining the dispatch task transitively joins the session
            // task; after this, no callback runs and nothing is written.
            let _ = dispatch.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn read_only() -> Hyperliquid {
        Hyperliquid::new(ConnectorConfig::new("test"))
    }

    #[test]
    fn trading_without_credentials_is_refused() {
        let connector = read_only();
        assert!(matches!(
            connector.ensure_signer(),
            Err(Error::NoCredentials)
        ));
    }

    #[test]
    fn malformed_private_key_is_refused() {
        let connector = Hyperliquid::new(
            ConnectorConfig::new("test").with_credentials(Address::ZERO, "0xnot-hex"),
        );
        assert!(matches!(
            connector.ensure_signer(),
            Err(Error::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn signer_is_built_once_and_reused() {
        let connector = Hyperliquid::new(ConnectorConfig::new("test").with_credentials(
            Address::ZERO,
            "e908f86dbb4d55ac876378565aafeabc187f6690f046459397b17d9b9a19688e",
        ));
        let first = connector.ensure_signer().unwrap().address();
        let second = connector.ensure_signer().unwrap().address();
        assert_eq!(first, second);
        assert!(connector.signer.initialized());
    }

    #[test]
    fn account_queries_need_the_main_account_address() {
        let connector = read_only();
        assert!(matches!(connector.account(), Err(Error::NoCredentials)));
    }

    #[tokio::test]
    async fn websocket_methods_require_initialization() {
        let connector = read_only();
        assert!(matches!(
            connector.subscribe(Subscription::AllMids).await,
            Err(Error::NotInitialized)
        ));

        let disabled = Hyperliquid::new(ConnectorConfig::new("test").enable_websocket(false));
        assert!(matches!(
            disabled.init_websocket().await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            disabled.disconnect_websocket().await,
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn callback_replacement_keeps_latest() {
        let connector = read_only();
        let counter = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&counter);
        connector.set_message_callback(Arc::new(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        }));
        let second = Arc::clone(&counter);
        connector.set_message_callback(Arc::new(move |_| {
            second.fetch_add(10, Ordering::SeqCst);
        }));

        let installed = connector.callback.lock().unwrap().clone().unwrap();
        installed(Incoming::Pong);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn connector_is_object_safe() {
        fn assert_dyn(_: &dyn Exchange) {}
        let connector = read_only();
        assert_dyn(&connector);
        assert!(!connector.is_connected());
        assert_eq!(connector.name(), "test");
    }

    #[test]
    fn testnet_flag_selects_chain() {
        let connector = Hyperliquid::new(ConnectorConfig::new("t").testnet(true));
        assert_eq!(connector.chain(), Chain::Testnet);
        assert_eq!(connector.chain().agent_source(), "b");
    }
}
