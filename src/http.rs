//! HTTP client for the exchange's `/info` and `/exchange` endpoints.
//!
//! `/info` queries are plain JSON POSTs. `/exchange` requests go through
//! the signed pipeline: build the action, hash it canonically, sign the
//! phantom-agent envelope, take a rate-limit token, then transmit a body
//! carrying the identical nonce that was signed.
//!
//! Signed actions are never retried here. A transport failure leaves the
//! caller unable to know whether the order reached the book; retrying
//! would risk double submission, so the decision is pushed up to the
//! caller, which can reconcile through [`Client::order_status`] or
//! [`Client::open_orders`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    Chain,
    error::{Error, Result},
    limiter::RateLimiter,
    signing,
    types::{
        Action, ApiResponse, AssetCtx, BasicOrder, BatchCancel, BatchOrder, Candle,
        CandleSnapshotRequest, CancelResponseStatus, ClearinghouseState, Fill, InfoRequest, L2Book,
        Meta, OkResponse, OrderResponseStatus, OrderUpdate, ActionRequest,
    },
};

/// HTTP client bound to one chain's API base URL.
///
/// Cheap to clone-construct per connector; holds the shared rate limiter so
/// every outbound request is paced.
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    chain: Chain,
    limiter: Arc<RateLimiter>,
}

impl Client {
    /// Creates a client for the given chain with a default-rate limiter.
    #[must_use]
    pub fn new(chain: Chain) -> Self {
        Self::with_limiter(chain, Arc::new(RateLimiter::default()))
    }

    /// Creates a client sharing an externally owned rate limiter.
    #[must_use]
    pub fn with_limiter(chain: Chain, limiter: Arc<RateLimiter>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .tcp_nodelay(true)
            .build()
            .expect("reqwest client");

        Self {
            http,
            base_url: chain.http_url(),
            chain,
            limiter,
        }
    }

    /// Overrides the base URL, e.g. for a private node or a test server.
    #[must_use]
    pub fn with_url(self, base_url: Url) -> Self {
        Self { base_url, ..self }
    }

    /// Returns the chain this client talks to.
    #[must_use]
    pub const fn chain(&self) -> Chain {
        self.chain
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    async fn post_info<T: DeserializeOwned>(&self, request: &InfoRequest) -> Result<T> {
        self.limiter.acquire().await;
        let response = self
            .http
            .post(self.endpoint("/info"))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetches the perp universe. Asset indices are positions in the
    /// returned array.
    pub async fn meta(&self) -> Result<Meta> {
        self.post_info(&InfoRequest::Meta).await
    }

    /// Returns mid prices for all markets, keyed by symbol.
    pub async fn all_mids(&self) -> Result<HashMap<String, Decimal>> {
        self.post_info(&InfoRequest::AllMids).await
    }

    /// Returns the order book snapshot for one coin.
    pub async fn l2_book(&self, coin: &str) -> Result<L2Book> {
        self.post_info(&InfoRequest::L2Book {
            coin: coin.to_string(),
        })
        .await
    }

    /// Returns margin summaries, withdrawable amount, and positions for an
    /// account.
    pub async fn clearinghouse_state(&self, user: Address) -> Result<ClearinghouseState> {
        self.post_info(&InfoRequest::ClearinghouseState { user }).await
    }

    /// Returns the account's resting orders.
    pub async fn open_orders(&self, user: Address) -> Result<Vec<BasicOrder>> {
        self.post_info(&InfoRequest::OpenOrders { user }).await
    }

    /// Returns the universe together with per-asset market context.
    pub async fn meta_and_asset_ctxs(&self) -> Result<(Meta, Vec<AssetCtx>)> {
        self.post_info(&InfoRequest::MetaAndAssetCtxs).await
    }

    /// Looks up a single order by exchange oid. `None` when the exchange
    /// does not know the id.
    pub async fn order_status(&self, user: Address, oid: u64) -> Result<Option<OrderUpdate>> {
        #[derive(serde::Deserialize)]
        #[serde(tag = "status", rename_all = "camelCase")]
        enum Response {
            Order { order: OrderUpdate },
            UnknownOid,
        }

        let response: Response = self
            .post_info(&InfoRequest::OrderStatus {
                user,
                oid: either::Either::Left(oid),
            })
            .await?;

        Ok(match response {
            Response::Order { order } => Some(order),
            Response::UnknownOid => None,
        })
    }

    /// Returns the account's fills, most recent first.
    pub async fn user_fills(&self, user: Address) -> Result<Vec<Fill>> {
        self.post_info(&InfoRequest::UserFills { user }).await
    }

    /// Returns historical candles for the requested window.
    pub async fn candle_snapshot(&self, req: CandleSnapshotRequest) -> Result<Vec<Candle>> {
        self.post_info(&InfoRequest::CandleSnapshot { req }).await
    }

    /// Submits a batch of orders. Returns one status per order, in batch
    /// order.
    pub async fn place(
        &self,
        signer: &PrivateKeySigner,
        batch: BatchOrder,
        nonce: u64,
    ) -> Result<Vec<OrderResponseStatus>> {
        let response = self.send_signed(signer, Action::Order(batch), nonce).await?;
        match response {
            ApiResponse::Ok(OkResponse::Order { statuses }) => Ok(statuses),
            ApiResponse::Ok(other) => Err(Error::ExchangeApi(format!(
                "unexpected order response: {other:?}"
            ))),
            ApiResponse::Err(err) => Err(Error::ExchangeApi(err)),
        }
    }

    /// Cancels a batch of orders by exchange oid.
    pub async fn cancel(
        &self,
        signer: &PrivateKeySigner,
        batch: BatchCancel,
        nonce: u64,
    ) -> Result<Vec<CancelResponseStatus>> {
        let response = self.send_signed(signer, Action::Cancel(batch), nonce).await?;
        match response {
            ApiResponse::Ok(OkResponse::Cancel { statuses }) => Ok(statuses),
            // Some gateway versions answer cancels with the order envelope.
            ApiResponse::Ok(OkResponse::Order { statuses }) => Ok(statuses
                .into_iter()
                .map(|status| match status {
                    OrderResponseStatus::Error(err) => CancelResponseStatus::Error(err),
                    _ => CancelResponseStatus::Success,
                })
                .collect()),
            ApiResponse::Ok(other) => Err(Error::ExchangeApi(format!(
                "unexpected cancel response: {other:?}"
            ))),
            ApiResponse::Err(err) => Err(Error::ExchangeApi(err)),
        }
    }

    /// Sets the leverage for one asset.
    pub async fn update_leverage(
        &self,
        signer: &PrivateKeySigner,
        asset: u64,
        leverage: u32,
        cross: bool,
        nonce: u64,
    ) -> Result<()> {
        let action = Action::UpdateLeverage {
            asset,
            is_cross: cross,
            leverage,
        };
        match self.send_signed(signer, action, nonce).await? {
            ApiResponse::Ok(_) => Ok(()),
            ApiResponse::Err(err) => Err(Error::ExchangeApi(err)),
        }
    }

    /// Signs and transmits an action.
    ///
    /// The signature is produced before the rate-limit wait so a queued
    /// request goes out the moment a token frees up; the transmitted body
    /// carries the same nonce the signature committed to.
    pub(crate) async fn send_signed(
        &self,
        signer: &PrivateKeySigner,
        action: Action,
        nonce: u64,
    ) -> Result<ApiResponse> {
        let signature = signing::sign_action(signer, self.chain, &action, nonce)?;
        let request = ActionRequest {
            action,
            nonce,
            signature,
            vault_address: None,
        };

        self.limiter.acquire().await;
        let response = self
            .http
            .post(self.endpoint("/exchange"))
            .timeout(Duration::from_secs(5))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}
