//! Type definitions for trading operations, info queries, and the
//! WebSocket protocol.
//!
//! # Trading types
//! - [`Side`], [`TimeInForce`], [`OrderType`]: order parameters
//! - [`OrderRequest`]: what callers hand to the connector
//! - [`Action`], [`BatchOrder`], [`BatchCancel`]: the signed wire actions
//! - [`OrderResponseStatus`]: the per-order result of a submission
//!
//! # WebSocket types
//! - [`Subscription`]: channels that can be subscribed
//! - [`Outgoing`] / [`Incoming`]: client → server and server → client frames
//!
//! # Wire discipline
//!
//! The byte layout of the action types is load-bearing. Struct fields are
//! declared in the exact order the canonical encoding requires, prices and
//! sizes serialize through [`crate::wire::serde_wire`] so the signed bytes
//! never carry a trailing zero, and the `Action` enum is internally tagged
//! so `"type"` is always the first key of the outer map.

use std::{collections::HashMap, fmt, str::FromStr};

use alloy::primitives::{Address, B128, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::wire::serde_wire;

/// Side of an order or trade.
///
/// Serializes to the exchange's single-letter convention: `"B"` for buys,
/// `"A"` for sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum Side {
    #[serde(rename = "B")]
    #[display("buy")]
    Buy,
    #[serde(rename = "A")]
    #[display("sell")]
    Sell,
}

impl Side {
    /// Returns true for the buy side.
    #[must_use]
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

/// Perpetual trading pair.
///
/// The quote side is always USDC on this venue, so only the base symbol is
/// stored. Plain value type; compares and hashes by base symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradingPair {
    base: String,
}

impl TradingPair {
    /// Quote currency for every pair on the venue.
    pub const QUOTE: &'static str = "USDC";

    /// Creates a pair from its base symbol (e.g. `"BTC"`).
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Returns the base symbol.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the quote symbol (always `"USDC"`).
    #[must_use]
    pub fn quote(&self) -> &'static str {
        Self::QUOTE
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, Self::QUOTE)
    }
}

impl FromStr for TradingPair {
    type Err = crate::Error;

    /// Parses `"BTC"` or `"BTC/USDC"`. Any quote other than USDC is
    /// rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            None => Ok(Self::new(s)),
            Some((base, quote)) if quote == Self::QUOTE => Ok(Self::new(base)),
            Some(_) => Err(crate::Error::AssetNotFound {
                symbol: s.to_string(),
            }),
        }
    }
}

/// Time-in-force for limit orders.
///
/// - `Gtc`: good till cancel, rests on the book until filled or cancelled.
/// - `Ioc`: immediate or cancel, never rests.
/// - `Alo`: add liquidity only (post-only); rejected if it would cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Alo,
}

/// Order type as callers express it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    /// Limit order with an explicit time-in-force.
    Limit { tif: TimeInForce },
    /// Market order; fills immediately against the book or is rejected.
    Market,
}

/// Parameters for a new order, as accepted by
/// [`Exchange::create_order`](crate::Exchange::create_order).
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub pair: TradingPair,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price. Ignored by the matching engine for market orders but
    /// still transmitted, so it must be a valid decimal.
    pub price: Decimal,
    pub amount: Decimal,
    pub reduce_only: bool,
}

// ========================================================
// SIGNED ACTIONS
// ========================================================

/// A single order entry inside a batch, in wire layout.
///
/// Field order is part of the signature: `a`, `b`, `p`, `s`, `r`, `t`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderEntry {
    /// Asset index (position in the exchange universe).
    #[serde(rename = "a")]
    pub asset: u64,
    /// Buy side flag.
    #[serde(rename = "b")]
    pub is_buy: bool,
    /// Limit price, canonical wire string.
    #[serde(rename = "p", with = "serde_wire")]
    pub limit_px: Decimal,
    /// Size, canonical wire string.
    #[serde(rename = "s", with = "serde_wire")]
    pub sz: Decimal,
    /// Reduce-only flag.
    #[serde(rename = "r")]
    pub reduce_only: bool,
    /// Order type map.
    #[serde(rename = "t")]
    pub order_type: OrderTypePlacement,
}

/// Order type in wire layout: a single-key map, either
/// `{"limit": {"tif": ...}}` or `{"market": {}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderTypePlacement {
    Limit { tif: TimeInForce },
    Market {},
}

impl From<OrderType> for OrderTypePlacement {
    fn from(value: OrderType) -> Self {
        match value {
            OrderType::Limit { tif } => OrderTypePlacement::Limit { tif },
            OrderType::Market => OrderTypePlacement::Market {},
        }
    }
}

/// Grouping strategy for a batch of orders.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderGrouping {
    Na,
}

/// Batch order action body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOrder {
    pub orders: Vec<OrderEntry>,
    pub grouping: OrderGrouping,
}

impl BatchOrder {
    /// Wraps a single entry in the default (ungrouped) batch.
    #[must_use]
    pub fn single(entry: OrderEntry) -> Self {
        Self {
            orders: vec![entry],
            grouping: OrderGrouping::Na,
        }
    }
}

/// A single cancel entry: asset index and exchange order id, in that order.
#[derive(Debug, Clone, Serialize)]
pub struct Cancel {
    #[serde(rename = "a")]
    pub asset: u64,
    #[serde(rename = "o")]
    pub oid: u64,
}

/// Batch cancel action body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCancel {
    pub cancels: Vec<Cancel>,
}

/// An action that requires signing before it is accepted by the exchange.
///
/// Internally tagged so `"type"` is emitted as the first key, in both the
/// MessagePack signing input and the JSON request body.
#[derive(Debug, Clone, Serialize, derive_more::From)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Order insertion.
    Order(BatchOrder),
    /// Order cancellation by exchange oid.
    Cancel(BatchCancel),
    /// Leverage change for one asset.
    #[serde(rename_all = "camelCase")]
    UpdateLeverage {
        asset: u64,
        is_cross: bool,
        leverage: u32,
    },
}

/// EIP-712 signature split into its components.
///
/// `r` and `s` serialize as 0x-prefixed, zero-padded 32-byte lowercase hex
/// strings; `v` is 27 or 28. The server re-derives the signer address from
/// exactly these values, so the padding is not cosmetic.
#[derive(Clone, Copy)]
pub struct Signature {
    pub r: U256,
    pub s: U256,
    pub v: u64,
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Signature", 3)?;
        state.serialize_field("r", &format!("0x{:064x}", self.r))?;
        state.serialize_field("s", &format!("0x{:064x}", self.s))?;
        state.serialize_field("v", &self.v)?;
        state.end()
    }
}

impl fmt::Display for Signature {
    /// Formats as the standard 65-byte Ethereum signature: `0x{r}{s}{v}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:064x}{:064x}{:02x}", self.r, self.s, self.v)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("r", &format!("0x{:x}", self.r))
            .field("s", &format!("0x{:x}", self.s))
            .field("v", &self.v)
            .finish()
    }
}

impl From<alloy::signers::Signature> for Signature {
    fn from(signature: alloy::signers::Signature) -> Self {
        Self {
            r: signature.r(),
            s: signature.s(),
            v: signature.recid().to_byte() as u64 + 27,
        }
    }
}

/// The transmitted `/exchange` request body.
///
/// Carries the same nonce that was signed; `vault_address` serializes as
/// JSON `null` (vault trading is not supported by this connector).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: Action,
    pub nonce: u64,
    pub signature: Signature,
    pub vault_address: Option<Address>,
}

// ========================================================
// EXCHANGE RESPONSES
// ========================================================

/// `/exchange` response envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", content = "response")]
#[serde(rename_all = "camelCase")]
pub(crate) enum ApiResponse {
    Ok(OkResponse),
    Err(String),
}

/// Successful `/exchange` response payload.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "camelCase")]
pub(crate) enum OkResponse {
    Order { statuses: Vec<OrderResponseStatus> },
    Cancel { statuses: Vec<CancelResponseStatus> },
    Default,
}

/// Per-order result inside an `"ok"` order response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderResponseStatus {
    /// Order accepted (generic).
    Success,
    /// Order resting on the book.
    Resting { oid: u64 },
    /// Order immediately filled.
    Filled {
        #[serde(rename = "totalSz")]
        total_sz: Decimal,
        #[serde(rename = "avgPx")]
        avg_px: Decimal,
        oid: u64,
    },
    /// Per-order rejection.
    Error(String),
}

/// Per-cancel result inside an `"ok"` cancel response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelResponseStatus {
    Success,
    Error(String),
}

// ========================================================
// INFO ENDPOINT
// ========================================================

/// `/info` request bodies, tagged by query type.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "camelCase")]
pub(crate) enum InfoRequest {
    Meta,
    AllMids,
    L2Book {
        coin: String,
    },
    ClearinghouseState {
        user: Address,
    },
    OpenOrders {
        user: Address,
    },
    MetaAndAssetCtxs,
    OrderStatus {
        user: Address,
        #[serde(with = "either::serde_untagged")]
        oid: either::Either<u64, String>,
    },
    UserFills {
        user: Address,
    },
    CandleSnapshot {
        req: CandleSnapshotRequest,
    },
}

/// `meta` response: the ordered perp universe.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetInfo>,
}

/// One asset in the universe. Its position in the array is the asset index
/// the wire protocol uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInfo {
    pub name: String,
    pub sz_decimals: u32,
    pub max_leverage: u32,
    #[serde(default)]
    pub only_isolated: bool,
}

/// Order book snapshot for one coin: `levels[0]` bids, `levels[1]` asks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2Book {
    pub coin: String,
    pub time: u64,
    pub levels: [Vec<BookLevel>; 2],
}

impl L2Book {
    /// Bid levels, best first.
    #[must_use]
    pub fn bids(&self) -> &[BookLevel] {
        &self.levels[0]
    }

    /// Ask levels, best first.
    #[must_use]
    pub fn asks(&self) -> &[BookLevel] {
        &self.levels[1]
    }

    /// Mid price, if both sides have liquidity.
    #[must_use]
    pub fn mid(&self) -> Option<Decimal> {
        let bid = self.bids().first()?;
        let ask = self.asks().first()?;
        Some((bid.px + ask.px) / Decimal::TWO)
    }
}

/// A single price level on the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLevel {
    pub px: Decimal,
    pub sz: Decimal,
    /// Number of orders at this level.
    pub n: usize,
}

/// A trade reported on the `trades` channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub coin: String,
    /// Taker's side.
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    pub time: u64,
    pub tid: u64,
    #[serde(default)]
    pub hash: Option<String>,
}

/// An order as the exchange reports it (open orders, order status, order
/// update frames).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicOrder {
    pub coin: String,
    pub side: Side,
    pub limit_px: Decimal,
    /// Remaining size.
    pub sz: Decimal,
    pub oid: u64,
    pub timestamp: u64,
    pub orig_sz: Decimal,
    #[serde(default)]
    pub cloid: Option<B128>,
}

impl BasicOrder {
    /// Filled size so far (`orig_sz - sz`).
    #[must_use]
    pub fn filled(&self) -> Decimal {
        self.orig_sz - self.sz
    }
}

/// Order lifecycle status as reported on the wire.
///
/// The exchange distinguishes many cancellation and rejection causes; the
/// helpers below collapse them into the three outcomes the order store
/// cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum WireOrderStatus {
    Open,
    Filled,
    Canceled,
    Triggered,
    Rejected,
    MarginCanceled,
    SelfTradeCanceled,
    ReduceOnlyCanceled,
    SiblingFilledCanceled,
    DelistedCanceled,
    LiquidatedCanceled,
    ScheduledCancel,
    VaultWithdrawalCanceled,
    OpenInterestCapCanceled,
    TickRejected,
    MinTradeNtlRejected,
    PerpMarginRejected,
    ReduceOnlyRejected,
    BadAloPxRejected,
    IocCancelRejected,
    MarketOrderNoLiquidityRejected,
    OracleRejected,
}

impl WireOrderStatus {
    /// True for any cancellation cause.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            WireOrderStatus::Canceled
                | WireOrderStatus::MarginCanceled
                | WireOrderStatus::SelfTradeCanceled
                | WireOrderStatus::ReduceOnlyCanceled
                | WireOrderStatus::SiblingFilledCanceled
                | WireOrderStatus::DelistedCanceled
                | WireOrderStatus::LiquidatedCanceled
                | WireOrderStatus::ScheduledCancel
                | WireOrderStatus::VaultWithdrawalCanceled
                | WireOrderStatus::OpenInterestCapCanceled
                | WireOrderStatus::IocCancelRejected
        )
    }

    /// True for any rejection cause.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            WireOrderStatus::Rejected
                | WireOrderStatus::TickRejected
                | WireOrderStatus::MinTradeNtlRejected
                | WireOrderStatus::PerpMarginRejected
                | WireOrderStatus::ReduceOnlyRejected
                | WireOrderStatus::BadAloPxRejected
                | WireOrderStatus::MarketOrderNoLiquidityRejected
                | WireOrderStatus::OracleRejected
        )
    }
}

/// An order status change on the `orderUpdates` channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order: BasicOrder,
    pub status: WireOrderStatus,
    pub status_timestamp: u64,
}

/// A fill on the `userFills` channel or from the `userFills` info query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub coin: String,
    pub px: Decimal,
    pub sz: Decimal,
    pub side: Side,
    pub time: u64,
    pub oid: u64,
    pub tid: u64,
    #[serde(default)]
    pub fee: Option<Decimal>,
    #[serde(default)]
    pub closed_pnl: Option<Decimal>,
    #[serde(default)]
    pub crossed: bool,
}

/// `clearinghouseState` response.
///
/// The withdrawable amount is read from the top level; the copy nested in
/// `marginSummary` is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    pub margin_summary: MarginSummary,
    pub cross_margin_summary: MarginSummary,
    pub withdrawable: Decimal,
    pub asset_positions: Vec<AssetPosition>,
    pub time: u64,
}

/// Aggregate margin numbers for an account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    pub account_value: Decimal,
    pub total_ntl_pos: Decimal,
    pub total_raw_usd: Decimal,
    pub total_margin_used: Decimal,
}

/// One position entry in the clearinghouse state.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPosition {
    pub position: PositionData,
}

/// Detailed position data for a single asset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    pub coin: String,
    /// Signed size: positive long, negative short.
    pub szi: Decimal,
    pub leverage: Leverage,
    pub entry_px: Option<Decimal>,
    pub position_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub liquidation_px: Option<Decimal>,
    pub margin_used: Decimal,
}

/// Leverage configuration of a position.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Leverage {
    Cross {
        value: u32,
    },
    #[serde(rename_all = "camelCase")]
    Isolated {
        value: u32,
        raw_usd: Decimal,
    },
}

impl Leverage {
    /// The leverage multiple, regardless of margin mode.
    #[must_use]
    pub fn value(&self) -> u32 {
        match self {
            Leverage::Cross { value } | Leverage::Isolated { value, .. } => *value,
        }
    }
}

/// Per-asset market context from `metaAndAssetCtxs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    pub funding: Decimal,
    pub mark_px: Decimal,
    #[serde(default)]
    pub mid_px: Option<Decimal>,
    pub oracle_px: Decimal,
    pub open_interest: Decimal,
    pub day_ntl_vlm: Decimal,
}

/// Candle interval for `candleSnapshot` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum CandleInterval {
    #[serde(rename = "1m")]
    #[display("1m")]
    OneMinute,
    #[serde(rename = "5m")]
    #[display("5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    #[display("15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    #[display("30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    #[display("1h")]
    OneHour,
    #[serde(rename = "4h")]
    #[display("4h")]
    FourHours,
    #[serde(rename = "12h")]
    #[display("12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    #[display("1d")]
    OneDay,
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "12h" => Ok(Self::TwelveHours),
            "1d" => Ok(Self::OneDay),
            other => Err(format!("invalid candle interval: {other}")),
        }
    }
}

/// Parameters for a `candleSnapshot` query. Times are milliseconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleSnapshotRequest {
    pub coin: String,
    pub interval: CandleInterval,
    pub start_time: u64,
    pub end_time: u64,
}

/// One OHLCV bar.
#[derive(Debug, Clone, Deserialize)]
pub struct Candle {
    #[serde(rename = "t")]
    pub open_time: u64,
    #[serde(rename = "T")]
    pub close_time: u64,
    #[serde(rename = "s")]
    pub coin: String,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    #[serde(rename = "n")]
    pub num_trades: u64,
}

// ========================================================
// WEBSOCKET PROTOCOL
// ========================================================

/// A WebSocket subscription.
///
/// Serializes as `{"type": "<channel>" [, "coin": ...] [, "user": ...]}`
/// with fields in exactly that order. Subscriptions are value types; the
/// registry deduplicates on equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Subscription {
    /// Mid prices for all markets.
    #[display("allMids")]
    AllMids,
    /// Order book updates for one coin.
    #[display("l2Book({coin})")]
    L2Book { coin: String },
    /// Real-time trades for one coin.
    #[display("trades({coin})")]
    Trades { coin: String },
    /// Account event stream.
    #[display("user({user})")]
    User { user: Address },
    /// Order status changes for an account.
    #[display("orderUpdates({user})")]
    OrderUpdates { user: Address },
    /// Fills for an account.
    #[display("userFills({user})")]
    UserFills { user: Address },
    /// Funding payments for an account.
    #[display("userFundings({user})")]
    UserFundings { user: Address },
    /// Non-funding ledger changes for an account.
    #[display("userNonFundingLedgerUpdates({user})")]
    UserNonFundingLedgerUpdates { user: Address },
}

/// Client → server frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
#[serde(rename_all = "camelCase")]
pub enum Outgoing {
    Subscribe { subscription: Subscription },
    Unsubscribe { subscription: Subscription },
    Ping,
}

/// Server → client messages, dispatched on the top-level `channel` field.
///
/// Frames on channels the parser does not recognize, and frames whose
/// payload fails to decode, are delivered as [`Incoming::Unknown`] rather
/// than dropped, so the callback always sees everything the server sent.
#[derive(Debug, Clone)]
pub enum Incoming {
    /// Mid prices for all markets.
    AllMids { mids: HashMap<String, Decimal> },
    /// Order book snapshot or delta.
    L2Book(L2Book),
    /// Trades for a subscribed coin.
    Trades(Vec<Trade>),
    /// Account event payload (`user` channel), delivered untyped.
    User(serde_json::Value),
    /// Order status changes.
    OrderUpdates(Vec<OrderUpdate>),
    /// Fills for the subscribed account.
    UserFills {
        user: Address,
        fills: Vec<Fill>,
        is_snapshot: bool,
    },
    /// Server acknowledgement of a subscribe/unsubscribe.
    SubscriptionResponse(Outgoing),
    /// Server-reported error.
    Error(String),
    /// Reply to a client ping.
    Pong,
    /// Anything the parser could not interpret.
    Unknown { channel: String, raw: String },
}

#[derive(Deserialize)]
struct AllMidsData {
    mids: HashMap<String, Decimal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserFillsData {
    user: Address,
    fills: Vec<Fill>,
    #[serde(default)]
    is_snapshot: bool,
}

impl Incoming {
    /// Parses a raw frame into a typed message.
    ///
    /// Never fails: undecodable input comes back as [`Incoming::Unknown`]
    /// with the raw text preserved, after a warning log.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Self {
        let raw = || String::from_utf8_lossy(payload).into_owned();

        let value: serde_json::Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("undecodable websocket frame: {err}");
                return Incoming::Unknown {
                    channel: String::new(),
                    raw: raw(),
                };
            }
        };

        let channel = value
            .get("channel")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_owned();
        let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);

        let parsed = match channel.as_str() {
            "allMids" => serde_json::from_value::<AllMidsData>(data)
                .map(|d| Incoming::AllMids { mids: d.mids }),
            "l2Book" => serde_json::from_value(data).map(Incoming::L2Book),
            "trades" => serde_json::from_value(data).map(Incoming::Trades),
            "user" => Ok(Incoming::User(data)),
            "orderUpdates" => serde_json::from_value(data).map(Incoming::OrderUpdates),
            "userFills" => serde_json::from_value::<UserFillsData>(data).map(|d| {
                Incoming::UserFills {
                    user: d.user,
                    fills: d.fills,
                    is_snapshot: d.is_snapshot,
                }
            }),
            "subscriptionResponse" => {
                serde_json::from_value(data).map(Incoming::SubscriptionResponse)
            }
            "error" => Ok(Incoming::Error(
                data.as_str().map(str::to_owned).unwrap_or_else(|| raw()),
            )),
            "pong" => Ok(Incoming::Pong),
            _ => {
                return Incoming::Unknown {
                    channel,
                    raw: raw(),
                };
            }
        };

        match parsed {
            Ok(msg) => msg,
            Err(err) => {
                log::warn!("unable to parse {channel} frame: {err}");
                Incoming::Unknown {
                    channel,
                    raw: raw(),
                }
            }
        }
    }
}

// ========================================================
// FACADE-LEVEL MARKET AND ACCOUNT TYPES
// ========================================================

/// Best-price snapshot for one pair.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub pair: TradingPair,
    pub last: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    /// Timestamp in milliseconds.
    pub timestamp: u64,
}

/// Depth-limited order book for one pair.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub pair: TradingPair,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    /// Timestamp in milliseconds.
    pub timestamp: u64,
}

/// Collateral balance of the account.
#[derive(Debug, Clone)]
pub struct Balance {
    /// Always USDC on this venue.
    pub asset: &'static str,
    /// Total account value (equity).
    pub total: Decimal,
    /// Amount available for withdrawal.
    pub available: Decimal,
    /// Margin currently in use.
    pub hold: Decimal,
}

/// An open position.
#[derive(Debug, Clone)]
pub struct Position {
    pub pair: TradingPair,
    /// Signed size: positive long, negative short.
    pub size: Decimal,
    pub entry_price: Option<Decimal>,
    pub unrealized_pnl: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub leverage: u32,
    pub margin_used: Decimal,
}
