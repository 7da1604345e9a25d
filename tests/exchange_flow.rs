//! End-to-end connector flows against a mocked exchange server.
//!
//! These tests drive the public `Exchange` surface through the real signed
//! pipeline (encoding, hashing, signing, rate limiting) and only mock the
//! HTTP boundary.

use hypergate::{
    ConnectorConfig, Error, Exchange, Hyperliquid, OrderRequest, OrderState,
    types::{OrderType, Side, TimeInForce, TradingPair},
};
use mockito::{Matcher, Server, ServerGuard};
use rust_decimal::dec;
use serde_json::json;

const API_WALLET_KEY: &str = "e908f86dbb4d55ac876378565aafeabc187f6690f046459397b17d9b9a19688e";
const MAIN_ACCOUNT: &str = "0x0d1d9635d0640821d15e323ac8adadfa9c111414";

fn connector(server: &ServerGuard) -> Hyperliquid {
    let config = ConnectorConfig::new("mock")
        .with_credentials(MAIN_ACCOUNT.parse().unwrap(), API_WALLET_KEY)
        .enable_websocket(false);
    Hyperliquid::new(config).with_base_url(server.url().parse().unwrap())
}

fn meta_body() -> String {
    json!({
        "universe": [
            {"name": "SOL", "szDecimals": 2, "maxLeverage": 20},
            {"name": "BTC", "szDecimals": 5, "maxLeverage": 50},
            {"name": "ETH", "szDecimals": 4, "maxLeverage": 50}
        ]
    })
    .to_string()
}

fn btc_limit_order() -> OrderRequest {
    OrderRequest {
        pair: TradingPair::new("BTC"),
        side: Side::Buy,
        order_type: OrderType::Limit {
            tif: TimeInForce::Gtc,
        },
        price: dec!(87000),
        amount: dec!(0.001),
        reduce_only: false,
    }
}

async fn mock_meta(server: &mut ServerGuard, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/info")
        .match_body(Matcher::PartialJson(json!({"type": "meta"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(meta_body())
        .expect(hits)
        .create_async()
        .await
}

#[tokio::test]
async fn place_resting_then_cancel() {
    let mut server = Server::new_async().await;
    let meta = mock_meta(&mut server, 1).await;

    let order_mock = server
        .mock("POST", "/exchange")
        .match_body(Matcher::PartialJson(json!({"action": {"type": "order"}})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "ok",
                "response": {
                    "type": "order",
                    "data": {"statuses": [{"resting": {"oid": 45564725639u64}}]}
                }
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let cancel_mock = server
        .mock("POST", "/exchange")
        .match_body(Matcher::PartialJson(json!({"action": {"type": "cancel"}})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "ok",
                "response": {"type": "cancel", "data": {"statuses": ["success"]}}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let connector = connector(&server);
    let order = connector.create_order(btc_limit_order()).await.unwrap();
    assert_eq!(order.status, OrderState::Resting);
    assert_eq!(order.exchange_order_id, Some(45564725639));

    let open = connector.get_open_orders().await.unwrap();
    assert_eq!(open.len(), 1);

    let cancelled = connector
        .cancel_order(order.client_order_id())
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderState::Cancelled);
    assert!(connector.get_open_orders().await.unwrap().is_empty());

    meta.assert_async().await;
    order_mock.assert_async().await;
    cancel_mock.assert_async().await;
}

#[tokio::test]
async fn asset_catalog_is_fetched_once() {
    let mut server = Server::new_async().await;
    // Two orders, one meta fetch: the catalog is populated lazily and then
    // cached for the connector's lifetime.
    let meta = mock_meta(&mut server, 1).await;

    let exchange = server
        .mock("POST", "/exchange")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "ok",
                "response": {
                    "type": "order",
                    "data": {"statuses": [{"resting": {"oid": 1u64}}]}
                }
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let connector = connector(&server);
    connector.create_order(btc_limit_order()).await.unwrap();

    let mut second = btc_limit_order();
    second.pair = TradingPair::new("ETH");
    second.price = dec!(3000);
    connector.create_order(second).await.unwrap();

    meta.assert_async().await;
    exchange.assert_async().await;
}

#[tokio::test]
async fn unknown_symbol_is_asset_not_found() {
    let mut server = Server::new_async().await;
    let _meta = mock_meta(&mut server, 1).await;

    let connector = connector(&server);
    let mut request = btc_limit_order();
    request.pair = TradingPair::new("DOGE");

    match connector.create_order(request).await {
        Err(Error::AssetNotFound { symbol }) => assert_eq!(symbol, "DOGE"),
        other => panic!("expected AssetNotFound, got {other:?}"),
    }
    // Nothing was registered for an unresolvable asset.
    assert!(connector.orders().is_empty());
}

#[tokio::test]
async fn per_order_rejection_surfaces_and_marks_the_order() {
    let mut server = Server::new_async().await;
    let _meta = mock_meta(&mut server, 1).await;

    let _exchange = server
        .mock("POST", "/exchange")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "status": "ok",
                "response": {
                    "type": "order",
                    "data": {"statuses": [{"error": "Order must have minimum value of $10."}]}
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let connector = connector(&server);
    match connector.create_order(btc_limit_order()).await {
        Err(Error::OrderRejected(message)) => {
            assert!(message.contains("minimum value"));
        }
        other => panic!("expected OrderRejected, got {other:?}"),
    }

    // The rejected order stays tracked, terminal, and closed.
    assert_eq!(connector.orders().len(), 1);
    assert!(connector.get_open_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn top_level_err_envelope_is_exchange_api_error() {
    let mut server = Server::new_async().await;
    let _meta = mock_meta(&mut server, 1).await;

    let _exchange = server
        .mock("POST", "/exchange")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"status": "err", "response": "User or API Wallet does not exist."}).to_string())
        .create_async()
        .await;

    let connector = connector(&server);
    match connector.create_order(btc_limit_order()).await {
        Err(Error::ExchangeApi(message)) => assert!(message.contains("does not exist")),
        other => panic!("expected ExchangeApi, got {other:?}"),
    }
}

#[tokio::test]
async fn balance_uses_top_level_withdrawable() {
    let mut server = Server::new_async().await;

    let _state = server
        .mock("POST", "/info")
        .match_body(Matcher::PartialJson(json!({"type": "clearinghouseState"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "marginSummary": {
                    "accountValue": "1000.5",
                    "totalNtlPos": "0",
                    "totalRawUsd": "1000.5",
                    "totalMarginUsed": "10.5"
                },
                "crossMarginSummary": {
                    "accountValue": "1000.5",
                    "totalNtlPos": "0",
                    "totalRawUsd": "1000.5",
                    "totalMarginUsed": "10.5"
                },
                "withdrawable": "990",
                "assetPositions": [],
                "time": 1700000000000u64
            })
            .to_string(),
        )
        .create_async()
        .await;

    let connector = connector(&server);
    let balance = connector.get_balance().await.unwrap();
    assert_eq!(balance.asset, "USDC");
    assert_eq!(balance.total, dec!(1000.5));
    assert_eq!(balance.available, dec!(990));
    assert_eq!(balance.hold, dec!(10.5));
}

#[tokio::test]
async fn transport_failure_leaves_the_order_pending() {
    let mut server = Server::new_async().await;
    let _meta = mock_meta(&mut server, 1).await;

    let _exchange = server
        .mock("POST", "/exchange")
        .with_status(503)
        .with_body("upstream unavailable")
        .create_async()
        .await;

    let connector = connector(&server);
    let err = connector.create_order(btc_limit_order()).await.unwrap_err();
    assert!(err.is_transport(), "expected transport error, got {err:?}");

    // Track-before-submit: the order is still there, pending, for the
    // caller to reconcile.
    assert_eq!(connector.orders().len(), 1);
    let open = connector.get_open_orders().await.unwrap();
    assert!(open.is_empty(), "pending orders are not open orders");
}
