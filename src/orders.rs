//! Order store and lifecycle manager.
//!
//! The discipline here is *track before submit*: an order is inserted into
//! the store with a fresh client id before any bytes go out, so a transport
//! failure can never lose an order the caller believes was sent. Responses
//! and WebSocket updates then move the stored order through its lifecycle;
//! every mutation goes through one guarded transition function that
//! enforces the invariants:
//!
//! - `filled_amount <= amount`, always;
//! - entering `Resting` or `PartiallyFilled` requires the exchange order id
//!   to be known;
//! - `Filled`, `Cancelled`, and `Rejected` are terminal — nothing mutates a
//!   terminal order again.
//!
//! The store owns each client id as an `Arc<str>`; orders handed to callers
//! carry a reference-counted handle to the same allocation, and the
//! exchange-id index shares it too. Both maps sit behind a single mutex and
//! every public operation locks exactly once.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    error::{Error, Result},
    types::{Fill, OrderRequest, OrderResponseStatus, OrderType, OrderUpdate, Side, TradingPair},
};

/// Lifecycle state of a tracked order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum OrderState {
    /// Registered locally, not yet transmitted (or transmission failed).
    #[display("pending")]
    Pending,
    /// Handed to the transport; no response yet.
    #[display("submitted")]
    Submitted,
    /// Accepted by the matching engine and on the book.
    #[display("resting")]
    Resting,
    /// On the book with some fills.
    #[display("partially_filled")]
    PartiallyFilled,
    /// Completely filled. Terminal.
    #[display("filled")]
    Filled,
    /// Cancelled. Terminal.
    #[display("cancelled")]
    Cancelled,
    /// Rejected by the exchange. Terminal.
    #[display("rejected")]
    Rejected,
}

impl OrderState {
    /// Terminal states admit no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }

    /// Open states are those `get_open_orders` reports.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OrderState::Submitted | OrderState::Resting | OrderState::PartiallyFilled
        )
    }
}

/// A tracked order.
///
/// Instances returned by the manager are detached copies; the store keeps
/// the canonical record. The client id is a shared handle into the store's
/// key storage.
#[derive(Debug, Clone)]
pub struct Order {
    client_order_id: Arc<str>,
    pub exchange_order_id: Option<u64>,
    pub pair: TradingPair,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub amount: Decimal,
    pub filled_amount: Decimal,
    pub status: OrderState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The connector-assigned id, unique within this connector instance.
    #[must_use]
    pub fn client_order_id(&self) -> &str {
        &self.client_order_id
    }

    /// Remaining unfilled size.
    #[must_use]
    pub fn remaining(&self) -> Decimal {
        self.amount - self.filled_amount
    }
}

#[derive(Default)]
struct Store {
    by_client_id: HashMap<Arc<str>, Order>,
    by_exchange_id: HashMap<u64, Arc<str>>,
}

impl Store {
    /// Applies a state change under the lifecycle rules. Returns false when
    /// the transition is not permitted; the order is left untouched.
    fn transition(&mut self, client_id: &str, status: OrderState) -> bool {
        let Some(order) = self.by_client_id.get_mut(client_id) else {
            return false;
        };
        if order.status.is_terminal() {
            log::debug!(
                "ignoring {status} transition for terminal order {client_id} ({})",
                order.status
            );
            return false;
        }
        if matches!(status, OrderState::Resting | OrderState::PartiallyFilled)
            && order.exchange_order_id.is_none()
        {
            log::warn!("refusing {status} transition for {client_id}: no exchange order id");
            return false;
        }
        order.status = status;
        order.updated_at = Utc::now();
        true
    }

    /// Links an exchange id to an order, updating the secondary index.
    fn link_exchange_id(&mut self, client_id: &Arc<str>, oid: u64) {
        if let Some(order) = self.by_client_id.get_mut(client_id) {
            order.exchange_order_id = Some(oid);
            self.by_exchange_id.insert(oid, Arc::clone(client_id));
        }
    }

    /// Adds to the filled amount, clamped to the order size, and moves the
    /// order to `PartiallyFilled` or `Filled` accordingly.
    fn apply_fill(&mut self, client_id: &Arc<str>, fill_sz: Decimal) -> bool {
        let Some(order) = self.by_client_id.get_mut(client_id) else {
            return false;
        };
        if order.status.is_terminal() {
            return false;
        }
        order.filled_amount = (order.filled_amount + fill_sz).min(order.amount);
        let next = if order.filled_amount >= order.amount {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
        let id = Arc::clone(client_id);
        self.transition(&id, next)
    }
}

/// Thread-safe order store with the pre-registration workflow.
pub struct OrderManager {
    store: Mutex<Store>,
    seq: AtomicU64,
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            seq: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new order in `Pending` state and returns a detached
    /// copy. The generated client id is `"{millis}-{counter}"`; the counter
    /// never repeats within the process, so ids are unique even when two
    /// orders register in the same millisecond.
    pub fn register(&self, request: &OrderRequest) -> Order {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let client_id: Arc<str> =
            format!("{}-{}", Utc::now().timestamp_millis(), seq).into();
        let now = Utc::now();

        let order = Order {
            client_order_id: Arc::clone(&client_id),
            exchange_order_id: None,
            pair: request.pair.clone(),
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            amount: request.amount,
            filled_amount: Decimal::ZERO,
            status: OrderState::Pending,
            created_at: now,
            updated_at: now,
        };

        let mut store = self.lock();
        store.by_client_id.insert(client_id, order.clone());
        order
    }

    /// Marks an order as handed to the transport.
    pub fn mark_submitted(&self, client_id: &str) {
        self.lock().transition(client_id, OrderState::Submitted);
    }

    /// Applies the exchange's response status for an order and returns the
    /// updated record.
    ///
    /// - `resting` links the oid and moves to `Resting`;
    /// - `filled` links the oid, sets `filled_amount = amount`, `Filled`;
    /// - a per-order `error` moves to `Rejected`.
    pub fn apply_response(&self, client_id: &str, status: &OrderResponseStatus) -> Result<Order> {
        let mut store = self.lock();
        let key = store
            .by_client_id
            .get_key_value(client_id)
            .map(|(k, _)| Arc::clone(k))
            .ok_or_else(|| Error::OrderNotFound {
                id: client_id.to_string(),
            })?;

        match status {
            OrderResponseStatus::Success => {
                store.transition(&key, OrderState::Submitted);
            }
            OrderResponseStatus::Resting { oid } => {
                store.link_exchange_id(&key, *oid);
                store.transition(&key, OrderState::Resting);
            }
            OrderResponseStatus::Filled { oid, .. } => {
                store.link_exchange_id(&key, *oid);
                if let Some(order) = store.by_client_id.get_mut(&key) {
                    order.filled_amount = order.amount;
                }
                store.transition(&key, OrderState::Filled);
            }
            OrderResponseStatus::Error(_) => {
                store.transition(&key, OrderState::Rejected);
            }
        }

        Ok(store.by_client_id[&key].clone())
    }

    /// Reconciles an `orderUpdates` frame into the store. Returns the
    /// updated order, or `None` when the oid is not (yet) known — a fill or
    /// status for an order whose HTTP response has not arrived resolves
    /// once that response links the oid.
    pub fn apply_update(&self, update: &OrderUpdate) -> Option<Order> {
        use crate::types::WireOrderStatus;

        let mut store = self.lock();
        let key = store.by_exchange_id.get(&update.order.oid).cloned()?;

        match update.status {
            WireOrderStatus::Open => {
                let filled = update.order.filled();
                let already = store.by_client_id[&key].filled_amount;
                let delta = (filled - already).max(Decimal::ZERO);
                if delta > Decimal::ZERO {
                    store.apply_fill(&key, delta);
                } else if already.is_zero() {
                    store.transition(&key, OrderState::Resting);
                }
            }
            WireOrderStatus::Filled => {
                if let Some(order) = store.by_client_id.get_mut(&key) {
                    if !order.status.is_terminal() {
                        order.filled_amount = order.amount;
                    }
                }
                store.transition(&key, OrderState::Filled);
            }
            WireOrderStatus::Triggered => {}
            status if status.is_cancelled() => {
                store.transition(&key, OrderState::Cancelled);
            }
            status if status.is_rejected() => {
                store.transition(&key, OrderState::Rejected);
            }
            _ => {}
        }

        Some(store.by_client_id[&key].clone())
    }

    /// Reconciles a `userFills` entry into the store. Returns the updated
    /// order, or `None` when the oid is unknown.
    pub fn apply_wire_fill(&self, fill: &Fill) -> Option<Order> {
        let mut store = self.lock();
        let key = store.by_exchange_id.get(&fill.oid).cloned()?;
        store.apply_fill(&key, fill.sz);
        Some(store.by_client_id[&key].clone())
    }

    /// Moves an order to `Cancelled` after a successful cancel request.
    pub fn mark_cancelled(&self, client_id: &str) -> Result<Order> {
        let mut store = self.lock();
        if !store.by_client_id.contains_key(client_id) {
            return Err(Error::OrderNotFound {
                id: client_id.to_string(),
            });
        }
        store.transition(client_id, OrderState::Cancelled);
        Ok(store.by_client_id[client_id].clone())
    }

    /// Looks up an order by client id.
    pub fn get(&self, client_id: &str) -> Result<Order> {
        self.lock()
            .by_client_id
            .get(client_id)
            .cloned()
            .ok_or_else(|| Error::OrderNotFound {
                id: client_id.to_string(),
            })
    }

    /// Looks up an order by exchange oid.
    pub fn get_by_exchange_id(&self, oid: u64) -> Result<Order> {
        let store = self.lock();
        store
            .by_exchange_id
            .get(&oid)
            .and_then(|key| store.by_client_id.get(key))
            .cloned()
            .ok_or_else(|| Error::OrderNotFound {
                id: oid.to_string(),
            })
    }

    /// Returns detached copies of all open orders (submitted, resting, or
    /// partially filled).
    pub fn open_orders(&self) -> Vec<Order> {
        self.lock()
            .by_client_id
            .values()
            .filter(|order| order.status.is_open())
            .cloned()
            .collect()
    }

    /// Removes an order, updating both maps atomically. Returns the removed
    /// record.
    pub fn remove(&self, client_id: &str) -> Option<Order> {
        let mut store = self.lock();
        let order = store.by_client_id.remove(client_id)?;
        if let Some(oid) = order.exchange_order_id {
            store.by_exchange_id.remove(&oid);
        }
        Some(order)
    }

    /// Number of tracked orders.
    pub fn len(&self) -> usize {
        self.lock().by_client_id.len()
    }

    /// True when no orders are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;

    use super::*;
    use crate::types::{BasicOrder, TimeInForce, WireOrderStatus};

    fn request() -> OrderRequest {
        OrderRequest {
            pair: TradingPair::new("BTC"),
            side: Side::Buy,
            order_type: OrderType::Limit {
                tif: TimeInForce::Gtc,
            },
            price: dec!(87000),
            amount: dec!(0.002),
            reduce_only: false,
        }
    }

    fn update(oid: u64, status: WireOrderStatus, remaining: Decimal) -> OrderUpdate {
        OrderUpdate {
            order: BasicOrder {
                coin: "BTC".into(),
                side: Side::Buy,
                limit_px: dec!(87000),
                sz: remaining,
                oid,
                timestamp: 0,
                orig_sz: dec!(0.002),
                cloid: None,
            },
            status,
            status_timestamp: 1,
        }
    }

    #[test]
    fn registration_precedes_submission() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        assert_eq!(order.status, OrderState::Pending);
        assert_eq!(order.filled_amount, Decimal::ZERO);
        assert!(manager.get(order.client_order_id()).is_ok());
    }

    #[test]
    fn client_ids_are_unique() {
        let manager = OrderManager::new();
        let a = manager.register(&request());
        let b = manager.register(&request());
        assert_ne!(a.client_order_id(), b.client_order_id());
    }

    #[test]
    fn resting_response_links_exchange_id() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        manager.mark_submitted(order.client_order_id());

        let updated = manager
            .apply_response(
                order.client_order_id(),
                &OrderResponseStatus::Resting { oid: 45564725639 },
            )
            .unwrap();

        assert_eq!(updated.status, OrderState::Resting);
        assert_eq!(updated.exchange_order_id, Some(45564725639));
        assert_eq!(
            manager.get_by_exchange_id(45564725639).unwrap().client_order_id(),
            order.client_order_id()
        );
    }

    #[test]
    fn immediate_fill_completes_the_order() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        let updated = manager
            .apply_response(
                order.client_order_id(),
                &OrderResponseStatus::Filled {
                    total_sz: dec!(0.002),
                    avg_px: dec!(86990),
                    oid: 7,
                },
            )
            .unwrap();

        assert_eq!(updated.status, OrderState::Filled);
        assert_eq!(updated.filled_amount, updated.amount);
    }

    #[test]
    fn rejection_is_terminal() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        let updated = manager
            .apply_response(
                order.client_order_id(),
                &OrderResponseStatus::Error("Order must have minimum value of $10.".into()),
            )
            .unwrap();
        assert_eq!(updated.status, OrderState::Rejected);

        // A late resting response must not resurrect it.
        let after = manager
            .apply_response(order.client_order_id(), &OrderResponseStatus::Resting { oid: 1 })
            .unwrap();
        assert_eq!(after.status, OrderState::Rejected);
    }

    #[test]
    fn resting_requires_exchange_id() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        // Direct transition without an oid must be refused.
        assert!(!manager.lock().transition(order.client_order_id(), OrderState::Resting));
        assert_eq!(
            manager.get(order.client_order_id()).unwrap().status,
            OrderState::Pending
        );
    }

    #[test]
    fn ws_fills_accumulate_and_clamp() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        manager
            .apply_response(order.client_order_id(), &OrderResponseStatus::Resting { oid: 9 })
            .unwrap();

        let fill = Fill {
            coin: "BTC".into(),
            px: dec!(87000),
            sz: dec!(0.001),
            side: Side::Buy,
            time: 0,
            oid: 9,
            tid: 1,
            fee: None,
            closed_pnl: None,
            crossed: false,
        };
        let after = manager.apply_wire_fill(&fill).unwrap();
        assert_eq!(after.status, OrderState::PartiallyFilled);
        assert_eq!(after.filled_amount, dec!(0.001));

        // An oversized second fill clamps at the order amount.
        let big = Fill { sz: dec!(0.005), tid: 2, ..fill };
        let done = manager.apply_wire_fill(&big).unwrap();
        assert_eq!(done.status, OrderState::Filled);
        assert_eq!(done.filled_amount, done.amount);
    }

    #[test]
    fn fill_for_unknown_oid_is_deferred() {
        let manager = OrderManager::new();
        let fill = Fill {
            coin: "BTC".into(),
            px: dec!(87000),
            sz: dec!(0.001),
            side: Side::Buy,
            time: 0,
            oid: 424242,
            tid: 1,
            fee: None,
            closed_pnl: None,
            crossed: false,
        };
        assert!(manager.apply_wire_fill(&fill).is_none());
    }

    #[test]
    fn order_update_cancellation_reasons_map_to_cancelled() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        manager
            .apply_response(order.client_order_id(), &OrderResponseStatus::Resting { oid: 5 })
            .unwrap();

        let after = manager
            .apply_update(&update(5, WireOrderStatus::MarginCanceled, dec!(0.002)))
            .unwrap();
        assert_eq!(after.status, OrderState::Cancelled);

        // Terminal: a later fill frame is inert.
        assert!(
            manager
                .apply_update(&update(5, WireOrderStatus::Filled, dec!(0)))
                .unwrap()
                .status
                == OrderState::Cancelled
        );
    }

    #[test]
    fn cancel_flow_marks_cancelled() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        manager
            .apply_response(order.client_order_id(), &OrderResponseStatus::Resting { oid: 11 })
            .unwrap();

        let cancelled = manager.mark_cancelled(order.client_order_id()).unwrap();
        assert_eq!(cancelled.status, OrderState::Cancelled);
        assert!(manager.open_orders().is_empty());
    }

    #[test]
    fn open_orders_filters_by_state() {
        let manager = OrderManager::new();
        let resting = manager.register(&request());
        manager
            .apply_response(resting.client_order_id(), &OrderResponseStatus::Resting { oid: 1 })
            .unwrap();

        let rejected = manager.register(&request());
        manager
            .apply_response(rejected.client_order_id(), &OrderResponseStatus::Error("no".into()))
            .unwrap();

        let pending = manager.register(&request());

        let open = manager.open_orders();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].client_order_id(), resting.client_order_id());
        assert_eq!(
            manager.get(pending.client_order_id()).unwrap().status,
            OrderState::Pending
        );
    }

    #[test]
    fn remove_updates_both_indexes() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        manager
            .apply_response(order.client_order_id(), &OrderResponseStatus::Resting { oid: 77 })
            .unwrap();

        let removed = manager.remove(order.client_order_id()).unwrap();
        assert_eq!(removed.exchange_order_id, Some(77));
        assert!(manager.get(order.client_order_id()).is_err());
        assert!(manager.get_by_exchange_id(77).is_err());
        assert!(manager.is_empty());
    }

    #[test]
    fn partial_fill_via_order_update() {
        let manager = OrderManager::new();
        let order = manager.register(&request());
        manager
            .apply_response(order.client_order_id(), &OrderResponseStatus::Resting { oid: 3 })
            .unwrap();

        // Open update with half the size remaining.
        let after = manager
            .apply_update(&update(3, WireOrderStatus::Open, dec!(0.001)))
            .unwrap();
        assert_eq!(after.status, OrderState::PartiallyFilled);
        assert_eq!(after.filled_amount, dec!(0.001));
    }
}
