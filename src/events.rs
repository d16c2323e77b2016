//! Book events: one record per observable change, emitted after the change commits.

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use serde::Serialize;

use crate::execution::{CancelOutcome, Fill, MarketOutcome, PlaceOutcome, RestStatus};
use crate::types::{AccountId, ItemId, OrderId, Price, Quantity, Side};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BookEvent {
    /// A residual rested. `price` may differ from `requested_price` after overflow.
    OrderRested {
        item_id: ItemId,
        side: Side,
        order_id: OrderId,
        maker: AccountId,
        price: Price,
        requested_price: Price,
        quantity: Quantity,
    },
    /// A taker consumed resting orders.
    OrdersMatched {
        item_id: ItemId,
        taker: AccountId,
        taker_side: Side,
        fills: Vec<Fill>,
    },
    OrderCancelled {
        item_id: ItemId,
        side: Side,
        order_id: OrderId,
        maker: AccountId,
        price: Price,
        quantity: Quantity,
    },
    /// A residual below the item's minimum resting quantity was dropped.
    OrderFailedToRest {
        item_id: ItemId,
        side: Side,
        maker: AccountId,
        price: Price,
        quantity: Quantity,
    },
}

impl BookEvent {
    pub fn from_place(outcome: &PlaceOutcome) -> Vec<BookEvent> {
        let mut events = Vec::new();
        if !outcome.fills.is_empty() {
            events.push(BookEvent::OrdersMatched {
                item_id: outcome.item_id,
                taker: outcome.maker,
                taker_side: outcome.side,
                fills: outcome.fills.clone(),
            });
        }
        match outcome.status {
            RestStatus::Rested { order_id, price } => events.push(BookEvent::OrderRested {
                item_id: outcome.item_id,
                side: outcome.side,
                order_id,
                maker: outcome.maker,
                price,
                requested_price: outcome.price,
                quantity: outcome.rested_quantity(),
            }),
            RestStatus::ResidualTooSmall { quantity } => {
                events.push(BookEvent::OrderFailedToRest {
                    item_id: outcome.item_id,
                    side: outcome.side,
                    maker: outcome.maker,
                    price: outcome.price,
                    quantity,
                })
            }
            RestStatus::FullyMatched => {}
        }
        events
    }

    pub fn from_market(outcome: &MarketOutcome) -> BookEvent {
        BookEvent::OrdersMatched {
            item_id: outcome.item_id,
            taker: outcome.taker,
            taker_side: outcome.side,
            fills: outcome.fills.clone(),
        }
    }

    pub fn from_cancel(outcome: &CancelOutcome) -> BookEvent {
        BookEvent::OrderCancelled {
            item_id: outcome.item_id,
            side: outcome.side,
            order_id: outcome.order_id,
            maker: outcome.maker,
            price: outcome.price,
            quantity: outcome.quantity,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &BookEvent);
}

/// Logs one JSON line per event.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &BookEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            info!("book_event {}", line);
        }
    }
}

/// Records events for tests. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<BookEvent>>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BookEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: &BookEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: RestStatus, fills: Vec<Fill>, filled: Quantity) -> PlaceOutcome {
        PlaceOutcome {
            item_id: ItemId(1),
            side: Side::Sell,
            maker: AccountId(3),
            price: 120,
            quantity: 10,
            fills,
            filled,
            quote: 0,
            status,
        }
    }

    #[test]
    fn overflowed_rest_reports_both_prices() {
        let events = BookEvent::from_place(&outcome(
            RestStatus::Rested { order_id: OrderId(8), price: 125 },
            Vec::new(),
            0,
        ));
        assert_eq!(
            events,
            vec![BookEvent::OrderRested {
                item_id: ItemId(1),
                side: Side::Sell,
                order_id: OrderId(8),
                maker: AccountId(3),
                price: 125,
                requested_price: 120,
                quantity: 10,
            }]
        );
    }

    #[test]
    fn match_then_failed_rest() {
        let fill = Fill { order_id: OrderId(1), maker: AccountId(1), price: 130, quantity: 9, fully_filled: true };
        let events = BookEvent::from_place(&outcome(
            RestStatus::ResidualTooSmall { quantity: 1 },
            vec![fill],
            9,
        ));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BookEvent::OrdersMatched { .. }));
        assert!(matches!(events[1], BookEvent::OrderFailedToRest { quantity: 1, .. }));
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = BookEvent::OrderCancelled {
            item_id: ItemId(1),
            side: Side::Buy,
            order_id: OrderId(2),
            maker: AccountId(3),
            price: 10,
            quantity: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "order_cancelled");
        assert_eq!(json["order_id"], 2);
    }
}
