//! Outcomes returned by the order operations.
//!
//! [`Fill`] is produced for every resting order a taker consumes. [`PlaceOutcome`],
//! [`MarketOutcome`] and [`CancelOutcome`] summarise one request each; claim receipts
//! report what was paid out. Quote amounts serialize as decimal strings.

use serde::{Deserialize, Serialize};

use crate::fees::FeeSplit;
use crate::types::{amount_str, AccountId, ItemId, OrderId, Price, Quantity, QuoteAmount, Side};

/// One resting order consumed by a taker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub maker: AccountId,
    pub price: Price,
    pub quantity: Quantity,
    /// The resting order has no quantity left.
    pub fully_filled: bool,
}

/// What happened to the unmatched part of a limit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestStatus {
    /// Nothing left to rest.
    FullyMatched,
    /// Residual rested under a fresh id, possibly at an overflow price.
    Rested { order_id: OrderId, price: Price },
    /// Residual was below the item's minimum resting quantity and was dropped.
    ResidualTooSmall { quantity: Quantity },
}

/// Result of one limit order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOutcome {
    pub item_id: ItemId,
    pub side: Side,
    pub maker: AccountId,
    /// Limit price as submitted.
    pub price: Price,
    pub quantity: Quantity,
    pub fills: Vec<Fill>,
    pub filled: Quantity,
    /// Quote exchanged by the matched part.
    #[serde(with = "amount_str")]
    pub quote: QuoteAmount,
    pub status: RestStatus,
}

impl PlaceOutcome {
    /// Quantity left on the book by this order.
    pub fn rested_quantity(&self) -> Quantity {
        match self.status {
            RestStatus::Rested { .. } => self.quantity - self.filled,
            _ => 0,
        }
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self.status {
            RestStatus::Rested { order_id, .. } => Some(order_id),
            _ => None,
        }
    }

    pub fn rest_price(&self) -> Option<Price> {
        match self.status {
            RestStatus::Rested { price, .. } => Some(price),
            _ => None,
        }
    }
}

/// Result of one take-only order. Always fully filled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOutcome {
    pub item_id: ItemId,
    pub side: Side,
    pub taker: AccountId,
    pub quantity: Quantity,
    pub fills: Vec<Fill>,
    /// Total cost (buy) or gross proceeds (sell).
    #[serde(with = "amount_str")]
    pub quote: QuoteAmount,
}

/// A cancelled resting order and the quantity released.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub order_id: OrderId,
    pub maker: AccountId,
    pub item_id: ItemId,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
}

/// Quote paid out by a claim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    #[serde(with = "amount_str")]
    pub gross: QuoteAmount,
    pub fees: FeeSplit,
    #[serde(with = "amount_str")]
    pub net: QuoteAmount,
}

/// Units paid out by a unit claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitClaimReceipt {
    pub item_id: ItemId,
    pub units: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rested_quantity_only_counts_rested_residual() {
        let mut outcome = PlaceOutcome {
            item_id: ItemId(1),
            side: Side::Buy,
            maker: AccountId(1),
            price: 100,
            quantity: 10,
            fills: Vec::new(),
            filled: 4,
            quote: 400,
            status: RestStatus::Rested { order_id: OrderId(3), price: 100 },
        };
        assert_eq!(outcome.rested_quantity(), 6);
        assert_eq!(outcome.order_id(), Some(OrderId(3)));

        outcome.status = RestStatus::ResidualTooSmall { quantity: 6 };
        assert_eq!(outcome.rested_quantity(), 0);
        assert_eq!(outcome.rest_price(), None);
    }

    #[test]
    fn status_serializes_tagged() {
        let json = serde_json::to_value(RestStatus::Rested { order_id: OrderId(5), price: 90 }).unwrap();
        assert_eq!(json["status"], "rested");
        assert_eq!(json["order_id"], 5);
    }
}
