//! Asset movements implied by book operations.
//!
//! The book never holds balances itself. After each committed operation the exchange
//! submits the [`TransferIntent`]s it implies to a [`SettlementSink`], which moves funds
//! in whatever ledger backs the deployment. Intents for one operation are submitted
//! together and only after the book has changed.

use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use serde::Serialize;

use crate::execution::{CancelOutcome, Fill, MarketOutcome, PlaceOutcome};
use crate::fees::{FeeSchedule, FeeSplit};
use crate::types::{amount_str, notional, AccountId, ItemId, Quantity, QuoteAmount, Side};

/// What is being moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "asset", content = "item_id", rename_all = "snake_case")]
pub enum Asset {
    Quote,
    Units(ItemId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferIntent {
    /// Escrow `amount` from `account` behind a resting order.
    Lock {
        account: AccountId,
        asset: Asset,
        #[serde(with = "amount_str")]
        amount: u128,
    },
    /// Return escrow to `account` (cancel).
    Release {
        account: AccountId,
        asset: Asset,
        #[serde(with = "amount_str")]
        amount: u128,
    },
    /// Take `amount` from a taker.
    Collect {
        account: AccountId,
        asset: Asset,
        #[serde(with = "amount_str")]
        amount: u128,
    },
    /// Pay `amount` to `account`.
    Payout {
        account: AccountId,
        asset: Asset,
        #[serde(with = "amount_str")]
        amount: u128,
    },
    /// Fees withheld on trades of `item_id`.
    Fee { item_id: ItemId, split: FeeSplit },
}

impl TransferIntent {
    pub fn amount(&self) -> u128 {
        match self {
            TransferIntent::Lock { amount, .. }
            | TransferIntent::Release { amount, .. }
            | TransferIntent::Collect { amount, .. }
            | TransferIntent::Payout { amount, .. } => *amount,
            TransferIntent::Fee { split, .. } => split.total(),
        }
    }
}

pub trait SettlementSink: Send + Sync {
    fn submit(&self, intents: &[TransferIntent]);
}

/// Logs one JSON line per intent.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSettlementSink;

impl SettlementSink for LogSettlementSink {
    fn submit(&self, intents: &[TransferIntent]) {
        for intent in intents {
            if let Ok(line) = serde_json::to_string(intent) {
                info!("settlement {}", line);
            }
        }
    }
}

/// Records intents for tests. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct InMemorySettlementSink {
    intents: Arc<Mutex<Vec<TransferIntent>>>,
}

impl InMemorySettlementSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intents(&self) -> Vec<TransferIntent> {
        self.intents.lock().clone()
    }

    pub fn clear(&self) {
        self.intents.lock().clear();
    }
}

impl SettlementSink for InMemorySettlementSink {
    fn submit(&self, intents: &[TransferIntent]) {
        self.intents.lock().extend_from_slice(intents);
    }
}

/// Taker side of a set of fills. A selling taker is paid net of fees at once.
fn taker_intents(
    item_id: ItemId,
    side: Side,
    taker: AccountId,
    filled: Quantity,
    quote: QuoteAmount,
    fills: &[Fill],
    fees: &dyn FeeSchedule,
) -> Vec<TransferIntent> {
    if fills.is_empty() {
        return Vec::new();
    }
    let units = Asset::Units(item_id);
    match side {
        Side::Buy => vec![
            TransferIntent::Collect { account: taker, asset: Asset::Quote, amount: quote },
            TransferIntent::Payout { account: taker, asset: units, amount: u128::from(filled) },
        ],
        Side::Sell => {
            let split = fees.split(item_id, quote);
            let mut intents = vec![
                TransferIntent::Collect { account: taker, asset: units, amount: u128::from(filled) },
                TransferIntent::Payout {
                    account: taker,
                    asset: Asset::Quote,
                    amount: quote.saturating_sub(split.total()),
                },
            ];
            if !split.is_zero() {
                intents.push(TransferIntent::Fee { item_id, split });
            }
            intents
        }
    }
}

pub fn place_intents(outcome: &PlaceOutcome, fees: &dyn FeeSchedule) -> Vec<TransferIntent> {
    let mut intents = taker_intents(
        outcome.item_id,
        outcome.side,
        outcome.maker,
        outcome.filled,
        outcome.quote,
        &outcome.fills,
        fees,
    );
    if let Some(price) = outcome.rest_price() {
        let residual = outcome.rested_quantity();
        let (asset, amount) = match outcome.side {
            Side::Buy => (Asset::Quote, notional(price, residual)),
            Side::Sell => (Asset::Units(outcome.item_id), u128::from(residual)),
        };
        intents.push(TransferIntent::Lock { account: outcome.maker, asset, amount });
    }
    intents
}

pub fn market_intents(outcome: &MarketOutcome, fees: &dyn FeeSchedule) -> Vec<TransferIntent> {
    taker_intents(
        outcome.item_id,
        outcome.side,
        outcome.taker,
        outcome.quantity,
        outcome.quote,
        &outcome.fills,
        fees,
    )
}

pub fn cancel_intent(outcome: &CancelOutcome) -> TransferIntent {
    let (asset, amount) = match outcome.side {
        Side::Buy => (Asset::Quote, notional(outcome.price, outcome.quantity)),
        Side::Sell => (Asset::Units(outcome.item_id), u128::from(outcome.quantity)),
    };
    TransferIntent::Release { account: outcome.maker, asset, amount }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RestStatus;
    use crate::fees::{FlatFeeSchedule, NoFees};
    use crate::types::OrderId;
    use rust_decimal::Decimal;

    fn fill(price: u64, quantity: Quantity) -> Fill {
        Fill { order_id: OrderId(1), maker: AccountId(9), price, quantity, fully_filled: true }
    }

    #[test]
    fn buy_that_rests_collects_and_locks() {
        let outcome = PlaceOutcome {
            item_id: ItemId(1),
            side: Side::Buy,
            maker: AccountId(2),
            price: 100,
            quantity: 10,
            fills: vec![fill(90, 4)],
            filled: 4,
            quote: 360,
            status: RestStatus::Rested { order_id: OrderId(5), price: 100 },
        };
        let intents = place_intents(&outcome, &NoFees);
        assert_eq!(
            intents,
            vec![
                TransferIntent::Collect { account: AccountId(2), asset: Asset::Quote, amount: 360 },
                TransferIntent::Payout { account: AccountId(2), asset: Asset::Units(ItemId(1)), amount: 4 },
                TransferIntent::Lock { account: AccountId(2), asset: Asset::Quote, amount: 600 },
            ]
        );
    }

    #[test]
    fn taker_sell_pays_net_of_fees() {
        let fees = FlatFeeSchedule::new(Decimal::new(1, 1), Decimal::ZERO, Decimal::ZERO).unwrap();
        let outcome = MarketOutcome {
            item_id: ItemId(3),
            side: Side::Sell,
            taker: AccountId(4),
            quantity: 2,
            fills: vec![fill(500, 2)],
            quote: 1_000,
        };
        let intents = market_intents(&outcome, &fees);
        assert_eq!(intents[1].amount(), 900);
        assert!(matches!(intents[2], TransferIntent::Fee { item_id: ItemId(3), .. }));
        assert_eq!(intents[2].amount(), 100);
    }

    #[test]
    fn cancel_releases_what_was_locked() {
        let outcome = CancelOutcome {
            order_id: OrderId(1),
            maker: AccountId(1),
            item_id: ItemId(1),
            side: Side::Sell,
            price: 100,
            quantity: 7,
        };
        assert_eq!(
            cancel_intent(&outcome),
            TransferIntent::Release { account: AccountId(1), asset: Asset::Units(ItemId(1)), amount: 7 }
        );
    }

    #[test]
    fn in_memory_sink_records_in_order() {
        let sink = InMemorySettlementSink::new();
        let shared = sink.clone();
        shared.submit(&[TransferIntent::Fee { item_id: ItemId(1), split: FeeSplit::default() }]);
        assert_eq!(sink.intents().len(), 1);
        sink.clear();
        assert!(shared.intents().is_empty());
    }
}
