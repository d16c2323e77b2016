//! Multi-item exchange facade.
//!
//! One [`OrderBook`] per configured item, each behind its own lock, so operations on
//! different items run in parallel while mutations of one item are serialized. Readers
//! take the same lock shared and never see a half-applied change.
//!
//! Batches are atomic. The books a batch touches are locked in ascending item order and
//! record an undo journal while the batch runs; if any request fails, every book is
//! rolled back before its lock is released. The journal holds only what the batch
//! touched, so a batch costs the same per request as single calls. Events and
//! settlement intents are emitted after the locks are released.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::info;
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::audit::{AuditAction, AuditEvent, AuditSink, LogAuditSink};
use crate::config::EngineConfig;
use crate::error::BookError;
use crate::events::{BookEvent, EventSink, LogEventSink};
use crate::execution::{CancelOutcome, ClaimReceipt, MarketOutcome, PlaceOutcome, UnitClaimReceipt};
use crate::fees::{FeeSchedule, NoFees};
use crate::order_book::{ClaimableBalance, DepthLevel, OrderBook, OrderRecord};
use crate::settlement::{self, Asset, LogSettlementSink, SettlementSink, TransferIntent};
use crate::types::{
    AccountId, ItemId, LimitOrderRequest, MarketOrderRequest, OrderId, OrderIdAllocator,
    OrderLocator, Price, Quantity, RestingOrderView, Side, TokenPolicy,
};

type BookHandle = Arc<RwLock<OrderBook>>;

/// Locked books of one operation, looked up by item.
struct BookSet<'a> {
    books: Vec<(ItemId, &'a mut OrderBook)>,
}

impl BookSet<'_> {
    fn get(&mut self, item_id: ItemId) -> Result<&mut OrderBook, BookError> {
        self.books
            .iter_mut()
            .find(|(id, _)| *id == item_id)
            .map(|(_, book)| &mut **book)
            .ok_or(BookError::UnknownItem { item_id })
    }
}

/// Exchange over many items.
///
/// Create with [`Exchange::new`], configure items with [`Exchange::set_token_policy`],
/// then use [`Exchange::place_limit_orders`], [`Exchange::place_market_order`],
/// [`Exchange::cancel_orders`], [`Exchange::claim`] and [`Exchange::claim_units`].
pub struct Exchange {
    config: RwLock<EngineConfig>,
    books: RwLock<HashMap<ItemId, BookHandle>>,
    /// Item of every order id ever rested, for claims that only name ids.
    directory: RwLock<HashMap<OrderId, ItemId>>,
    ids: OrderIdAllocator,
    fees: Arc<dyn FeeSchedule>,
    settlement: Arc<dyn SettlementSink>,
    events: Arc<dyn EventSink>,
    audit: Arc<dyn AuditSink>,
}

impl Exchange {
    pub fn new(config: EngineConfig) -> Result<Self, BookError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            books: RwLock::new(HashMap::new()),
            directory: RwLock::new(HashMap::new()),
            ids: OrderIdAllocator::new(),
            fees: Arc::new(NoFees),
            settlement: Arc::new(LogSettlementSink),
            events: Arc::new(LogEventSink),
            audit: Arc::new(LogAuditSink),
        })
    }

    pub fn with_fee_schedule(mut self, fees: Arc<dyn FeeSchedule>) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_settlement(mut self, settlement: Arc<dyn SettlementSink>) -> Self {
        self.settlement = settlement;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Places limit orders for `maker`, all or none.
    ///
    /// A residual dropped for being below the item's minimum is a normal outcome, not a
    /// failure. In a batch of more than one request, errors are wrapped in
    /// [`BookError::Batch`] with the index of the failing request.
    pub fn place_limit_orders(
        &self,
        maker: AccountId,
        requests: &[LimitOrderRequest],
    ) -> Result<Vec<PlaceOutcome>, BookError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let batched = requests.len() > 1;
        let config = self.config();
        let items: BTreeSet<ItemId> = requests.iter().map(|r| r.item_id).collect();
        let outcomes = self
            .with_books(&items, batched, |books| {
                let mut outcomes = Vec::with_capacity(requests.len());
                for (index, request) in requests.iter().enumerate() {
                    let outcome = books
                        .get(request.item_id)
                        .and_then(|book| book.place_limit(maker, request, &config, &self.ids))
                        .map_err(|e| wrap(batched, index, e))?;
                    outcomes.push(outcome);
                }
                // before the book locks drop, so a visible order always resolves by id
                let mut directory = self.directory.write();
                for outcome in &outcomes {
                    if let Some(order_id) = outcome.order_id() {
                        directory.insert(order_id, outcome.item_id);
                    }
                }
                Ok(outcomes)
            })
            .map_err(|e| locate_unknown_item(e, batched, requests.iter().map(|r| r.item_id)))?;

        let mut intents = Vec::new();
        for outcome in &outcomes {
            info!(
                "limit order maker={} item_id={} side={} price={} quantity={} filled={} status={:?}",
                maker, outcome.item_id, outcome.side, outcome.price, outcome.quantity, outcome.filled, outcome.status
            );
            for event in BookEvent::from_place(outcome) {
                self.events.emit(&event);
            }
            intents.extend(settlement::place_intents(outcome, self.fees.as_ref()));
        }
        self.submit(&intents);
        Ok(outcomes)
    }

    /// Take-only order: fills completely within `total_cost_bound` or fails with no effect.
    pub fn place_market_order(
        &self,
        taker: AccountId,
        request: &MarketOrderRequest,
    ) -> Result<MarketOutcome, BookError> {
        let config = self.config();
        let items = BTreeSet::from([request.item_id]);
        let outcome = self.with_books(&items, false, |books| {
            books
                .get(request.item_id)?
                .place_market(taker, request, &config)
        })?;
        info!(
            "market order taker={} item_id={} side={} quantity={} quote={}",
            taker, outcome.item_id, outcome.side, outcome.quantity, outcome.quote
        );
        self.events.emit(&BookEvent::from_market(&outcome));
        self.submit(&settlement::market_intents(&outcome, self.fees.as_ref()));
        Ok(outcome)
    }

    /// Cancels resting orders, all or none. `locators[i]` says where `order_ids[i]` rests.
    pub fn cancel_orders(
        &self,
        caller: AccountId,
        order_ids: &[OrderId],
        locators: &[OrderLocator],
    ) -> Result<Vec<CancelOutcome>, BookError> {
        if order_ids.len() != locators.len() {
            return Err(BookError::LocatorCountMismatch {
                ids: order_ids.len(),
                locators: locators.len(),
            });
        }
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let batched = order_ids.len() > 1;
        let items: BTreeSet<ItemId> = locators.iter().map(|l| l.item_id).collect();
        let cancelled = self
            .with_books(&items, batched, |books| {
                let mut cancelled = Vec::with_capacity(order_ids.len());
                for (index, (order_id, locator)) in order_ids.iter().zip(locators).enumerate() {
                    let outcome = books
                        .get(locator.item_id)
                        .and_then(|book| book.cancel(caller, *order_id, locator.side, locator.price))
                        .map_err(|e| wrap(batched, index, e))?;
                    cancelled.push(outcome);
                }
                Ok(cancelled)
            })
            .map_err(|e| locate_unknown_item(e, batched, locators.iter().map(|l| l.item_id)))?;

        let intents: Vec<_> = cancelled.iter().map(settlement::cancel_intent).collect();
        for outcome in &cancelled {
            info!(
                "order cancelled order_id={} item_id={} side={} price={} quantity={}",
                outcome.order_id, outcome.item_id, outcome.side, outcome.price, outcome.quantity
            );
            self.events.emit(&BookEvent::from_cancel(outcome));
        }
        self.submit(&intents);
        Ok(cancelled)
    }

    /// Pays out the quote owed on `order_ids`, across items, net of fees. All or none.
    pub fn claim(&self, caller: AccountId, order_ids: &[OrderId]) -> Result<ClaimReceipt, BookError> {
        let mut by_item: BTreeMap<ItemId, Vec<OrderId>> = BTreeMap::new();
        {
            let directory = self.directory.read();
            let unique: BTreeSet<OrderId> = order_ids.iter().copied().collect();
            for order_id in unique {
                let item_id = *directory
                    .get(&order_id)
                    .ok_or(BookError::UnknownOrder { order_id })?;
                by_item.entry(item_id).or_default().push(order_id);
            }
        }
        let items: BTreeSet<ItemId> = by_item.keys().copied().collect();
        let gross_by_item = self.with_books(&items, false, |books| {
            let mut owed = Vec::with_capacity(by_item.len());
            for (item_id, ids) in &by_item {
                owed.push((*item_id, books.get(*item_id)?.owed(caller, ids)?.quote));
            }
            if owed.iter().all(|(_, quote)| *quote == 0) {
                return Err(BookError::NothingToClaim);
            }
            for (item_id, ids) in &by_item {
                books.get(*item_id)?.take_quote(ids);
            }
            Ok(owed)
        })?;

        let mut receipt = ClaimReceipt::default();
        let mut intents = Vec::new();
        for (item_id, gross) in gross_by_item.into_iter().filter(|(_, q)| *q > 0) {
            let split = self.fees.split(item_id, gross);
            receipt.gross += gross;
            receipt.fees.accumulate(split);
            if !split.is_zero() {
                intents.push(TransferIntent::Fee { item_id, split });
            }
        }
        receipt.net = receipt.gross.saturating_sub(receipt.fees.total());
        intents.insert(
            0,
            TransferIntent::Payout { account: caller, asset: Asset::Quote, amount: receipt.net },
        );
        info!(
            "claim caller={} orders={} gross={} fees={} net={}",
            caller,
            order_ids.len(),
            receipt.gross,
            receipt.fees.total(),
            receipt.net
        );
        self.submit(&intents);
        Ok(receipt)
    }

    /// Pays out the units of `item_id` owed on `order_ids`. All or none.
    pub fn claim_units(
        &self,
        caller: AccountId,
        item_id: ItemId,
        order_ids: &[OrderId],
    ) -> Result<UnitClaimReceipt, BookError> {
        let items = BTreeSet::from([item_id]);
        let units = self.with_books(&items, false, |books| {
            books.get(item_id)?.claim_units(caller, order_ids)
        })?;
        info!("unit claim caller={} item_id={} units={}", caller, item_id, units);
        self.submit(&[TransferIntent::Payout {
            account: caller,
            asset: Asset::Units(item_id),
            amount: u128::from(units),
        }]);
        Ok(UnitClaimReceipt { item_id, units })
    }

    /// Configures an item, creating its book on first use. The tick cannot change once an
    /// order has rested on the item.
    pub fn set_token_policy(
        &self,
        actor: AccountId,
        item_id: ItemId,
        tick: Price,
        min_rest_quantity: Quantity,
    ) -> Result<(), BookError> {
        let policy = TokenPolicy { tick, min_rest_quantity };
        let result = if tick == 0 {
            Err(BookError::InvalidTick { item_id })
        } else {
            let handle = self
                .books
                .write()
                .entry(item_id)
                .or_insert_with(|| Arc::new(RwLock::new(OrderBook::new(item_id, policy))))
                .clone();
            let updated = handle.write().update_policy(policy);
            updated
        };
        info!(
            "set token policy actor={} item_id={} tick={} min_rest_quantity={} ok={}",
            actor,
            item_id,
            tick,
            min_rest_quantity,
            result.is_ok()
        );
        self.audit.emit(&AuditEvent::now(
            actor,
            AuditAction::SetTokenPolicy,
            serde_json::json!({
                "item_id": item_id.0,
                "tick": tick,
                "min_rest_quantity": min_rest_quantity,
            }),
            &result,
        ));
        result
    }

    /// Changes how many live orders one price level may hold. Levels already above the new
    /// limit keep their orders; new orders overflow.
    pub fn set_max_orders_per_price(&self, actor: AccountId, max_orders_per_price: usize) -> Result<(), BookError> {
        let result = {
            let mut config = self.config.write();
            let candidate = EngineConfig { max_orders_per_price, ..config.clone() };
            candidate.validate().map(|()| *config = candidate)
        };
        info!(
            "set max orders per price actor={} max_orders_per_price={} ok={}",
            actor,
            max_orders_per_price,
            result.is_ok()
        );
        self.audit.emit(&AuditEvent::now(
            actor,
            AuditAction::SetMaxOrdersPerPrice,
            serde_json::json!({ "max_orders_per_price": max_orders_per_price }),
            &result,
        ));
        result
    }

    fn read<R>(&self, item_id: ItemId, f: impl FnOnce(&OrderBook) -> R) -> Option<R> {
        let handle = self.books.read().get(&item_id).cloned()?;
        let book = handle.read();
        Some(f(&*book))
    }

    pub fn best_bid(&self, item_id: ItemId) -> Option<Price> {
        self.read(item_id, OrderBook::best_bid).flatten()
    }

    pub fn best_ask(&self, item_id: ItemId) -> Option<Price> {
        self.read(item_id, OrderBook::best_ask).flatten()
    }

    pub fn orders_at_price(&self, side: Side, item_id: ItemId, price: Price) -> Vec<RestingOrderView> {
        self.read(item_id, |book| book.orders_at_price(side, price))
            .unwrap_or_default()
    }

    pub fn price_level_exists(&self, side: Side, item_id: ItemId, price: Price) -> bool {
        self.read(item_id, |book| book.price_level_exists(side, price))
            .unwrap_or(false)
    }

    pub fn depth(&self, side: Side, item_id: ItemId, levels: usize) -> Vec<DepthLevel> {
        self.read(item_id, |book| book.depth(side, levels))
            .unwrap_or_default()
    }

    pub fn token_policy(&self, item_id: ItemId) -> Option<TokenPolicy> {
        self.read(item_id, OrderBook::policy)
    }

    pub fn order(&self, order_id: OrderId) -> Option<OrderRecord> {
        let item_id = *self.directory.read().get(&order_id)?;
        self.read(item_id, |book| book.order(order_id).copied()).flatten()
    }

    pub fn claimable(&self, order_id: OrderId) -> Option<ClaimableBalance> {
        let item_id = *self.directory.read().get(&order_id)?;
        self.read(item_id, |book| book.claimable(order_id))
    }

    fn submit(&self, intents: &[TransferIntent]) {
        if !intents.is_empty() {
            self.settlement.submit(intents);
        }
    }

    fn handles(&self, items: &BTreeSet<ItemId>) -> Result<Vec<(ItemId, BookHandle)>, BookError> {
        let books = self.books.read();
        items
            .iter()
            .map(|&item_id| {
                books
                    .get(&item_id)
                    .cloned()
                    .map(|handle| (item_id, handle))
                    .ok_or(BookError::UnknownItem { item_id })
            })
            .collect()
    }

    /// Runs `f` with the books of `items` write-locked in ascending item order. With
    /// `journaled`, the books record what `f` changes and are rolled back if it fails;
    /// otherwise `f` must not mutate before it is certain to succeed.
    fn with_books<R>(
        &self,
        items: &BTreeSet<ItemId>,
        journaled: bool,
        f: impl FnOnce(&mut BookSet<'_>) -> Result<R, BookError>,
    ) -> Result<R, BookError> {
        let handles = self.handles(items)?;
        let mut guards: Vec<(ItemId, RwLockWriteGuard<'_, OrderBook>)> = handles
            .iter()
            .map(|(item_id, handle)| (*item_id, handle.write()))
            .collect();

        if journaled {
            for (_, guard) in guards.iter_mut() {
                guard.begin_batch();
            }
        }
        let result = {
            let mut set = BookSet {
                books: guards.iter_mut().map(|(id, guard)| (*id, &mut **guard)).collect(),
            };
            f(&mut set)
        };
        if journaled {
            for (_, guard) in guards.iter_mut() {
                if result.is_ok() {
                    guard.commit_batch();
                } else {
                    guard.rollback_batch();
                }
            }
        }
        result
    }
}

fn wrap(batched: bool, index: usize, error: BookError) -> BookError {
    if batched {
        BookError::in_batch(index, error)
    } else {
        error
    }
}

/// Attaches the index of the first request naming an unconfigured item.
fn locate_unknown_item(
    error: BookError,
    batched: bool,
    mut items: impl Iterator<Item = ItemId>,
) -> BookError {
    match error {
        BookError::UnknownItem { item_id } => match items.position(|id| id == item_id) {
            Some(index) => wrap(batched, index, error),
            None => error,
        },
        other => other,
    }
}
