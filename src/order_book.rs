//! Single-item order book: bids and asks, price-time priority.
//!
//! Each side is a [`PriceTree`] over the prices that hold orders plus one
//! [`PriceLevelQueue`] per price. Best bid is the highest live bid price, best ask the
//! lowest live ask price. The book also keeps the record of every order that ever
//! rested here and the balances its makers can claim.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::BookError;
use crate::price_level::{Consumption, LevelEntry, LevelHead, LevelSnapshot, PriceLevelQueue, Removal};
use crate::price_tree::PriceTree;
use crate::types::{
    amount_str, AccountId, ItemId, OrderId, Price, QuoteAmount, RestingOrderView, Side,
    TokenPolicy,
};

/// Who placed an order and where it rested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub maker: AccountId,
    pub item_id: ItemId,
    pub side: Side,
    pub price: Price,
}

/// Proceeds owed to an order's maker. Resting sells accrue quote, resting buys accrue units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimableBalance {
    #[serde(with = "amount_str")]
    pub quote: QuoteAmount,
    pub units: u64,
}

/// Aggregated view of one price level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: u64,
    pub orders: usize,
}

/// A level as it was before a batch first touched it.
#[derive(Clone, Debug)]
struct LevelUndo {
    /// Counters and liveness of the tree node; `None` if the price was unallocated.
    node: Option<(LevelHead, bool)>,
    queue: Option<LevelSnapshot>,
}

#[derive(Clone, Debug, Default)]
struct SideUndo {
    allocated: usize,
    levels: HashMap<Price, LevelUndo>,
}

/// One side of a book.
#[derive(Clone, Debug)]
pub struct BookSide {
    side: Side,
    tree: PriceTree,
    levels: HashMap<Price, PriceLevelQueue>,
    undo: Option<SideUndo>,
}

impl BookSide {
    fn new(side: Side) -> Self {
        Self {
            side,
            tree: PriceTree::new(),
            levels: HashMap::new(),
            undo: None,
        }
    }

    pub fn tree(&self) -> &PriceTree {
        &self.tree
    }

    /// Highest bid or lowest ask.
    pub fn best(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.tree.last(),
            Side::Sell => self.tree.first(),
        }
    }

    /// Next price after `price` moving away from the best.
    pub fn next_worse(&self, price: Price) -> Option<Price> {
        match self.side {
            Side::Buy => self.tree.next_below(price),
            Side::Sell => self.tree.next_above(price),
        }
    }

    /// Storage and head of a live level.
    pub fn level(&self, price: Price) -> Option<(&PriceLevelQueue, LevelHead)> {
        let node = self.tree.get_node(price)?;
        let queue = self.levels.get(&price)?;
        Some((queue, node.head))
    }

    pub fn live_orders_at(&self, price: Price) -> usize {
        self.level(price).map_or(0, |(queue, _)| queue.live_orders())
    }

    /// Records the level at `price` the first time an open batch touches it.
    fn touch(&mut self, price: Price) {
        let Some(undo) = self.undo.as_mut() else {
            return;
        };
        let tree = &self.tree;
        let levels = &self.levels;
        undo.levels.entry(price).or_insert_with(|| {
            let head = tree.retained_head(price);
            LevelUndo {
                node: head.map(|head| (head, tree.is_live(price))),
                queue: levels
                    .get(&price)
                    .map(|queue| queue.snapshot(head.unwrap_or_default())),
            }
        });
    }

    fn begin(&mut self) {
        self.undo = Some(SideUndo {
            allocated: self.tree.allocated(),
            levels: HashMap::new(),
        });
    }

    fn commit(&mut self) {
        self.undo = None;
    }

    fn rollback(&mut self) {
        let Some(undo) = self.undo.take() else {
            return;
        };
        for (price, level) in undo.levels {
            match level.queue {
                Some(snapshot) => {
                    if let Some(queue) = self.levels.get_mut(&price) {
                        queue.restore(snapshot);
                    }
                }
                None => {
                    self.levels.remove(&price);
                }
            }
            if let Some((head, live)) = level.node {
                self.tree.restore(price, head, live);
            }
        }
        self.tree.truncate(undo.allocated);
    }

    /// Appends at the tail of `price`, linking the price into the tree if needed.
    pub(crate) fn append(&mut self, price: Price, order_id: OrderId, quantity: u32) {
        self.touch(price);
        self.tree.insert(price);
        let head = self.tree.retained_head(price).unwrap_or_default();
        self.levels
            .entry(price)
            .or_default()
            .append(head, order_id, quantity);
    }

    /// Commits a planned consumption of `price`. Counters are folded into the node
    /// before an emptied price leaves the tree, so they survive the removal.
    pub(crate) fn apply_consumption(&mut self, price: Price, consumption: &Consumption) {
        self.touch(price);
        if let Some(queue) = self.levels.get_mut(&price) {
            queue.apply(consumption);
        }
        self.tree.edit(
            price,
            consumption.segments_drained,
            consumption.head.in_segment_deleted,
        );
        if consumption.emptied {
            self.tree.remove(price);
        }
    }

    pub(crate) fn remove_at(&mut self, price: Price, segment: usize, offset: usize) -> Option<Removal> {
        let node = self.tree.get_node(price)?;
        self.touch(price);
        let removal = self.levels.get_mut(&price)?.remove_at(node.head, segment, offset)?;
        self.tree.edit(
            price,
            removal.segments_dropped,
            removal.head.in_segment_deleted,
        );
        if removal.emptied {
            self.tree.remove(price);
        }
        Some(removal)
    }

    fn entries_at(&self, price: Price) -> Vec<LevelEntry> {
        self.level(price)
            .map(|(queue, head)| queue.entries(head).collect())
            .unwrap_or_default()
    }
}

/// Claims and order records as they were before an open batch changed them.
#[derive(Clone, Debug, Default)]
struct BookUndo {
    claims: HashMap<OrderId, Option<ClaimableBalance>>,
    rested: Vec<OrderId>,
}

/// Single-item order book.
#[derive(Clone, Debug)]
pub struct OrderBook {
    item_id: ItemId,
    policy: TokenPolicy,
    bids: BookSide,
    asks: BookSide,
    pub(crate) orders: HashMap<OrderId, OrderRecord>,
    pub(crate) claims: HashMap<OrderId, ClaimableBalance>,
    undo: Option<BookUndo>,
}

impl OrderBook {
    pub fn new(item_id: ItemId, policy: TokenPolicy) -> Self {
        Self {
            item_id,
            policy,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            orders: HashMap::new(),
            claims: HashMap::new(),
            undo: None,
        }
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Replaces the policy. The tick is frozen once any order has rested on this book.
    pub fn update_policy(&mut self, policy: TokenPolicy) -> Result<(), BookError> {
        if policy.tick == 0 {
            return Err(BookError::InvalidTick {
                item_id: self.item_id,
            });
        }
        if policy.tick != self.policy.tick && self.in_use() {
            return Err(BookError::TickLocked {
                item_id: self.item_id,
                current: self.policy.tick,
                requested: policy.tick,
            });
        }
        self.policy = policy;
        Ok(())
    }

    /// True once any order has ever rested on either side.
    pub fn in_use(&self) -> bool {
        self.bids.tree.allocated() > 0 || self.asks.tree.allocated() > 0
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Best bid price (None if empty).
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best()
    }

    /// Best ask price (None if empty).
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best()
    }

    pub fn has_resting_orders(&self) -> bool {
        !self.bids.tree.is_empty() || !self.asks.tree.is_empty()
    }

    pub fn price_level_exists(&self, side: Side, price: Price) -> bool {
        self.side(side).tree.is_live(price)
    }

    /// Resting orders at one price, in FIFO order.
    pub fn orders_at_price(&self, side: Side, price: Price) -> Vec<RestingOrderView> {
        self.side(side)
            .entries_at(price)
            .into_iter()
            .filter_map(|entry| {
                let record = self.orders.get(&entry.order_id)?;
                Some(RestingOrderView {
                    maker: record.maker,
                    quantity: entry.quantity,
                    order_id: entry.order_id,
                })
            })
            .collect()
    }

    /// Total resting quantity at one price.
    pub fn open_interest(&self, side: Side, price: Price) -> u64 {
        self.side(side)
            .level(price)
            .map_or(0, |(queue, head)| queue.open_interest(head))
    }

    /// Up to `levels` price levels, best first.
    pub fn depth(&self, side: Side, levels: usize) -> Vec<DepthLevel> {
        let book_side = self.side(side);
        let prices = match side {
            Side::Buy => book_side.tree.descending(),
            Side::Sell => book_side.tree.ascending(),
        };
        prices
            .take(levels)
            .filter_map(|price| {
                let (queue, head) = book_side.level(price)?;
                Some(DepthLevel {
                    price,
                    quantity: queue.open_interest(head),
                    orders: queue.live_orders(),
                })
            })
            .collect()
    }

    pub fn order(&self, order_id: OrderId) -> Option<&OrderRecord> {
        self.orders.get(&order_id)
    }

    pub fn claimable(&self, order_id: OrderId) -> ClaimableBalance {
        self.claims.get(&order_id).copied().unwrap_or_default()
    }

    /// Checks `caller` made every order in `order_ids` and sums what they are owed.
    /// Duplicate ids count once.
    pub(crate) fn owed(
        &self,
        caller: AccountId,
        order_ids: &[OrderId],
    ) -> Result<ClaimableBalance, BookError> {
        let mut seen = HashSet::new();
        let mut total = ClaimableBalance::default();
        for &order_id in order_ids {
            if !seen.insert(order_id) {
                continue;
            }
            let record = self
                .orders
                .get(&order_id)
                .ok_or(BookError::UnknownOrder { order_id })?;
            if record.maker != caller {
                return Err(BookError::NotOrderMaker { order_id, caller });
            }
            let balance = self.claimable(order_id);
            total.quote += balance.quote;
            total.units += balance.units;
        }
        Ok(total)
    }

    /// Zeroes the quote owed on `order_ids` and returns the sum.
    pub(crate) fn take_quote(&mut self, order_ids: &[OrderId]) -> QuoteAmount {
        let mut total = 0;
        for &order_id in order_ids {
            self.note_claim(order_id);
            if let Some(balance) = self.claims.get_mut(&order_id) {
                total += std::mem::take(&mut balance.quote);
            }
        }
        total
    }

    /// Zeroes the units owed on `order_ids` and returns the sum.
    pub(crate) fn take_units(&mut self, order_ids: &[OrderId]) -> u64 {
        let mut total = 0;
        for &order_id in order_ids {
            self.note_claim(order_id);
            if let Some(balance) = self.claims.get_mut(&order_id) {
                total += std::mem::take(&mut balance.units);
            }
        }
        total
    }

    /// Claimable balance of `order_id` for writing, created empty if absent.
    pub(crate) fn claim_entry(&mut self, order_id: OrderId) -> &mut ClaimableBalance {
        self.note_claim(order_id);
        self.claims.entry(order_id).or_default()
    }

    /// Records who rested `order_id` and where.
    pub(crate) fn record_order(&mut self, order_id: OrderId, record: OrderRecord) {
        if let Some(undo) = self.undo.as_mut() {
            undo.rested.push(order_id);
        }
        self.orders.insert(order_id, record);
    }

    fn note_claim(&mut self, order_id: OrderId) {
        if let Some(undo) = self.undo.as_mut() {
            let before = self.claims.get(&order_id).copied();
            undo.claims.entry(order_id).or_insert(before);
        }
    }

    /// Starts recording changes so that [`OrderBook::rollback_batch`] can undo them.
    /// Only what is touched is recorded: a level is copied from its head on the first
    /// change, claims and order records one entry at a time.
    pub(crate) fn begin_batch(&mut self) {
        self.bids.begin();
        self.asks.begin();
        self.undo = Some(BookUndo::default());
    }

    /// Keeps every change since [`OrderBook::begin_batch`].
    pub(crate) fn commit_batch(&mut self) {
        self.bids.commit();
        self.asks.commit();
        self.undo = None;
    }

    /// Puts the book back as it was at [`OrderBook::begin_batch`]. Tree nodes allocated
    /// since are freed, so an aborted batch never locks the tick.
    pub(crate) fn rollback_batch(&mut self) {
        self.bids.rollback();
        self.asks.rollback();
        let Some(undo) = self.undo.take() else {
            return;
        };
        for order_id in undo.rested {
            self.orders.remove(&order_id);
        }
        for (order_id, before) in undo.claims {
            match before {
                Some(balance) => {
                    self.claims.insert(order_id, balance);
                }
                None => {
                    self.claims.remove(&order_id);
                }
            }
        }
    }
}
