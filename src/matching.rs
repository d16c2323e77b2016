//! Price-time priority matching.
//!
//! [`OrderBook::plan_match`] walks the opposite side from its best price inward and
//! records what it would consume, without touching the book. [`OrderBook::commit_match`]
//! applies a plan. Every rejection a caller can raise after matching (maker cap, take-only
//! bounds, overflow, id exhaustion) therefore happens before anything is mutated.
//!
//! [`match_order`] does both in one step.

use std::collections::HashSet;

use crate::error::BookError;
use crate::execution::Fill;
use crate::order_book::OrderBook;
use crate::price_level::Consumption;
use crate::types::{notional, Price, Quantity, QuoteAmount, Side};

/// Consumption of one price level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelTake {
    pub price: Price,
    pub consumption: Consumption,
}

/// What a taker would consume, best price first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchPlan {
    pub taker_side: Side,
    pub fills: Vec<Fill>,
    pub filled: Quantity,
    pub remaining: Quantity,
    /// Quote exchanged across all fills.
    pub quote: QuoteAmount,
    pub levels: Vec<LevelTake>,
}

impl MatchPlan {
    pub fn makers(&self) -> usize {
        self.fills.iter().map(|f| f.maker).collect::<HashSet<_>>().len()
    }
}

impl OrderBook {
    /// Plans a taker of `side` consuming up to `quantity` at prices no worse than `limit`.
    ///
    /// Fails with `MatchCapExceeded` if the fills would span more than `max_makers`
    /// distinct makers.
    pub fn plan_match(
        &self,
        side: Side,
        limit: Price,
        quantity: Quantity,
        max_makers: usize,
    ) -> Result<MatchPlan, BookError> {
        let resting = self.side(side.opposite());
        let mut plan = MatchPlan {
            taker_side: side,
            fills: Vec::new(),
            filled: 0,
            remaining: quantity,
            quote: 0,
            levels: Vec::new(),
        };
        let mut makers = HashSet::new();
        let mut next = resting.best();

        while plan.remaining > 0 {
            let Some(price) = next else { break };
            let crosses = match side {
                Side::Buy => price <= limit,
                Side::Sell => price >= limit,
            };
            if !crosses {
                break;
            }
            let Some((queue, head)) = resting.level(price) else {
                break;
            };
            let consumption = queue.consume_from(head, plan.remaining);
            for level_fill in &consumption.fills {
                let maker = self
                    .order(level_fill.order_id)
                    .map(|record| record.maker)
                    .ok_or(BookError::UnknownOrder {
                        order_id: level_fill.order_id,
                    })?;
                makers.insert(maker);
                if makers.len() > max_makers {
                    return Err(BookError::MatchCapExceeded {
                        item_id: self.item_id(),
                        max_makers,
                    });
                }
                plan.fills.push(Fill {
                    order_id: level_fill.order_id,
                    maker,
                    price,
                    quantity: level_fill.quantity,
                    fully_filled: level_fill.fully_filled,
                });
                plan.quote += notional(price, level_fill.quantity);
            }
            plan.filled += consumption.consumed;
            plan.remaining -= consumption.consumed;
            plan.levels.push(LevelTake { price, consumption });
            next = resting.next_worse(price);
        }
        Ok(plan)
    }

    /// Applies a plan produced by [`OrderBook::plan_match`] on this book, unchanged since.
    /// Makers of resting sells accrue quote; makers of resting buys accrue units.
    pub fn commit_match(&mut self, plan: &MatchPlan) {
        let maker_side = plan.taker_side.opposite();
        for take in &plan.levels {
            self.side_mut(maker_side)
                .apply_consumption(take.price, &take.consumption);
        }
        for fill in &plan.fills {
            let balance = self.claim_entry(fill.order_id);
            match maker_side {
                Side::Sell => balance.quote += notional(fill.price, fill.quantity),
                Side::Buy => balance.units += u64::from(fill.quantity),
            }
        }
    }
}

/// Matches a taker against `book` and commits the result.
pub fn match_order(
    book: &mut OrderBook,
    side: Side,
    limit: Price,
    quantity: Quantity,
    max_makers: usize,
) -> Result<MatchPlan, BookError> {
    let plan = book.plan_match(side, limit, quantity, max_makers)?;
    book.commit_match(&plan);
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_book::OrderRecord;
    use crate::types::{AccountId, ItemId, OrderId, TokenPolicy};

    fn book() -> OrderBook {
        OrderBook::new(ItemId(1), TokenPolicy { tick: 1, min_rest_quantity: 1 })
    }

    fn rest(book: &mut OrderBook, id: u64, side: Side, price: Price, qty: Quantity, maker: u64) {
        book.side_mut(side).append(price, OrderId(id), qty);
        book.orders.insert(
            OrderId(id),
            OrderRecord { maker: AccountId(maker), item_id: ItemId(1), side, price },
        );
    }

    #[test]
    fn buy_walks_asks_lowest_first_within_limit() {
        let mut book = book();
        rest(&mut book, 1, Side::Sell, 102, 5, 1);
        rest(&mut book, 2, Side::Sell, 100, 5, 2);
        rest(&mut book, 3, Side::Sell, 105, 5, 3);

        let plan = match_order(&mut book, Side::Buy, 102, 12, 10).unwrap();
        let prices: Vec<_> = plan.fills.iter().map(|f| (f.order_id.0, f.price, f.quantity)).collect();
        assert_eq!(prices, vec![(2, 100, 5), (1, 102, 5)]);
        assert_eq!(plan.filled, 10);
        assert_eq!(plan.remaining, 2);
        assert_eq!(plan.quote, 500 + 510);
        assert_eq!(book.best_ask(), Some(105));
        assert_eq!(book.claimable(OrderId(2)).quote, 500);
    }

    #[test]
    fn sell_walks_bids_highest_first() {
        let mut book = book();
        rest(&mut book, 1, Side::Buy, 90, 5, 1);
        rest(&mut book, 2, Side::Buy, 95, 5, 2);

        let plan = match_order(&mut book, Side::Sell, 91, 7, 10).unwrap();
        assert_eq!(plan.fills.len(), 1);
        assert_eq!(plan.fills[0].order_id, OrderId(2));
        assert_eq!(plan.remaining, 2);
        assert_eq!(book.claimable(OrderId(2)).units, 5);
        assert_eq!(book.best_bid(), Some(90));
    }

    #[test]
    fn plan_leaves_book_untouched() {
        let mut book = book();
        rest(&mut book, 1, Side::Sell, 100, 5, 1);
        let plan = book.plan_match(Side::Buy, 100, 3, 10).unwrap();
        assert_eq!(plan.filled, 3);
        assert_eq!(book.open_interest(Side::Sell, 100), 5);
        book.commit_match(&plan);
        assert_eq!(book.open_interest(Side::Sell, 100), 2);
    }

    #[test]
    fn maker_cap_counts_distinct_makers() {
        let mut book = book();
        for id in 1..=4 {
            // two makers, two orders each
            rest(&mut book, id, Side::Sell, 100, 1, id % 2);
        }
        rest(&mut book, 5, Side::Sell, 100, 1, 9);

        let plan = book.plan_match(Side::Buy, 100, 4, 2).unwrap();
        assert_eq!(plan.makers(), 2);

        let err = book.plan_match(Side::Buy, 100, 5, 2).unwrap_err();
        assert_eq!(err, BookError::MatchCapExceeded { item_id: ItemId(1), max_makers: 2 });
        assert_eq!(book.open_interest(Side::Sell, 100), 5);
    }

    #[test]
    fn drained_level_leaves_tree_but_keeps_counters() {
        let mut book = book();
        for id in 1..=5 {
            rest(&mut book, id, Side::Sell, 100, 1, 1);
        }
        match_order(&mut book, Side::Buy, 100, 5, 10).unwrap();
        assert!(!book.price_level_exists(Side::Sell, 100));
        let head = book.side(Side::Sell).tree().retained_head(100).unwrap();
        assert_eq!(head.tombstone_offset, 2);

        rest(&mut book, 6, Side::Sell, 100, 3, 1);
        assert!(book.price_level_exists(Side::Sell, 100));
        assert_eq!(book.orders_at_price(Side::Sell, 100).len(), 1);
        assert_eq!(book.open_interest(Side::Sell, 100), 3);
    }

    #[test]
    fn market_limits_take_everything() {
        let mut book = book();
        rest(&mut book, 1, Side::Buy, 1, 2, 1);
        rest(&mut book, 2, Side::Buy, u64::MAX, 2, 1);
        let plan = book.plan_match(Side::Sell, 0, 10, 10).unwrap();
        assert_eq!(plan.filled, 4);
        assert_eq!(plan.quote, notional(u64::MAX, 2) + 2);
    }
}
