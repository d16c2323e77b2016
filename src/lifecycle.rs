//! Order lifecycle on a single book: place, rest or drop, cancel, claim.
//!
//! Each operation validates, plans the match, decides where the residual goes and only
//! then commits, so a returned error always means the book is unchanged. An order id is
//! taken from the allocator only once the residual is certain to rest.

use crate::config::EngineConfig;
use crate::error::BookError;
use crate::execution::{CancelOutcome, MarketOutcome, PlaceOutcome, RestStatus};
use crate::order_book::{OrderBook, OrderRecord};
use crate::types::{
    AccountId, LimitOrderRequest, MarketOrderRequest, OrderId, OrderIdAllocator, Price, Quantity,
    QuoteAmount, Side, MAX_QUANTITY,
};

impl OrderBook {
    fn check_quantity(&self, quantity: Quantity) -> Result<(), BookError> {
        if quantity == 0 {
            return Err(BookError::ZeroQuantity { item_id: self.item_id() });
        }
        if quantity > MAX_QUANTITY {
            return Err(BookError::QuantityTooLarge {
                item_id: self.item_id(),
                quantity,
                max: MAX_QUANTITY,
            });
        }
        Ok(())
    }

    /// Quantity, price and tick checks for a limit order on this book.
    pub fn validate_limit(&self, request: &LimitOrderRequest) -> Result<(), BookError> {
        self.check_quantity(request.quantity)?;
        if request.price == 0 {
            return Err(BookError::ZeroPrice { item_id: self.item_id() });
        }
        let policy = self.policy();
        if !policy.is_tick_multiple(request.price) {
            return Err(BookError::PriceNotTickMultiple {
                item_id: self.item_id(),
                price: request.price,
                tick: policy.tick,
            });
        }
        Ok(())
    }

    /// Matches a limit order and rests what is left.
    ///
    /// A residual below the item's minimum resting quantity is dropped and reported as
    /// [`RestStatus::ResidualTooSmall`]. A residual whose price level is full rests at the
    /// nearest price with room, stepping one tick at a time away from the spread.
    pub fn place_limit(
        &mut self,
        maker: AccountId,
        request: &LimitOrderRequest,
        config: &EngineConfig,
        ids: &OrderIdAllocator,
    ) -> Result<PlaceOutcome, BookError> {
        self.validate_limit(request)?;
        let plan = self.plan_match(
            request.side,
            request.price,
            request.quantity,
            config.max_makers_per_match,
        )?;

        let residual = plan.remaining;
        let status = if residual == 0 {
            RestStatus::FullyMatched
        } else if residual < self.policy().min_rest() {
            RestStatus::ResidualTooSmall { quantity: residual }
        } else {
            let price = self.rest_price(request.side, request.price, config)?;
            let order_id = ids.next_id()?;
            RestStatus::Rested { order_id, price }
        };

        self.commit_match(&plan);
        if let RestStatus::Rested { order_id, price } = status {
            self.rest(maker, request.side, price, order_id, residual);
        }

        Ok(PlaceOutcome {
            item_id: self.item_id(),
            side: request.side,
            maker,
            price: request.price,
            quantity: request.quantity,
            fills: plan.fills,
            filled: plan.filled,
            quote: plan.quote,
            status,
        })
    }

    /// First price from `price` with spare capacity, stepping down for buys and up for
    /// sells. Gives up after `max_overflow_steps` steps or at the edge of the price range.
    fn rest_price(&self, side: Side, price: Price, config: &EngineConfig) -> Result<Price, BookError> {
        let tick = self.policy().tick;
        let resting = self.side(side);
        let exhausted = || BookError::OverflowExhausted {
            item_id: self.item_id(),
            side,
            price,
            steps: config.max_overflow_steps,
        };

        let mut candidate = price;
        let mut steps = 0;
        while resting.live_orders_at(candidate) >= config.max_orders_per_price {
            if steps == config.max_overflow_steps {
                return Err(exhausted());
            }
            candidate = match side {
                Side::Buy => candidate.checked_sub(tick).filter(|p| *p > 0),
                Side::Sell => candidate.checked_add(tick),
            }
            .ok_or_else(exhausted)?;
            steps += 1;
        }
        Ok(candidate)
    }

    fn rest(&mut self, maker: AccountId, side: Side, price: Price, order_id: OrderId, quantity: Quantity) {
        self.side_mut(side).append(price, order_id, quantity);
        let item_id = self.item_id();
        self.record_order(
            order_id,
            OrderRecord {
                maker,
                item_id,
                side,
                price,
            },
        );
    }

    /// Take-only order: fills completely within the cost bound or fails with no effect.
    pub fn place_market(
        &mut self,
        taker: AccountId,
        request: &MarketOrderRequest,
        config: &EngineConfig,
    ) -> Result<MarketOutcome, BookError> {
        self.check_quantity(request.quantity)?;
        let limit = match request.side {
            Side::Buy => Price::MAX,
            Side::Sell => 0,
        };
        let plan = self.plan_match(
            request.side,
            limit,
            request.quantity,
            config.max_makers_per_match,
        )?;
        if plan.remaining > 0 {
            return Err(BookError::InsufficientLiquidity {
                item_id: self.item_id(),
                side: request.side,
                requested: request.quantity,
                available: plan.filled,
            });
        }
        check_bound(self, request.side, plan.quote, request.total_cost_bound)?;

        self.commit_match(&plan);
        Ok(MarketOutcome {
            item_id: self.item_id(),
            side: request.side,
            taker,
            quantity: plan.filled,
            fills: plan.fills,
            quote: plan.quote,
        })
    }

    /// Removes a resting order located at (`side`, `price`). Only its maker may cancel it.
    pub fn cancel(
        &mut self,
        caller: AccountId,
        order_id: OrderId,
        side: Side,
        price: Price,
    ) -> Result<CancelOutcome, BookError> {
        let item_id = self.item_id();
        let not_found = || BookError::OrderNotFound {
            order_id,
            item_id,
            side,
            price,
        };
        let (segment, offset) = self
            .side(side)
            .level(price)
            .and_then(|(queue, head)| queue.find_index(head, order_id))
            .ok_or_else(not_found)?;
        let maker = self.order(order_id).map(|r| r.maker).ok_or_else(not_found)?;
        if maker != caller {
            return Err(BookError::NotOrderMaker { order_id, caller });
        }
        let removal = self
            .side_mut(side)
            .remove_at(price, segment, offset)
            .ok_or_else(not_found)?;
        Ok(CancelOutcome {
            order_id,
            maker,
            item_id,
            side,
            price,
            quantity: removal.entry.quantity,
        })
    }

    /// Pays out the quote owed on `order_ids`. Fails with no effect if any id is unknown,
    /// belongs to someone else, or nothing is owed in total.
    pub fn claim_quote(&mut self, caller: AccountId, order_ids: &[OrderId]) -> Result<QuoteAmount, BookError> {
        let owed = self.owed(caller, order_ids)?;
        if owed.quote == 0 {
            return Err(BookError::NothingToClaim);
        }
        Ok(self.take_quote(order_ids))
    }

    /// Pays out the units owed on `order_ids`; same rules as [`OrderBook::claim_quote`].
    pub fn claim_units(&mut self, caller: AccountId, order_ids: &[OrderId]) -> Result<u64, BookError> {
        let owed = self.owed(caller, order_ids)?;
        if owed.units == 0 {
            return Err(BookError::NothingToClaim);
        }
        Ok(self.take_units(order_ids))
    }
}

fn check_bound(book: &OrderBook, side: Side, quote: QuoteAmount, bound: QuoteAmount) -> Result<(), BookError> {
    match side {
        Side::Buy if quote > bound => Err(BookError::CostBoundExceeded {
            item_id: book.item_id(),
            cost: quote,
            bound,
        }),
        Side::Sell if quote < bound => Err(BookError::ProceedsBelowBound {
            item_id: book.item_id(),
            proceeds: quote,
            bound,
        }),
        _ => Ok(()),
    }
}
