//! Core identifiers, request messages and per-item policy.
//!
//! All identifiers are newtype wrappers. Prices are integer quote-asset base units,
//! quantities are whole asset units bounded by [`MAX_QUANTITY`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::BookError;

/// Price in quote-asset base units. Every resting price is a multiple of its item's tick.
pub type Price = u64;

/// Whole asset units. Bounded by [`MAX_QUANTITY`].
pub type Quantity = u32;

/// Quote-asset amount (notional, balances, fees).
pub type QuoteAmount = u128;

/// Largest quantity a single order may carry (24-bit range).
pub const MAX_QUANTITY: Quantity = (1 << 24) - 1;

/// Largest order id the allocator hands out (40-bit range).
pub const MAX_ORDER_ID: u64 = (1 << 40) - 1;

/// Unique order identifier. Assigned in strictly increasing order when a residual rests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

/// Tradable item identifier; one order book per item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub u64);

/// Account identifier (maker or taker).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side an incoming order of this side crosses against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Per-item trading policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPolicy {
    /// Minimum price increment. Never zero once set.
    pub tick: Price,
    /// Residuals below this are not left resting.
    pub min_rest_quantity: Quantity,
}

impl TokenPolicy {
    pub fn is_tick_multiple(&self, price: Price) -> bool {
        self.tick != 0 && price % self.tick == 0
    }

    /// Effective minimum: a zero setting still never rests an empty residual.
    pub fn min_rest(&self) -> Quantity {
        self.min_rest_quantity.max(1)
    }
}

/// Limit order request: match up to `price`, rest the residual.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderRequest {
    pub side: Side,
    pub item_id: ItemId,
    pub price: Price,
    pub quantity: Quantity,
}

/// Take-only request. For a buy, `total_cost_bound` is the most quote the taker will pay;
/// for a sell, the least quote the taker will accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOrderRequest {
    pub side: Side,
    pub item_id: ItemId,
    pub quantity: Quantity,
    #[serde(with = "amount_str")]
    pub total_cost_bound: QuoteAmount,
}

/// Where a resting order lives: the cancel path looks it up by (item, side, price).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLocator {
    pub side: Side,
    pub item_id: ItemId,
    pub price: Price,
}

/// One resting order as reported by price-level queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestingOrderView {
    pub maker: AccountId,
    pub quantity: Quantity,
    pub order_id: OrderId,
}

/// Quote notional of `quantity` units at `price`. Cannot overflow: 64 + 24 bits.
pub fn notional(price: Price, quantity: Quantity) -> QuoteAmount {
    price as QuoteAmount * quantity as QuoteAmount
}

/// Hands out order ids in strictly increasing order, starting at 1.
#[derive(Debug)]
pub struct OrderIdAllocator {
    next: AtomicU64,
}

impl OrderIdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Next id, or `OrderIdsExhausted` once the 40-bit range is used up.
    pub fn next_id(&self) -> Result<OrderId, BookError> {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        if id > MAX_ORDER_ID {
            return Err(BookError::OrderIdsExhausted);
        }
        Ok(OrderId(id))
    }

    /// The id the next successful allocation would return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for OrderIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Quote amounts travel as decimal strings so JSON consumers never lose precision.
pub(crate) mod amount_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(amount: &u128, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(d)?;
        raw.trim().parse().map_err(D::Error::custom)
    }
}
