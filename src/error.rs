//! Error taxonomy for the order book.
//!
//! Every rejection carries enough structure (item, order, price) for a caller to
//! display or retry it. Nothing is swallowed and nothing is retried internally.

use thiserror::Error;

use crate::types::{AccountId, ItemId, OrderId, Price, Quantity, QuoteAmount, Side};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookError {
    // Validation
    #[error("item {item_id}: quantity must be non-zero")]
    ZeroQuantity { item_id: ItemId },

    #[error("item {item_id}: quantity {quantity} exceeds maximum {max}")]
    QuantityTooLarge {
        item_id: ItemId,
        quantity: Quantity,
        max: Quantity,
    },

    #[error("item {item_id}: price must be non-zero")]
    ZeroPrice { item_id: ItemId },

    #[error("item {item_id}: price {price} is not a multiple of tick {tick}")]
    PriceNotTickMultiple {
        item_id: ItemId,
        price: Price,
        tick: Price,
    },

    #[error("item {item_id} is not configured")]
    UnknownItem { item_id: ItemId },

    #[error("item {item_id}: tick must be non-zero")]
    InvalidTick { item_id: ItemId },

    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    // Not found
    #[error("order {order_id} not found at {side} {price} (item {item_id})")]
    OrderNotFound {
        order_id: OrderId,
        item_id: ItemId,
        side: Side,
        price: Price,
    },

    #[error("order {order_id} is unknown")]
    UnknownOrder { order_id: OrderId },

    #[error("account {caller} is not the maker of order {order_id}")]
    NotOrderMaker { order_id: OrderId, caller: AccountId },

    #[error("{ids} order ids but {locators} locators")]
    LocatorCountMismatch { ids: usize, locators: usize },

    // Capacity
    #[error("item {item_id}: match would fill more than {max_makers} makers")]
    MatchCapExceeded { item_id: ItemId, max_makers: usize },

    #[error("item {item_id}: no {side} price with spare capacity within {steps} ticks of {price}")]
    OverflowExhausted {
        item_id: ItemId,
        side: Side,
        price: Price,
        steps: u32,
    },

    #[error("order id space exhausted")]
    OrderIdsExhausted,

    // Take-only orders
    #[error("item {item_id}: {side} for {requested} can only fill {available}")]
    InsufficientLiquidity {
        item_id: ItemId,
        side: Side,
        requested: Quantity,
        available: Quantity,
    },

    #[error("item {item_id}: cost {cost} exceeds bound {bound}")]
    CostBoundExceeded {
        item_id: ItemId,
        cost: QuoteAmount,
        bound: QuoteAmount,
    },

    #[error("item {item_id}: proceeds {proceeds} below bound {bound}")]
    ProceedsBelowBound {
        item_id: ItemId,
        proceeds: QuoteAmount,
        bound: QuoteAmount,
    },

    // Configuration
    #[error("item {item_id}: tick {current} is in use and cannot change to {requested}")]
    TickLocked {
        item_id: ItemId,
        current: Price,
        requested: Price,
    },

    // Claims
    #[error("nothing to claim")]
    NothingToClaim,

    #[error("request {index} rejected: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<BookError>,
    },
}

impl BookError {
    /// Wraps an error with the position of the failing request in its batch.
    pub fn in_batch(index: usize, source: BookError) -> Self {
        BookError::Batch {
            index,
            source: Box::new(source),
        }
    }

    /// The underlying error, looking through batch wrappers.
    pub fn root(&self) -> &BookError {
        match self {
            BookError::Batch { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            BookError::OrderNotFound { .. }
                | BookError::UnknownOrder { .. }
                | BookError::UnknownItem { .. }
                | BookError::NotOrderMaker { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self.root(),
            BookError::ZeroQuantity { .. }
                | BookError::QuantityTooLarge { .. }
                | BookError::ZeroPrice { .. }
                | BookError::PriceNotTickMultiple { .. }
                | BookError::UnknownItem { .. }
                | BookError::InvalidTick { .. }
                | BookError::InvalidConfig { .. }
                | BookError::LocatorCountMismatch { .. }
        )
    }
}
