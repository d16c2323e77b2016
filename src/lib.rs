//! # Item order book
//!
//! Limit order book exchange for discrete asset units traded per item against a
//! fungible quote asset. Each item has its own book: a red-black [`PriceTree`] per side
//! indexes live prices, and a segmented [`PriceLevelQueue`] per price keeps orders in
//! strict arrival order. Matching is price-time priority.
//!
//! ## Entry point
//!
//! Use [`Exchange`]: create with [`Exchange::new`], configure items with
//! [`Exchange::set_token_policy`], then [`Exchange::place_limit_orders`],
//! [`Exchange::place_market_order`], [`Exchange::cancel_orders`] and the claim operations.
//!
//! ## Example
//!
//! ```rust
//! use item_lob::{AccountId, EngineConfig, Exchange, ItemId, LimitOrderRequest, OrderId, Side};
//!
//! let exchange = Exchange::new(EngineConfig::default()).unwrap();
//! exchange.set_token_policy(AccountId(0), ItemId(1), 1, 1).unwrap();
//!
//! let sell = LimitOrderRequest { side: Side::Sell, item_id: ItemId(1), price: 100, quantity: 10 };
//! exchange.place_limit_orders(AccountId(1), &[sell]).unwrap();
//!
//! let buy = LimitOrderRequest { side: Side::Buy, item_id: ItemId(1), price: 100, quantity: 4 };
//! let outcomes = exchange.place_limit_orders(AccountId(2), &[buy]).unwrap();
//! assert_eq!(outcomes[0].filled, 4);
//!
//! let receipt = exchange.claim(AccountId(1), &[OrderId(1)]).unwrap();
//! assert_eq!(receipt.net, 400);
//! ```
//!
//! ## Lower-level API
//!
//! [`OrderBook`] and [`match_order`] work on a single item without locking, events or
//! settlement.

pub mod api;
pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod fees;
pub mod lifecycle;
pub mod market_data_gen;
pub mod matching;
pub mod order_book;
pub mod price_level;
pub mod price_tree;
pub mod settlement;
pub mod types;

pub use config::EngineConfig;
pub use engine::Exchange;
pub use error::BookError;
pub use events::{BookEvent, EventSink, InMemoryEventSink, LogEventSink};
pub use execution::{
    CancelOutcome, ClaimReceipt, Fill, MarketOutcome, PlaceOutcome, RestStatus, UnitClaimReceipt,
};
pub use fees::{FeeSchedule, FeeSplit, FlatFeeSchedule, NoFees};
pub use market_data_gen::{replay_into_exchange, GeneratedOrder, Generator, GeneratorConfig, ReplaySummary};
pub use matching::{match_order, MatchPlan};
pub use order_book::{ClaimableBalance, DepthLevel, OrderBook, OrderRecord};
pub use price_level::{LevelHead, PriceLevelQueue, SEGMENT_SIZE};
pub use price_tree::{NodeState, PriceTree};
pub use settlement::{Asset, InMemorySettlementSink, SettlementSink, TransferIntent};
pub use types::{
    AccountId, ItemId, LimitOrderRequest, MarketOrderRequest, OrderId, OrderIdAllocator,
    OrderLocator, Price, Quantity, QuoteAmount, RestingOrderView, Side, TokenPolicy,
    MAX_ORDER_ID, MAX_QUANTITY,
};
