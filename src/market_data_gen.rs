//! Synthetic order flow.
//!
//! Deterministic, configurable stream of limit and take-only orders for replay tests,
//! demos and benchmarks. Same seed, same sequence of orders.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::Exchange;
use crate::error::BookError;
use crate::types::{
    AccountId, ItemId, LimitOrderRequest, MarketOrderRequest, Price, Quantity, QuoteAmount, Side,
};

/// Configuration for the synthetic order generator.
/// All ranges are inclusive. Same config + seed produces the same stream.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// RNG seed. Same seed, same order stream.
    pub seed: u64,
    /// Item for all generated orders.
    pub item_id: ItemId,
    /// Number of orders produced by [`Generator::all_orders`].
    pub num_orders: usize,
    /// Probability of Buy (0.0..=1.0). Sell otherwise.
    pub buy_ratio: f64,
    /// Probability of a limit order (0.0..=1.0). Take-only otherwise.
    pub limit_ratio: f64,
    /// Price tick; generated prices are `ticks * tick`.
    pub tick: Price,
    pub price_min_ticks: u64,
    pub price_max_ticks: u64,
    pub quantity_min: Quantity,
    pub quantity_max: Quantity,
    /// Number of distinct accounts (1..=num_accounts).
    pub num_accounts: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            item_id: ItemId(1),
            num_orders: 1000,
            buy_ratio: 0.5,
            limit_ratio: 0.9,
            tick: 1,
            price_min_ticks: 95,
            price_max_ticks: 105,
            quantity_min: 1,
            quantity_max: 100,
            num_accounts: 5,
        }
    }
}

/// One generated request and the account sending it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratedOrder {
    Limit {
        maker: AccountId,
        request: LimitOrderRequest,
    },
    Market {
        taker: AccountId,
        request: MarketOrderRequest,
    },
}

/// Deterministic order stream. Create with [`Generator::new`].
pub struct Generator {
    rng: StdRng,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { rng, config }
    }

    pub fn next_order(&mut self) -> GeneratedOrder {
        let config = &self.config;
        let side = if self.rng.gen::<f64>() < config.buy_ratio {
            Side::Buy
        } else {
            Side::Sell
        };
        let is_limit = self.rng.gen::<f64>() < config.limit_ratio;
        let quantity = self
            .rng
            .gen_range(config.quantity_min.max(1)..=config.quantity_max.max(1));
        let ticks = self
            .rng
            .gen_range(config.price_min_ticks.max(1)..=config.price_max_ticks.max(1));
        let account = AccountId(self.rng.gen_range(1..=config.num_accounts.max(1)));

        if is_limit {
            GeneratedOrder::Limit {
                maker: account,
                request: LimitOrderRequest {
                    side,
                    item_id: config.item_id,
                    price: ticks * config.tick,
                    quantity,
                },
            }
        } else {
            // Buys accept anything up to the top of the price band; sells accept any proceeds.
            let total_cost_bound = match side {
                Side::Buy => {
                    QuoteAmount::from(config.price_max_ticks * config.tick) * QuoteAmount::from(quantity)
                }
                Side::Sell => 0,
            };
            GeneratedOrder::Market {
                taker: account,
                request: MarketOrderRequest {
                    side,
                    item_id: config.item_id,
                    quantity,
                    total_cost_bound,
                },
            }
        }
    }

    pub fn take_orders(&mut self, n: usize) -> Vec<GeneratedOrder> {
        (0..n).map(|_| self.next_order()).collect()
    }

    /// The full stream as defined by `config.num_orders`.
    pub fn all_orders(&mut self) -> Vec<GeneratedOrder> {
        self.take_orders(self.config.num_orders)
    }
}

/// Totals from a replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub fills: usize,
    pub rested: usize,
    /// Residuals dropped for being below the minimum resting quantity.
    pub dropped: usize,
    /// Take-only orders the book could not fill within their bound.
    pub rejected: usize,
}

/// Replays orders into the exchange one request at a time. Take-only orders that cannot be
/// filled are counted, any other error stops the replay.
pub fn replay_into_exchange(
    exchange: &Exchange,
    orders: impl IntoIterator<Item = GeneratedOrder>,
) -> Result<ReplaySummary, BookError> {
    let mut summary = ReplaySummary::default();
    for order in orders {
        match order {
            GeneratedOrder::Limit { maker, request } => {
                for outcome in exchange.place_limit_orders(maker, &[request])? {
                    summary.fills += outcome.fills.len();
                    if outcome.order_id().is_some() {
                        summary.rested += 1;
                    } else if outcome.filled < outcome.quantity {
                        summary.dropped += 1;
                    }
                }
            }
            GeneratedOrder::Market { taker, request } => {
                match exchange.place_market_order(taker, &request) {
                    Ok(outcome) => summary.fills += outcome.fills.len(),
                    Err(
                        BookError::InsufficientLiquidity { .. }
                        | BookError::CostBoundExceeded { .. }
                        | BookError::ProceedsBelowBound { .. },
                    ) => summary.rejected += 1,
                    Err(e) => return Err(e),
                }
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn same_seed_same_stream() {
        let c = GeneratorConfig {
            seed: 42,
            num_orders: 10,
            ..Default::default()
        };
        let orders1 = Generator::new(c.clone()).all_orders();
        let orders2 = Generator::new(c).all_orders();
        assert_eq!(orders1.len(), 10);
        assert_eq!(orders1, orders2);
    }

    #[test]
    fn different_seed_different_stream() {
        let o1 = Generator::new(GeneratorConfig { seed: 1, num_orders: 5, ..Default::default() }).all_orders();
        let o2 = Generator::new(GeneratorConfig { seed: 2, num_orders: 5, ..Default::default() }).all_orders();
        assert_ne!(o1, o2, "different seeds should produce different order content");
    }

    #[test]
    fn prices_are_tick_multiples_in_band() {
        let config = GeneratorConfig { seed: 9, tick: 25, num_orders: 200, ..Default::default() };
        for order in Generator::new(config).all_orders() {
            if let GeneratedOrder::Limit { request, .. } = order {
                assert_eq!(request.price % 25, 0);
                assert!((95 * 25..=105 * 25).contains(&request.price));
            }
        }
    }

    #[test]
    fn replay_into_exchange_succeeds() {
        let exchange = Exchange::new(EngineConfig::default()).unwrap();
        exchange.set_token_policy(AccountId(0), ItemId(1), 1, 1).unwrap();
        let orders = Generator::new(GeneratorConfig { seed: 123, num_orders: 200, ..Default::default() }).all_orders();
        let summary = replay_into_exchange(&exchange, orders).unwrap();
        assert!(summary.rested > 0);
        assert!(summary.fills > 0);
        assert_eq!(summary.dropped, 0);
    }
}
