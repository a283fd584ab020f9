// cross-margin-calc: cross-margin calculator for USDT-margined perpetual futures.
// liquidation-first architecture: the cross-margin liquidation math is the core.
// all computation is deterministic; the only I/O is the price feed, called before a pass.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Symbol, Side, Price, Quote, Leverage, MarginRate
//   3.x  margin.rs: margin ratio, risk bands, free margin
//   4.x  position.rs: position record, pnl, isolated liquidation baseline
//   4.5  group.rs: (symbol, side) grouping, weighted entry
//   5.x  sensitivity.rs: pnl curve across a price band
//   6.x  liquidation.rs: cross-margin liquidation prices, risk ranking
//   7.x  config.rs: leverage set, bands, feed settings, env overlay
//   8.x  engine/: session state and the evaluation pass
//   9.x  price_feed.rs: live feed, ttl cache, fallback resolution
//   10.x account.rs: account-level pnl and margin ratio

pub mod account;
pub mod engine;
pub mod group;
pub mod liquidation;
pub mod margin;
pub mod position;
pub mod sensitivity;
pub mod types;

// integration modules
pub mod config;
pub mod price_feed;

// re exports for convenience
pub use account::*;
pub use engine::*;
pub use group::*;
pub use liquidation::*;
pub use margin::*;
pub use position::*;
pub use sensitivity::*;
pub use types::*;
pub use config::{CalculatorConfig, ConfigError};
pub use price_feed::{
    default_fallback_prices, resolve_prices, BinancePriceFeed, CachedPriceFeed, MockPriceFeed,
    PriceFeed, PriceFeedConfig, PriceFeedError, PriceSource, ResolvedPrice,
};
