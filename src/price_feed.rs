// Price Feed Integration
//
// The calculator never performs I/O itself. A price feed is asked once per
// evaluation pass for the symbols in play, and whatever it returns (or its
// failure) is turned into a complete symbol -> price map before the engine
// sees it. Resolution order per symbol: manual override, live quote, static
// fallback table (only when the live fetch failed or came back empty), then
// the entry price of the first position in that symbol.

use crate::position::Position;
use crate::types::{Price, Symbol, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://fapi.binance.com/fapi/v1/ticker/price";

/// Configuration for the live price feed and its cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// How long a fetched price set stays valid
    pub cache_ttl_secs: u64,
    /// Extra attempts after the first failed request
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Only symbols quoted in this asset are kept
    pub quote_asset: String,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 10,
            cache_ttl_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 250,
            quote_asset: "USDT".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PriceFeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("price feed returned no prices")]
    Empty,

    #[error("price feed {0} is unavailable")]
    Unavailable(String),
}

/// Anything that can quote current mark prices for a set of symbols.
pub trait PriceFeed {
    fn name(&self) -> &str;

    fn get_prices(
        &self,
        symbols: &BTreeSet<Symbol>,
    ) -> Result<BTreeMap<Symbol, Price>, PriceFeedError>;
}

/// One entry of the futures ticker endpoint. Prices arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

/// Keeps quote-asset symbols with a parseable positive price. When `wanted`
/// is empty every quote-asset symbol is kept.
pub fn parse_ticker_prices(
    tickers: &[TickerPrice],
    quote_asset: &str,
    wanted: &BTreeSet<Symbol>,
) -> BTreeMap<Symbol, Price> {
    let mut prices = BTreeMap::new();
    for ticker in tickers {
        let Some(symbol) = Symbol::new(&ticker.symbol) else {
            continue;
        };
        if !symbol.has_suffix(quote_asset) {
            continue;
        }
        if !wanted.is_empty() && !wanted.contains(&symbol) {
            continue;
        }
        match Decimal::from_str(&ticker.price).ok().and_then(Price::new) {
            Some(price) => {
                prices.insert(symbol, price);
            }
            None => {
                tracing::warn!(symbol = %symbol, raw = %ticker.price, "skipping unparseable ticker price");
            }
        }
    }
    prices
}

/// Binance USDT-M futures ticker feed. Blocking, one request per fetch.
#[derive(Debug, Clone)]
pub struct BinancePriceFeed {
    client: reqwest::blocking::Client,
    config: PriceFeedConfig,
}

impl BinancePriceFeed {
    pub fn new(config: PriceFeedConfig) -> Result<Self, PriceFeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn fetch_once(&self) -> Result<Vec<TickerPrice>, PriceFeedError> {
        let tickers = self
            .client
            .get(&self.config.endpoint)
            .send()?
            .error_for_status()?
            .json::<Vec<TickerPrice>>()?;
        Ok(tickers)
    }
}

impl PriceFeed for BinancePriceFeed {
    fn name(&self) -> &str {
        "binance-futures"
    }

    fn get_prices(
        &self,
        symbols: &BTreeSet<Symbol>,
    ) -> Result<BTreeMap<Symbol, Price>, PriceFeedError> {
        let attempts = self.config.max_retries + 1;
        let mut last_err = PriceFeedError::Unavailable(self.name().to_string());

        for attempt in 1..=attempts {
            match self.fetch_once() {
                Ok(tickers) => {
                    let prices = parse_ticker_prices(&tickers, &self.config.quote_asset, symbols);
                    if prices.is_empty() {
                        return Err(PriceFeedError::Empty);
                    }
                    tracing::debug!(count = prices.len(), attempt, "fetched live prices");
                    return Ok(prices);
                }
                Err(err) => {
                    tracing::warn!(attempt, attempts, error = %err, "price fetch failed");
                    last_err = err;
                    if attempt < attempts {
                        std::thread::sleep(Duration::from_millis(self.config.retry_backoff_ms));
                    }
                }
            }
        }

        Err(last_err)
    }
}

/// Fixed-price feed for tests and offline runs.
#[derive(Debug, Clone)]
pub struct MockPriceFeed {
    name: String,
    prices: BTreeMap<Symbol, Price>,
    healthy: bool,
}

impl MockPriceFeed {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prices: BTreeMap::new(),
            healthy: true,
        }
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn set_price(&mut self, symbol: &str, price: Decimal) {
        if let (Some(symbol), Some(price)) = (Symbol::new(symbol), Price::new(price)) {
            self.prices.insert(symbol, price);
        }
    }

    pub fn set_healthy(&mut self, healthy: bool) {
        self.healthy = healthy;
    }
}

impl PriceFeed for MockPriceFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_prices(
        &self,
        symbols: &BTreeSet<Symbol>,
    ) -> Result<BTreeMap<Symbol, Price>, PriceFeedError> {
        if !self.healthy {
            return Err(PriceFeedError::Unavailable(self.name.clone()));
        }
        let prices: BTreeMap<Symbol, Price> = self
            .prices
            .iter()
            .filter(|(symbol, _)| symbols.is_empty() || symbols.contains(*symbol))
            .map(|(s, p)| (s.clone(), *p))
            .collect();
        if prices.is_empty() {
            return Err(PriceFeedError::Empty);
        }
        Ok(prices)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    symbols: BTreeSet<Symbol>,
    prices: BTreeMap<Symbol, Price>,
    fetched_at: Timestamp,
}

/// Time-bounded cache in front of a feed. Keyed by the requested symbol
/// set; failures are never cached.
#[derive(Debug)]
pub struct CachedPriceFeed<F: PriceFeed> {
    inner: F,
    ttl_millis: i64,
    entry: Option<CacheEntry>,
}

impl<F: PriceFeed> CachedPriceFeed<F> {
    pub fn new(inner: F, ttl_secs: u64) -> Self {
        Self {
            inner,
            ttl_millis: i64::try_from(ttl_secs).unwrap_or(i64::MAX).saturating_mul(1000),
            entry: None,
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn last_fetched_at(&self) -> Option<Timestamp> {
        self.entry.as_ref().map(|e| e.fetched_at)
    }

    pub fn get_prices(
        &mut self,
        symbols: &BTreeSet<Symbol>,
    ) -> Result<BTreeMap<Symbol, Price>, PriceFeedError> {
        self.get_prices_at(symbols, Timestamp::now())
    }

    pub fn get_prices_at(
        &mut self,
        symbols: &BTreeSet<Symbol>,
        now: Timestamp,
    ) -> Result<BTreeMap<Symbol, Price>, PriceFeedError> {
        if let Some(entry) = &self.entry {
            let fresh = entry.fetched_at.elapsed_millis(&now) < self.ttl_millis;
            if fresh && entry.symbols == *symbols {
                return Ok(entry.prices.clone());
            }
        }

        let prices = self.inner.get_prices(symbols)?;
        self.entry = Some(CacheEntry {
            symbols: symbols.clone(),
            prices: prices.clone(),
            fetched_at: now,
        });
        Ok(prices)
    }
}

/// Static prices used when the live feed is down.
pub fn default_fallback_prices() -> BTreeMap<Symbol, Price> {
    [
        ("BTCUSDT", dec!(50000.0)),
        ("ETHUSDT", dec!(3000.0)),
        ("ADAUSDT", dec!(0.50)),
        ("SOLUSDT", dec!(100.0)),
        ("DOGEUSDT", dec!(0.08)),
        ("XRPUSDT", dec!(0.60)),
        ("LTCUSDT", dec!(80.0)),
        ("AVAXUSDT", dec!(35.0)),
        ("DOTUSDT", dec!(7.0)),
        ("LINKUSDT", dec!(15.0)),
        ("BANANAS31USDT", dec!(0.01)),
        ("BROCCOLI714USDT", dec!(0.01)),
    ]
    .into_iter()
    .filter_map(|(s, p)| Some((Symbol::new(s)?, Price::new(p)?)))
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Live,
    Fallback,
    Override,
    Entry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedPrice {
    pub price: Price,
    pub source: PriceSource,
}

pub fn symbols_in_play(positions: &[Position]) -> BTreeSet<Symbol> {
    positions.iter().map(|p| p.symbol().clone()).collect()
}

/// Turns a feed outcome into exactly one price per symbol in play.
pub fn resolve_prices(
    positions: &[Position],
    live: Result<BTreeMap<Symbol, Price>, PriceFeedError>,
    fallback: &BTreeMap<Symbol, Price>,
    overrides: &BTreeMap<Symbol, Price>,
) -> BTreeMap<Symbol, ResolvedPrice> {
    if positions.is_empty() {
        return BTreeMap::new();
    }
    let (quotes, source) = match live {
        Ok(prices) if !prices.is_empty() => (prices, PriceSource::Live),
        Ok(_) => {
            tracing::warn!("live price feed returned nothing, using fallback prices");
            (fallback.clone(), PriceSource::Fallback)
        }
        Err(err) => {
            tracing::warn!(error = %err, "live price feed unavailable, using fallback prices");
            (fallback.clone(), PriceSource::Fallback)
        }
    };

    let mut resolved = BTreeMap::new();
    for pos in positions {
        let symbol = pos.symbol();
        if resolved.contains_key(symbol) {
            continue;
        }
        let price = if let Some(price) = overrides.get(symbol) {
            ResolvedPrice { price: *price, source: PriceSource::Override }
        } else if let Some(price) = quotes.get(symbol) {
            ResolvedPrice { price: *price, source }
        } else {
            tracing::warn!(symbol = %symbol, "no quote for symbol, using entry price");
            ResolvedPrice { price: pos.entry_price(), source: PriceSource::Entry }
        };
        resolved.insert(symbol.clone(), price);
    }
    resolved
}

pub fn price_map(resolved: &BTreeMap<Symbol, ResolvedPrice>) -> BTreeMap<Symbol, Price> {
    resolved.iter().map(|(s, r)| (s.clone(), r.price)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use rust_decimal_macros::dec;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn set(symbols: &[&str]) -> BTreeSet<Symbol> {
        symbols.iter().map(|s| sym(s)).collect()
    }

    #[test]
    fn parses_ticker_response() {
        let body = r#"[
            {"symbol":"BTCUSDT","price":"64250.10","time":1700000000000},
            {"symbol":"ETHUSDT","price":"3120.55","time":1700000000000},
            {"symbol":"ETHBTC","price":"0.0485","time":1700000000000},
            {"symbol":"BADUSDT","price":"n/a","time":1700000000000}
        ]"#;
        let tickers: Vec<TickerPrice> = serde_json::from_str(body).unwrap();

        let all = parse_ticker_prices(&tickers, "USDT", &BTreeSet::new());
        assert_eq!(all.len(), 2);
        assert_eq!(all[&sym("BTCUSDT")].value(), dec!(64250.10));
        assert!(!all.contains_key(&sym("ETHBTC")));

        let only_eth = parse_ticker_prices(&tickers, "USDT", &set(&["ETHUSDT"]));
        assert_eq!(only_eth.len(), 1);
        assert_eq!(only_eth[&sym("ETHUSDT")].value(), dec!(3120.55));
    }

    #[test]
    fn mock_feed_health() {
        let mut feed = MockPriceFeed::new("mock").with_price("BTCUSDT", dec!(50000));
        let prices = feed.get_prices(&set(&["BTCUSDT"])).unwrap();
        assert_eq!(prices[&sym("BTCUSDT")].value(), dec!(50000));

        feed.set_healthy(false);
        assert!(matches!(
            feed.get_prices(&set(&["BTCUSDT"])),
            Err(PriceFeedError::Unavailable(_))
        ));
    }

    #[test]
    fn mock_feed_without_requested_symbols_is_empty() {
        let feed = MockPriceFeed::new("mock").with_price("BTCUSDT", dec!(50000));
        assert!(matches!(
            feed.get_prices(&set(&["DOGEUSDT"])),
            Err(PriceFeedError::Empty)
        ));
    }

    #[test]
    fn cache_serves_within_ttl() {
        let feed = MockPriceFeed::new("mock").with_price("BTCUSDT", dec!(50000));
        let mut cached = CachedPriceFeed::new(feed, 30);
        let symbols = set(&["BTCUSDT"]);

        let first = cached.get_prices_at(&symbols, Timestamp::from_millis(1_000)).unwrap();
        assert_eq!(first[&sym("BTCUSDT")].value(), dec!(50000));

        // upstream moves, cache still serves the old price
        cached.inner_mut().set_price("BTCUSDT", dec!(51000));
        let second = cached.get_prices_at(&symbols, Timestamp::from_millis(20_000)).unwrap();
        assert_eq!(second[&sym("BTCUSDT")].value(), dec!(50000));

        // past the TTL it refetches
        let third = cached.get_prices_at(&symbols, Timestamp::from_millis(31_000)).unwrap();
        assert_eq!(third[&sym("BTCUSDT")].value(), dec!(51000));
        assert_eq!(cached.last_fetched_at(), Some(Timestamp::from_millis(31_000)));
    }

    #[test]
    fn cache_keyed_by_symbol_set_and_invalidated() {
        let feed = MockPriceFeed::new("mock")
            .with_price("BTCUSDT", dec!(50000))
            .with_price("ETHUSDT", dec!(3000));
        let mut cached = CachedPriceFeed::new(feed, 30);

        let btc = cached.get_prices_at(&set(&["BTCUSDT"]), Timestamp::from_millis(0)).unwrap();
        assert_eq!(btc.len(), 1);

        let both = cached
            .get_prices_at(&set(&["BTCUSDT", "ETHUSDT"]), Timestamp::from_millis(1))
            .unwrap();
        assert_eq!(both.len(), 2);

        cached.inner_mut().set_price("ETHUSDT", dec!(3100));
        cached.invalidate();
        let fresh = cached
            .get_prices_at(&set(&["BTCUSDT", "ETHUSDT"]), Timestamp::from_millis(2))
            .unwrap();
        assert_eq!(fresh[&sym("ETHUSDT")].value(), dec!(3100));
    }

    #[test]
    fn cache_does_not_store_failures() {
        let mut feed = MockPriceFeed::new("mock").with_price("BTCUSDT", dec!(50000));
        feed.set_healthy(false);
        let mut cached = CachedPriceFeed::new(feed, 30);
        let symbols = set(&["BTCUSDT"]);

        assert!(cached.get_prices_at(&symbols, Timestamp::from_millis(0)).is_err());
        cached.inner_mut().set_healthy(true);
        assert!(cached.get_prices_at(&symbols, Timestamp::from_millis(1)).is_ok());
    }

    #[test]
    fn huge_ttl_keeps_serving_cache() {
        let feed = MockPriceFeed::new("mock").with_price("BTCUSDT", dec!(50000));
        let mut cached = CachedPriceFeed::new(feed, u64::MAX);
        let symbols = set(&["BTCUSDT"]);

        cached.get_prices_at(&symbols, Timestamp::from_millis(0)).unwrap();
        cached.inner_mut().set_healthy(false);
        let later = cached
            .get_prices_at(&symbols, Timestamp::from_millis(i64::MAX - 1))
            .unwrap();
        assert_eq!(later[&sym("BTCUSDT")].value(), dec!(50000));
    }

    #[test]
    fn nothing_to_resolve_without_positions() {
        let resolved = resolve_prices(
            &[],
            Ok(BTreeMap::new()),
            &default_fallback_prices(),
            &BTreeMap::new(),
        );
        assert!(resolved.is_empty());
    }

    fn positions() -> Vec<Position> {
        vec![
            Position::new("BTCUSDT", Side::Long, dec!(48000), 10, dec!(500), dec!(0.005)).unwrap(),
            Position::new("ETHUSDT", Side::Short, dec!(3200), 5, dec!(300), dec!(0.005)).unwrap(),
            Position::new("PEPEUSDT", Side::Long, dec!(0.00001), 5, dec!(100), dec!(0.01)).unwrap(),
        ]
    }

    #[test]
    fn resolve_live_then_entry() {
        let mut live = BTreeMap::new();
        live.insert(sym("BTCUSDT"), Price::new_unchecked(dec!(60000)));
        live.insert(sym("ETHUSDT"), Price::new_unchecked(dec!(3100)));

        let resolved =
            resolve_prices(&positions(), Ok(live), &default_fallback_prices(), &BTreeMap::new());

        assert_eq!(resolved[&sym("BTCUSDT")].source, PriceSource::Live);
        assert_eq!(resolved[&sym("BTCUSDT")].price.value(), dec!(60000));
        assert_eq!(resolved[&sym("PEPEUSDT")].source, PriceSource::Entry);
        assert_eq!(resolved[&sym("PEPEUSDT")].price.value(), dec!(0.00001));
    }

    #[test]
    fn resolve_failure_uses_fallback_table() {
        let resolved = resolve_prices(
            &positions(),
            Err(PriceFeedError::Unavailable("binance".into())),
            &default_fallback_prices(),
            &BTreeMap::new(),
        );

        assert_eq!(resolved[&sym("BTCUSDT")].source, PriceSource::Fallback);
        assert_eq!(resolved[&sym("BTCUSDT")].price.value(), dec!(50000));
        assert_eq!(resolved[&sym("ETHUSDT")].price.value(), dec!(3000));
        assert_eq!(resolved[&sym("PEPEUSDT")].source, PriceSource::Entry);
    }

    #[test]
    fn resolve_empty_live_uses_fallback_table() {
        let resolved = resolve_prices(
            &positions(),
            Ok(BTreeMap::new()),
            &default_fallback_prices(),
            &BTreeMap::new(),
        );
        assert_eq!(resolved[&sym("ETHUSDT")].source, PriceSource::Fallback);
    }

    #[test]
    fn overrides_win() {
        let mut overrides = BTreeMap::new();
        overrides.insert(sym("ETHUSDT"), Price::new_unchecked(dec!(2500)));

        let resolved = resolve_prices(
            &positions(),
            Err(PriceFeedError::Empty),
            &default_fallback_prices(),
            &overrides,
        );
        assert_eq!(resolved[&sym("ETHUSDT")].source, PriceSource::Override);
        assert_eq!(price_map(&resolved)[&sym("ETHUSDT")].value(), dec!(2500));
    }

    #[test]
    fn fallback_table_is_complete() {
        let table = default_fallback_prices();
        assert_eq!(table.len(), 12);
        assert_eq!(table[&sym("DOGEUSDT")].value(), dec!(0.08));
    }

    #[test]
    fn symbols_in_play_dedupes() {
        let mut list = positions();
        list.push(
            Position::new("BTCUSDT", Side::Short, dec!(50000), 20, dec!(100), dec!(0.005)).unwrap(),
        );
        assert_eq!(symbols_in_play(&list).len(), 3);
    }
}
