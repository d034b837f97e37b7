//! Per-round market reference data.
//!
//! Prices and option chains are pure lookup tables built once from
//! configuration. The active round selects which table an operation reads;
//! changing the round never rewrites settled history.

use crate::config::MarketConfig;
use crate::types::OptionType;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// One display row of the market table for a round.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub ticker: String,
    pub price: Decimal,
    pub tradable: bool,
}

/// One strike row of an option chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrikeRow {
    pub strike: Decimal,
    pub call_premium: Decimal,
    pub put_premium: Decimal,
}

#[derive(Debug, Clone)]
pub struct MarketData {
    /// Instruments in configured display order.
    instruments: Vec<(String, bool)>,
    prices: HashMap<u32, HashMap<String, Decimal>>,
    chains: HashMap<u32, Vec<StrikeRow>>,
}

impl MarketData {
    #[must_use]
    pub fn from_config(config: &MarketConfig) -> Self {
        let instruments = config
            .instruments
            .iter()
            .map(|i| (i.ticker.clone(), i.tradable))
            .collect();

        let prices = config
            .rounds
            .iter()
            .map(|r| {
                let table = r
                    .prices
                    .iter()
                    .map(|q| (q.ticker.clone(), q.price))
                    .collect();
                (r.round, table)
            })
            .collect();

        let chains = config
            .chains
            .iter()
            .map(|c| {
                let rows = c
                    .strikes
                    .iter()
                    .map(|s| StrikeRow {
                        strike: s.strike,
                        call_premium: s.call_premium,
                        put_premium: s.put_premium,
                    })
                    .collect();
                (c.round, rows)
            })
            .collect();

        Self {
            instruments,
            prices,
            chains,
        }
    }

    /// Price of `ticker` in `round`, if the table quotes it.
    #[must_use]
    pub fn price(&self, round: u32, ticker: &str) -> Option<Decimal> {
        self.prices.get(&round)?.get(ticker).copied()
    }

    /// The full market table for a round, in configured display order.
    #[must_use]
    pub fn quotes(&self, round: u32) -> Vec<Quote> {
        let Some(table) = self.prices.get(&round) else {
            return Vec::new();
        };
        self.instruments
            .iter()
            .filter_map(|(ticker, tradable)| {
                table.get(ticker).map(|price| Quote {
                    ticker: ticker.clone(),
                    price: *price,
                    tradable: *tradable,
                })
            })
            .collect()
    }

    /// The option chain for a round; empty when the round has none
    /// (round 0 carries no chain).
    #[must_use]
    pub fn chain(&self, round: u32) -> &[StrikeRow] {
        self.chains.get(&round).map_or(&[], Vec::as_slice)
    }

    /// Quoted premium for `(round, strike, type)`.
    #[must_use]
    pub fn premium(&self, round: u32, strike: Decimal, option_type: OptionType) -> Option<Decimal> {
        self.chain(round)
            .iter()
            .find(|row| row.strike == strike)
            .map(|row| match option_type {
                OptionType::Call => row.call_premium,
                OptionType::Put => row.put_premium,
            })
    }

    /// Whether the instrument participates in settlement. Unknown tickers
    /// and display-only rows (index, commodities) do not.
    #[must_use]
    pub fn is_tradable(&self, ticker: &str) -> bool {
        self.instruments
            .iter()
            .any(|(t, tradable)| t == ticker && *tradable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use rust_decimal_macros::dec;

    fn market() -> MarketData {
        MarketData::from_config(&AppConfig::default().market)
    }

    #[test]
    fn round_zero_quotes_base_prices() {
        let market = market();
        assert_eq!(market.price(0, "RELIANCE"), Some(dec!(2500)));
        assert_eq!(market.price(0, "UNKNOWN"), None);
    }

    #[test]
    fn prices_differ_across_rounds() {
        let market = market();
        let round0 = market.price(0, "TCS").unwrap();
        let round2 = market.price(2, "TCS").unwrap();
        assert_ne!(round0, round2);
    }

    #[test]
    fn index_and_commodities_are_display_only() {
        let market = market();
        assert!(market.is_tradable("RELIANCE"));
        assert!(!market.is_tradable("INDEX"));
        assert!(!market.is_tradable("GOLD"));
        assert!(!market.is_tradable("NO_SUCH_TICKER"));
    }

    #[test]
    fn premium_lookup_distinguishes_call_and_put() {
        let market = market();
        let row = &market.chain(1)[0];
        let strike = row.strike;
        assert_eq!(
            market.premium(1, strike, OptionType::Call),
            Some(row.call_premium)
        );
        assert_eq!(
            market.premium(1, strike, OptionType::Put),
            Some(row.put_premium)
        );
        assert_eq!(market.premium(1, dec!(99999), OptionType::Call), None);
    }

    #[test]
    fn round_zero_has_no_chain() {
        assert!(market().chain(0).is_empty());
    }
}
