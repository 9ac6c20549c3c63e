//! Synthetic price source.
//!
//! Every key starts at a fixed base price and then moves by a small random step on each
//! call, so a chart fed from this source looks like a quiet intraday session. Prices are
//! rendered with a decimal comma on request to exercise the same normalization path as a
//! real localized quote page.

use log::debug;
use price_common::Key;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{PriceSource, SourceError};

/// Price every key starts from.
const INITIAL_PRICE: f64 = 100.0;

/// Random-walk price generator shared by all fetch threads.
pub struct RandomWalkSource {
    prices: Mutex<HashMap<Key, f64>>,
    decimal_comma: bool,
}

impl RandomWalkSource {
    /// Create a source; with `decimal_comma` the quotes look like `191,50`.
    pub fn new(decimal_comma: bool) -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            decimal_comma,
        }
    }

    /// Calculate the next synthetic price using a small random walk around `current_price`.
    ///
    /// The change is sampled uniformly from `[-1%, +1%]` and the result is clamped to a
    /// minimum positive value.
    pub fn next_price(current_price: f64) -> f64 {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-0.01..0.01);
        (current_price * (1.0 + change)).max(0.01)
    }
}

impl Default for RandomWalkSource {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PriceSource for RandomWalkSource {
    fn quote(&self, key: &Key) -> Result<String, SourceError> {
        let price = {
            let mut prices = self.prices.lock().unwrap_or_else(PoisonError::into_inner);
            let current = prices.entry(key.clone()).or_insert(INITIAL_PRICE);
            *current = Self::next_price(*current);
            *current
        };
        debug!("Random walk {} -> {:.4}", key, price);

        let text = format!("{:.2}", price);
        Ok(if self.decimal_comma {
            text.replace('.', ",")
        } else {
            text
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::parse_price;

    #[test]
    fn next_price_stays_within_one_percent() {
        for _ in 0..1000 {
            let next = RandomWalkSource::next_price(100.0);
            assert!((99.0..=101.0).contains(&next), "{}", next);
        }
        assert!(RandomWalkSource::next_price(0.0) >= 0.01);
    }

    #[test]
    fn quotes_walk_per_key() {
        let source = RandomWalkSource::new(true);
        let aapl: Key = "AAPL".parse().unwrap();
        let first = parse_price(&source.quote(&aapl).unwrap()).unwrap();
        let second = parse_price(&source.quote(&aapl).unwrap()).unwrap();
        assert!((first - INITIAL_PRICE).abs() <= 1.01);
        assert!((second - first).abs() <= first * 0.0101 + 0.01);
        assert!(source.quote(&aapl).unwrap().contains(','));
    }
}
