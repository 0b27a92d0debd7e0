use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A tradable pair such as `BTC-EUR`. Symbols are always upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Product {
    pub from: String,
    pub to: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid product id '{0}', expected FROM-TO")]
pub struct ProductParseError(pub String);

impl Product {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.trim().to_uppercase(),
            to: to.trim().to_uppercase(),
        }
    }

    /// Instrument key used for the per-provider series: `{provider}-{FROM}-{TO}`.
    pub fn series_key(&self, provider: &str) -> String {
        format!("{provider}-{self}")
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

impl FromStr for Product {
    type Err = ProductParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(from), Some(to), None) if !from.trim().is_empty() && !to.trim().is_empty() => {
                Ok(Self::new(from, to))
            }
            _ => Err(ProductParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Product {
    type Error = ProductParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Product> for String {
    fn from(product: Product) -> Self {
        product.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uppercases() {
        let product: Product = "btc-eur".parse().unwrap();
        assert_eq!(product, Product::new("BTC", "EUR"));
        assert_eq!(product.to_string(), "BTC-EUR");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("BTCEUR".parse::<Product>().is_err());
        assert!("BTC-".parse::<Product>().is_err());
        assert!("BTC-EUR-USD".parse::<Product>().is_err());
    }

    #[test]
    fn test_series_key() {
        let product = Product::new("eth", "usd");
        assert_eq!(product.series_key("gdax"), "gdax-ETH-USD");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Product::new("BTC", "EUR")).unwrap();
        assert_eq!(json, "\"BTC-EUR\"");
        let back: Product = serde_json::from_str("\"ltc-btc\"").unwrap();
        assert_eq!(back, Product::new("LTC", "BTC"));
    }
}
