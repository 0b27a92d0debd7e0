use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::product::Product;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One venue observation. Consumed transiently, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerEvent {
    pub product: Product,
    pub price: Decimal,
    pub side: Side,
    pub size: Decimal,
    /// `None` when the venue sent no usable timestamp; such ticks are skipped.
    pub time: Option<DateTime<Utc>>,
}

impl TickerEvent {
    pub fn new(product: Product, price: Decimal, side: Side, size: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            product,
            price,
            side,
            size,
            time: Some(time),
        }
    }

    /// Unix seconds of the observation, if it carries a real timestamp.
    pub fn timestamp(&self) -> Option<i64> {
        self.time.map(|t| t.timestamp()).filter(|ts| *ts != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zero_time_has_no_timestamp() {
        let mut tick = TickerEvent::new(
            Product::new("BTC", "EUR"),
            dec!(14000),
            Side::Buy,
            dec!(0.01),
            Utc.timestamp_opt(0, 0).unwrap(),
        );
        assert_eq!(tick.timestamp(), None);

        tick.time = None;
        assert_eq!(tick.timestamp(), None);

        tick.time = Some(Utc.timestamp_opt(1_510_000_000, 0).unwrap());
        assert_eq!(tick.timestamp(), Some(1_510_000_000));
    }

    #[test]
    fn test_side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"sell\"");
    }
}
