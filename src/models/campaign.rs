use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::Order;
use super::product::Product;
use crate::strategies::options::Options;

/// `Buy`/`Sell` are stable waiting states; `Buying`/`Selling` are held only
/// while the order side-effect is being persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    #[default]
    Buy,
    Buying,
    Sell,
    Selling,
}

impl CampaignState {
    /// States in which a campaign is waiting on ticks.
    pub const ACTIVE: [CampaignState; 2] = [CampaignState::Buy, CampaignState::Sell];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellLimitUnit {
    Percent,
    Currency,
}

impl SellLimitUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        match unit {
            "percent" => Some(Self::Percent),
            "currency" => Some(Self::Currency),
            _ => None,
        }
    }
}

/// A standing directive: buy `volume` of a product under `buy_limit`, then
/// sell it once the margin reaches `sell_limit` and the trend confirms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Assigned by the store on first save; 0 means unsaved.
    #[serde(default)]
    pub id: u64,
    pub provider: String,
    pub product_id: Product,
    pub volume: Decimal,
    pub buy_limit: Decimal,
    pub sell_limit: Decimal,
    /// `"percent"` or `"currency"`. Kept as text so that an unknown unit is
    /// reported at evaluation time instead of rejecting the whole record.
    pub sell_limit_unit: String,
    /// Empty selects the engine's default algorithm.
    #[serde(default)]
    pub buy_algorithm: String,
    #[serde(default)]
    pub buy_options: Options,
    #[serde(default)]
    pub sell_algorithm: String,
    #[serde(default)]
    pub sell_options: Options,
    #[serde(default)]
    pub state: CampaignState,
    #[serde(default)]
    pub buy_order: Option<Order>,
    #[serde(default)]
    pub sell_order: Option<Order>,
    /// Filled in by the store on read; not authoritative.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn new(
        provider: &str,
        product_id: Product,
        volume: Decimal,
        buy_limit: Decimal,
        sell_limit: Decimal,
        sell_limit_unit: &str,
    ) -> Self {
        Self {
            id: 0,
            provider: provider.to_string(),
            product_id,
            volume,
            buy_limit,
            sell_limit,
            sell_limit_unit: sell_limit_unit.to_string(),
            buy_algorithm: String::new(),
            buy_options: Options::default(),
            sell_algorithm: String::new(),
            sell_options: Options::default(),
            state: CampaignState::Buy,
            buy_order: None,
            sell_order: None,
            orders: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id == 0
    }

    pub fn is_state(&self, state: CampaignState) -> bool {
        self.state == state
    }

    pub fn is_buying(&self) -> bool {
        matches!(self.state, CampaignState::Buy | CampaignState::Buying)
    }

    pub fn is_selling(&self) -> bool {
        matches!(self.state, CampaignState::Sell | CampaignState::Selling)
    }

    pub fn sell_unit(&self) -> Option<SellLimitUnit> {
        SellLimitUnit::parse(&self.sell_limit_unit)
    }

    pub fn series_key(&self) -> String {
        self.product_id.series_key(&self.provider)
    }

    pub fn add_order(&mut self, order: Order) {
        self.orders.push(order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Campaign {
        Campaign::new("gdax", Product::new("BTC", "EUR"), dec!(0.01), dec!(150), dec!(5), "percent")
    }

    #[test]
    fn test_new_campaign_waits_to_buy() {
        let c = sample();
        assert!(c.is_new());
        assert!(c.is_state(CampaignState::Buy));
        assert!(c.is_buying());
        assert!(!c.is_selling());
        assert_eq!(c.series_key(), "gdax-BTC-EUR");
    }

    #[test]
    fn test_sell_unit() {
        let mut c = sample();
        assert_eq!(c.sell_unit(), Some(SellLimitUnit::Percent));
        c.sell_limit_unit = "currency".into();
        assert_eq!(c.sell_unit(), Some(SellLimitUnit::Currency));
        c.sell_limit_unit = "pips".into();
        assert_eq!(c.sell_unit(), None);
    }

    #[test]
    fn test_deserialize_minimal_record() {
        let json = r#"{
            "provider": "gdax",
            "product_id": "btc-eur",
            "volume": "0.5",
            "buy_limit": "9000",
            "sell_limit": "10",
            "sell_limit_unit": "currency",
            "sell_options": {"Trend.Selling.Short_Trend_Size": 20}
        }"#;
        let c: Campaign = serde_json::from_str(json).unwrap();
        assert_eq!(c.state, CampaignState::Buy);
        assert_eq!(c.product_id, Product::new("BTC", "EUR"));
        assert_eq!(c.volume, dec!(0.5));
        assert_eq!(c.sell_options.get_int("trend.selling.short_trend_size"), 20);
        assert!(c.buy_order.is_none());
    }
}
