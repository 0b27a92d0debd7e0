use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::product::Product;
use super::ticker::Side;

/// A simulated fill. `price` is the notional paid or received (size × tick price).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Assigned by the store on first save; 0 means unsaved.
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub campaign_id: u64,
    pub provider: String,
    pub product_id: Product,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub trade_id: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(provider: &str, product_id: Product, side: Side, size: Decimal, price: Decimal) -> Self {
        Self {
            id: 0,
            campaign_id: 0,
            provider: provider.to_string(),
            product_id,
            side,
            size,
            price,
            trade_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Unit price paid at entry (notional / size).
    pub fn buying_market_price(&self) -> Option<Decimal> {
        self.price.checked_div(self.size)
    }

    /// Notional value of the held size at `market`. `None` on overflow.
    pub fn current_price(&self, market: Decimal) -> Option<Decimal> {
        self.size.checked_mul(market)
    }

    pub fn margin_in_currency(&self, market: Decimal) -> Option<Decimal> {
        self.current_price(market)?.checked_sub(self.price)
    }

    /// `100 × entry notional / current notional`. `None` when the current
    /// notional is zero or either side overflows.
    pub fn margin_in_percent(&self, market: Decimal) -> Option<Decimal> {
        Decimal::ONE_HUNDRED
            .checked_mul(self.price)?
            .checked_div(self.current_price(market)?)
    }
}
