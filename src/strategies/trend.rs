use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use super::algorithm::{Algorithm, AlgorithmError};
use super::options::Options;
use crate::models::{Campaign, CampaignState, Order, SellLimitUnit, Side, TickerEvent};
use crate::signals::{Timeseries, TrendType};
use crate::store::{CampaignStore, OrderStore};

pub const NAME: &str = "trend";

pub const LONG_TREND_SIZE: &str = "trend.selling.long_trend_size";
pub const SHORT_TREND_SIZE: &str = "trend.selling.short_trend_size";
/// When true, the exit also records a Sell order.
pub const RECORD_SELL_ORDER: &str = "trend.selling.record_order";

/// Buys under a fixed price limit, sells once the margin target is reached
/// and a short-window dip shows inside a longer uptrend.
pub struct Trend {
    campaigns: Arc<dyn CampaignStore>,
    orders: Arc<dyn OrderStore>,
}

impl Trend {
    pub fn new(campaigns: Arc<dyn CampaignStore>, orders: Arc<dyn OrderStore>) -> Self {
        Self { campaigns, orders }
    }

    async fn transition(&self, campaign: &mut Campaign, state: CampaignState) -> Result<(), AlgorithmError> {
        campaign.state = state;
        self.campaigns.save_campaign(campaign).await?;
        Ok(())
    }

    async fn record_order(
        &self,
        campaign: &mut Campaign,
        side: Side,
        size: Decimal,
        notional: Decimal,
    ) -> Result<Order, AlgorithmError> {
        let mut order = Order::new(&campaign.provider, campaign.product_id.clone(), side, size, notional);
        order.campaign_id = campaign.id;
        self.orders.save_order(&mut order).await?;
        campaign.add_order(order.clone());
        Ok(order)
    }
}

/// `size × price`, checked before any state is written.
fn notional(campaign: &Campaign, size: Decimal, price: Decimal) -> Result<Decimal, AlgorithmError> {
    size.checked_mul(price).ok_or_else(|| {
        AlgorithmError::Configuration(format!(
            "campaign {}: notional of {size} at {price} overflows",
            campaign.id
        ))
    })
}

fn window(options: &Options, key: &str) -> usize {
    usize::try_from(options.get_int(key)).unwrap_or(0)
}

#[async_trait]
impl Algorithm for Trend {
    fn name(&self) -> &str {
        NAME
    }

    fn options(&self) -> Options {
        Options::new()
            .with(LONG_TREND_SIZE, 150)
            .with(SHORT_TREND_SIZE, 10)
            .with(RECORD_SELL_ORDER, false)
    }

    async fn buy(
        &self,
        tick: &TickerEvent,
        campaign: &mut Campaign,
        _series: &Timeseries,
    ) -> Result<(), AlgorithmError> {
        if tick.price >= campaign.buy_limit {
            return Ok(());
        }

        // no buy-side keys are read yet
        let options = self.options().merged(&campaign.buy_options);
        debug!("Campaign {} buy options: {:?}", campaign.id, options);

        let volume = campaign.volume;
        let cost = notional(campaign, volume, tick.price)?;

        self.transition(campaign, CampaignState::Buying).await?;

        let order = self.record_order(campaign, Side::Buy, volume, cost).await?;
        campaign.buy_order = Some(order.clone());

        self.transition(campaign, CampaignState::Sell).await?;

        warn!(
            "BUY campaign={} {}/{} size={} @ {} notional={}",
            campaign.id, campaign.provider, campaign.product_id, order.size, tick.price, order.price
        );
        Ok(())
    }

    async fn sell(
        &self,
        tick: &TickerEvent,
        campaign: &mut Campaign,
        series: &Timeseries,
    ) -> Result<(), AlgorithmError> {
        let buy_order = campaign.buy_order.clone().ok_or_else(|| {
            AlgorithmError::Configuration(format!("campaign {} is selling without a buy order", campaign.id))
        })?;

        let margin = match campaign.sell_unit() {
            Some(SellLimitUnit::Percent) => buy_order.margin_in_percent(tick.price),
            Some(SellLimitUnit::Currency) => buy_order.margin_in_currency(tick.price),
            None => {
                return Err(AlgorithmError::Configuration(format!(
                    "campaign {} has unknown sell limit unit '{}'",
                    campaign.id, campaign.sell_limit_unit
                )))
            }
        };

        let Some(margin) = margin else {
            debug!("Campaign {}: margin indeterminate at {}", campaign.id, tick.price);
            return Ok(());
        };

        if margin < campaign.sell_limit {
            return Ok(());
        }

        let options = self.options().merged(&campaign.sell_options);
        let long_size = window(&options, LONG_TREND_SIZE);
        let short_size = window(&options, SHORT_TREND_SIZE);

        let held = series.size().await;
        if held < long_size.max(short_size) {
            debug!(
                "Campaign {}: not enough history ({held} < {})",
                campaign.id,
                long_size.max(short_size)
            );
            return Ok(());
        }

        let long_trend = series.trending(long_size).await?;
        let short_trend = series.trending(short_size).await?;

        if long_trend != TrendType::Increasing || short_trend != TrendType::Decreasing {
            debug!(
                "Campaign {}: trend model not matched (long={long_trend:?} short={short_trend:?})",
                campaign.id
            );
            return Ok(());
        }

        let record = options.get_bool(RECORD_SELL_ORDER);
        let proceeds = if record {
            Some(notional(campaign, buy_order.size, tick.price)?)
        } else {
            None
        };

        self.transition(campaign, CampaignState::Selling).await?;

        if let Some(proceeds) = proceeds {
            let order = self.record_order(campaign, Side::Sell, buy_order.size, proceeds).await?;
            campaign.sell_order = Some(order);
        }

        self.transition(campaign, CampaignState::Buy).await?;

        warn!(
            "SELL campaign={} {}/{} size={} @ {} margin={margin}",
            campaign.id, campaign.provider, campaign.product_id, buy_order.size, tick.price
        );
        Ok(())
    }
}
