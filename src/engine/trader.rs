use tracing::{debug, error, info};

use super::Shared;
use crate::models::{Campaign, CampaignState, Side, TickerEvent};
use crate::signals::Timeseries;
use crate::strategies::AlgorithmError;

/// Algorithm named by the campaign for its current phase, else the default.
fn algorithm_name<'a>(campaign: &'a Campaign, selling: bool, default: &'a str) -> &'a str {
    let named = if selling {
        campaign.sell_algorithm.trim()
    } else {
        campaign.buy_algorithm.trim()
    };
    if named.is_empty() {
        default
    } else {
        named
    }
}

/// Evaluate every active campaign of `provider`/`tick.product` against one tick.
///
/// Failures are scoped to a single campaign and only logged.
pub(crate) async fn trade(shared: &Shared, provider: &str, tick: &TickerEvent, series: &Timeseries) {
    let campaigns = match shared
        .campaigns
        .find_by_provider_product_state(provider, &tick.product, &CampaignState::ACTIVE)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            error!("Find campaigns failed for {provider}/{}: {e}", tick.product);
            return;
        }
    };
    let count = campaigns.len();

    for mut campaign in campaigns {
        let selling = !campaign.is_state(CampaignState::Buy);
        let name = algorithm_name(&campaign, selling, &shared.default_algorithm).to_string();

        let algorithm = match shared.algorithms.get(&name) {
            Ok(a) => a,
            Err(e) => {
                error!("Campaign {}: get algorithm failed: {e}", campaign.id);
                continue;
            }
        };

        let result = if selling {
            algorithm.sell(tick, &mut campaign, series).await
        } else {
            algorithm.buy(tick, &mut campaign, series).await
        };

        match result {
            Ok(()) => {}
            Err(AlgorithmError::Regression(e)) => {
                debug!("Campaign {}: skipping decision, {e}", campaign.id);
            }
            Err(e) => error!("Campaign {} [{name}]: {e}", campaign.id),
        }
    }

    let arrow = match tick.side {
        Side::Sell => "↘",
        Side::Buy => "↗",
    };
    info!(
        side = ?tick.side,
        campaigns = count,
        volume = %tick.size,
        "{} Price: {} {arrow}",
        tick.product.from,
        tick.price
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Product;
    use rust_decimal_macros::dec;

    #[test]
    fn test_algorithm_name_falls_back_to_default() {
        let mut c = Campaign::new("gdax", Product::new("BTC", "EUR"), dec!(1), dec!(1), dec!(1), "percent");
        assert_eq!(algorithm_name(&c, false, "trend"), "trend");

        c.buy_algorithm = "grid".into();
        c.sell_algorithm = " ".into();
        assert_eq!(algorithm_name(&c, false, "trend"), "grid");
        assert_eq!(algorithm_name(&c, true, "trend"), "trend");
    }
}
