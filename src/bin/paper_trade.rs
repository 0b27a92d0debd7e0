//! Paper trader
//!
//! Replays a seeded random-walk price path for one product through the
//! engine, using a simulated exchange and an in-memory store, then prints
//! every order the demo campaign produced.
//!
//! Usage:  cargo run --bin paper_trade -- [ticks] [seed]

use cryptotrader::config::EngineConfig;
use cryptotrader::engine::Engine;
use cryptotrader::feeds::{ExchangeRegistry, SimulatedExchange};
use cryptotrader::models::{Campaign, Product, Side, TickerEvent};
use cryptotrader::store::{CampaignStore, MemoryStore};
use cryptotrader::strategies::trend::{LONG_TREND_SIZE, RECORD_SELL_ORDER, SHORT_TREND_SIZE};
use cryptotrader::strategies::{AlgorithmRegistry, Options, Trend};

use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════
const PROVIDER: &str = "paper";
const START_PRICE: f64 = 6_000.0;
const DRIFT: f64 = 0.0;
const STEP_VOL: f64 = 0.004; // 0.4% per tick, 1σ
const DEFAULT_TICKS: usize = 2_000;
const DEFAULT_SEED: u64 = 7;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let ticks: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_TICKS);
    let seed: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_SEED);

    let store = Arc::new(MemoryStore::new());

    let mut algorithms = AlgorithmRegistry::new();
    algorithms.add(Arc::new(Trend::new(store.clone(), store.clone())));

    let (exchange, feed) = SimulatedExchange::new(PROVIDER, 256);
    let mut exchanges = ExchangeRegistry::new();
    exchanges.add(Arc::new(exchange));

    let engine = Engine::new(
        EngineConfig::default(),
        store.clone(),
        store.clone(),
        Arc::new(exchanges),
        Arc::new(algorithms),
    );
    engine.start().await?;

    let product = Product::new("BTC", "EUR");
    let mut campaign = Campaign::new(
        PROVIDER,
        product.clone(),
        dec!(0.05),
        Decimal::from_f64_retain(START_PRICE * 0.98).unwrap_or(dec!(5880)),
        dec!(3),
        "currency",
    );
    campaign.sell_options = Options::new()
        .with(LONG_TREND_SIZE, 60)
        .with(SHORT_TREND_SIZE, 8)
        .with(RECORD_SELL_ORDER, true);
    engine.save_campaign(&mut campaign).await?;

    // ═══ Replay ═══
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = START_PRICE;
    let t0 = Utc.timestamp_opt(1_510_000_000, 0).single().unwrap_or_else(Utc::now);

    for i in 0..ticks {
        let shock: f64 = rng.gen_range(-1.0..1.0) * STEP_VOL * 1.732; // uniform with σ = STEP_VOL
        price *= 1.0 + DRIFT + shock;

        let side = if shock < 0.0 { Side::Sell } else { Side::Buy };
        let size = Decimal::from_f64_retain(rng.gen_range(0.001..0.5)).unwrap_or(dec!(0.01)).round_dp(8);
        let tick = TickerEvent::new(
            product.clone(),
            Decimal::from_f64_retain(price).unwrap_or_default().round_dp(2),
            side,
            size,
            t0 + Duration::seconds(i as i64),
        );
        feed.push(tick).await?;
    }

    // let the pump drain the buffered ticks
    let key = product.series_key(PROVIDER);
    let series = engine.get_timeseries(&key)?;
    let expected = ticks.min(EngineConfig::default().timeseries_capacity);
    let drained = tokio::time::timeout(std::time::Duration::from_secs(30), async {
        while series.size().await < expected {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Timed out waiting for the engine to drain the feed");
    }

    engine.stop().await?;

    // ═══ Report ═══
    let campaigns = store.all().await?;
    println!("\n══ Paper run: {ticks} ticks, seed {seed}, last price {price:.2} ══");
    for c in campaigns {
        println!("Campaign #{} {} {}  state={:?}", c.id, c.provider, c.product_id, c.state);
        let mut pnl = Decimal::ZERO;
        for o in &c.orders {
            match o.side {
                Side::Buy => pnl -= o.price,
                Side::Sell => pnl += o.price,
            }
            println!(
                "  #{:<4} {:<4} size={} notional={} at {}",
                o.id,
                format!("{:?}", o.side).to_uppercase(),
                o.size,
                o.price.round_dp(2),
                o.created_at.format("%H:%M:%S%.3f")
            );
        }
        println!("  realized cash flow: {}", pnl.round_dp(2));
    }
    info!("Paper run complete");
    Ok(())
}
