mod trader;

use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::feeds::{ExchangeError, ExchangeProvider, ExchangeRegistry, TickerHandle};
use crate::models::{Campaign, CampaignState, Order, Product, Side, TickerEvent};
use crate::signals::Timeseries;
use crate::store::{CampaignStore, OrderStore, StoreError};
use crate::strategies::AlgorithmRegistry;
use crate::telemetry::latency::LatencyTracker;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("timeseries '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("engine is not running")]
    NotRunning,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine was stopped and cannot be restarted")]
    Stopped,
}

/// A tick after it was appended to its series, for live observers.
#[derive(Debug, Clone)]
pub struct TickNotification {
    pub key: String,
    pub tick: TickerEvent,
}

type Reply = oneshot::Sender<Result<(), EngineError>>;

enum EngineEvent {
    RunTicker {
        exchange: Arc<dyn ExchangeProvider>,
        reply: Reply,
    },
    SubscribeProduct {
        provider: String,
        products: Vec<Product>,
        reply: Reply,
    },
    Done,
}

/// State reachable from both the coordinator and the pumps.
pub(crate) struct Shared {
    campaigns: Arc<dyn CampaignStore>,
    algorithms: Arc<AlgorithmRegistry>,
    default_algorithm: String,
    /// Written only by the coordinator; read by pumps and callers.
    timeseries: DashMap<String, Arc<Timeseries>>,
    ticks_tx: broadcast::Sender<TickNotification>,
    latency: LatencyTracker,
    running_pumps: AtomicUsize,
}

struct Running {
    events_tx: mpsc::Sender<EngineEvent>,
    coordinator: JoinHandle<()>,
}

/// Routes ticks from every subscribed venue into per-instrument series and
/// through the campaigns waiting on them.
///
/// One coordinator task owns the ticker handles and the series map; one pump
/// task per provider consumes that provider's ticks in order.
pub struct Engine {
    config: EngineConfig,
    shared: Arc<Shared>,
    orders: Arc<dyn OrderStore>,
    exchanges: Arc<ExchangeRegistry>,
    running: Mutex<Option<Running>>,
    /// Set by `stop`. Ticker channels are taken once, so a stopped engine stays stopped.
    stopped: AtomicBool,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        campaigns: Arc<dyn CampaignStore>,
        orders: Arc<dyn OrderStore>,
        exchanges: Arc<ExchangeRegistry>,
        algorithms: Arc<AlgorithmRegistry>,
    ) -> Self {
        let (ticks_tx, _) = broadcast::channel(1024);
        Self {
            shared: Arc::new(Shared {
                campaigns,
                algorithms,
                default_algorithm: config.default_algorithm.clone(),
                timeseries: DashMap::new(),
                ticks_tx,
                latency: LatencyTracker::new(1000),
                running_pumps: AtomicUsize::new(0),
            }),
            config,
            orders,
            exchanges,
            running: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Settle campaigns left in a transient state, spawn the coordinator, then
    /// subscribe every distinct (provider, product) found in the store.
    pub async fn start(&self) -> Result<(), EngineError> {
        let campaigns = {
            let mut running = self.running.lock().await;
            if running.is_some() {
                return Err(EngineError::AlreadyRunning);
            }
            if self.stopped.load(Ordering::SeqCst) {
                return Err(EngineError::Stopped);
            }

            let mut campaigns = self.shared.campaigns.all().await?;
            for campaign in campaigns.iter_mut() {
                self.recover(campaign).await?;
            }

            let (events_tx, events_rx) = mpsc::channel(64);
            let coordinator = Coordinator {
                shared: self.shared.clone(),
                capacity: self.config.timeseries_capacity,
                tickers: HashMap::new(),
                pumps: Vec::new(),
                shutdown_tx: broadcast::channel(1).0,
            };
            *running = Some(Running {
                events_tx,
                coordinator: tokio::spawn(coordinator.run(events_rx)),
            });
            campaigns
        };

        let mut providers: BTreeMap<String, BTreeSet<Product>> = BTreeMap::new();
        for c in &campaigns {
            providers
                .entry(c.provider.clone())
                .or_default()
                .insert(c.product_id.clone());
        }

        info!(
            "Engine started: {} campaigns across {} providers",
            campaigns.len(),
            providers.len()
        );

        for (provider, products) in providers {
            let products: Vec<Product> = products.into_iter().collect();
            if let Err(e) = self.subscribe_product(&provider, products).await {
                error!("Subscribe {provider} failed: {e}");
            }
        }
        Ok(())
    }

    /// Stop the coordinator and every pump. When this returns no engine task is alive.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let Running {
            events_tx,
            coordinator,
        } = self.running.lock().await.take().ok_or(EngineError::NotRunning)?;
        self.stopped.store(true, Ordering::SeqCst);

        if events_tx.send(EngineEvent::Done).await.is_err() {
            warn!("Coordinator already gone");
        }
        if let Err(e) = coordinator.await {
            error!("Coordinator task failed: {e}");
        }

        self.shared.latency.log_summary();
        info!("Engine stopped");
        Ok(())
    }

    /// Persist a campaign. The first save of a campaign also subscribes its
    /// product, so ingestion starts without a restart. Before `start` the
    /// subscription is left to `start` itself.
    pub async fn save_campaign(&self, campaign: &mut Campaign) -> Result<(), EngineError> {
        let is_new = campaign.is_new();
        self.shared.campaigns.save_campaign(campaign).await?;

        if is_new && self.is_running().await {
            self.subscribe_product(&campaign.provider, vec![campaign.product_id.clone()])
                .await?;
        }
        Ok(())
    }

    /// Make sure the provider's pump runs, create the missing series and
    /// subscribe `products` on the provider's ticker.
    pub async fn subscribe_product(&self, provider: &str, products: Vec<Product>) -> Result<(), EngineError> {
        let exchange = self.exchanges.get(provider)?;

        let (reply, done) = oneshot::channel();
        self.send(EngineEvent::RunTicker { exchange, reply }).await?;
        done.await.map_err(|_| EngineError::NotRunning)??;

        let (reply, done) = oneshot::channel();
        self.send(EngineEvent::SubscribeProduct {
            provider: provider.to_string(),
            products,
            reply,
        })
        .await?;
        done.await.map_err(|_| EngineError::NotRunning)?
    }

    /// Series for `{provider}-{FROM}-{TO}`.
    pub fn get_timeseries(&self, key: &str) -> Result<Arc<Timeseries>, EngineError> {
        self.shared
            .timeseries
            .get(key)
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::NotFound(key.to_string()))
    }

    pub fn watch_ticks(&self) -> broadcast::Receiver<TickNotification> {
        self.shared.ticks_tx.subscribe()
    }

    pub fn running_pumps(&self) -> usize {
        self.shared.running_pumps.load(Ordering::SeqCst)
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.shared.latency
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn send(&self, event: EngineEvent) -> Result<(), EngineError> {
        let events_tx = self
            .running
            .lock()
            .await
            .as_ref()
            .map(|r| r.events_tx.clone())
            .ok_or(EngineError::NotRunning)?;
        events_tx.send(event).await.map_err(|_| EngineError::NotRunning)
    }

    /// Re-derive a stable state for a campaign persisted mid-transition.
    ///
    /// An order newer than the one attached means the transition got past
    /// its order write and is completed; otherwise it is rolled back.
    async fn recover(&self, campaign: &mut Campaign) -> Result<(), EngineError> {
        let (side, attached) = match campaign.state {
            CampaignState::Buying => (Side::Buy, campaign.buy_order.as_ref()),
            CampaignState::Selling => (Side::Sell, campaign.sell_order.as_ref()),
            _ => return Ok(()),
        };
        let attached_id = attached.map(|o| o.id).unwrap_or(0);

        let newer: Option<Order> = self
            .orders
            .orders_for_campaign(campaign.id)
            .await?
            .into_iter()
            .filter(|o| o.side == side && o.id > attached_id)
            .max_by_key(|o| o.id);

        let from = campaign.state;
        match (side, newer) {
            (Side::Buy, Some(order)) => {
                campaign.buy_order = Some(order);
                campaign.state = CampaignState::Sell;
            }
            (Side::Buy, None) => campaign.state = CampaignState::Buy,
            (Side::Sell, Some(order)) => {
                campaign.sell_order = Some(order);
                campaign.state = CampaignState::Buy;
            }
            (Side::Sell, None) => campaign.state = CampaignState::Sell,
        }

        warn!(
            "Campaign {} recovered from {:?} to {:?}",
            campaign.id, from, campaign.state
        );
        self.shared.campaigns.save_campaign(campaign).await?;
        Ok(())
    }
}

struct Coordinator {
    shared: Arc<Shared>,
    capacity: usize,
    tickers: HashMap<String, Arc<dyn TickerHandle>>,
    pumps: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Coordinator {
    async fn run(mut self, mut events: mpsc::Receiver<EngineEvent>) {
        debug!("Coordinator running");

        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::RunTicker { exchange, reply } => {
                    let _ = reply.send(self.run_ticker(exchange).await);
                }
                EngineEvent::SubscribeProduct {
                    provider,
                    products,
                    reply,
                } => {
                    let _ = reply.send(self.subscribe_product(&provider, &products).await);
                }
                EngineEvent::Done => break,
            }
        }

        let _ = self.shutdown_tx.send(());
        for pump in self.pumps.drain(..) {
            if let Err(e) = pump.await {
                error!("Ticker pump failed: {e}");
            }
        }
        debug!("Coordinator stopped");
    }

    async fn run_ticker(&mut self, exchange: Arc<dyn ExchangeProvider>) -> Result<(), EngineError> {
        let provider = exchange.name().to_string();
        if self.tickers.contains_key(&provider) {
            return Ok(());
        }

        let ticker = exchange.ticker();
        let ticks = ticker.channel().await?;
        self.tickers.insert(provider.clone(), ticker);

        debug!("Run {provider} ticker");
        self.shared.running_pumps.fetch_add(1, Ordering::SeqCst);
        let pump = tokio::spawn(pump(
            provider,
            ticks,
            self.shutdown_tx.subscribe(),
            self.shared.clone(),
        ));
        self.pumps.push(pump);
        Ok(())
    }

    async fn subscribe_product(&mut self, provider: &str, products: &[Product]) -> Result<(), EngineError> {
        let capacity = self.capacity;
        for product in products {
            self.shared
                .timeseries
                .entry(product.series_key(provider))
                .or_insert_with(|| Arc::new(Timeseries::new(capacity)));
        }

        let list: Vec<String> = products.iter().map(Product::to_string).collect();
        debug!("Subscribe to product {} on {provider} exchange", list.join(", "));

        let Some(ticker) = self.tickers.get(provider) else {
            return Err(ExchangeError::NotFound(provider.to_string()).into());
        };
        ticker.subscribe(products).await?;
        Ok(())
    }
}

/// Counts a pump as running for as long as it lives, unwinding included.
struct PumpGuard(Arc<Shared>);

impl Drop for PumpGuard {
    fn drop(&mut self) {
        self.0.running_pumps.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Consume one provider's ticks in arrival order until shutdown or until the feed closes.
async fn pump(
    provider: String,
    mut ticks: mpsc::Receiver<TickerEvent>,
    mut shutdown: broadcast::Receiver<()>,
    shared: Arc<Shared>,
) {
    let _running = PumpGuard(shared.clone());
    loop {
        let tick = tokio::select! {
            tick = ticks.recv() => match tick {
                Some(t) => t,
                None => {
                    warn!("{provider} ticker closed");
                    break;
                }
            },
            _ = shutdown.recv() => break,
        };

        let Some(time) = tick.timestamp() else {
            continue;
        };

        let key = tick.product.series_key(&provider);
        let Some(series) = shared.timeseries.get(&key).map(|e| e.value().clone()) else {
            error!("Cannot get timeseries for {key}");
            continue;
        };

        let Some(price) = tick.price.to_f64() else {
            warn!("{key}: price {} not representable", tick.price);
            continue;
        };
        series.add(time, price).await;

        let _ = shared.ticks_tx.send(TickNotification {
            key: key.clone(),
            tick: tick.clone(),
        });

        let _timer = shared.latency.start_timer(&key);
        trader::trade(&shared, &provider, &tick, &series).await;
    }

    drop(ticks);
    debug!("{provider} pump stopped");
}
