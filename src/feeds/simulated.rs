use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::exchange::{ExchangeError, ExchangeProvider, TickerHandle};
use crate::models::{Product, TickerEvent};

/// In-process venue fed through a [`SimulatedFeed`]. Used for paper trading and tests.
pub struct SimulatedExchange {
    name: String,
    ticker: Arc<SimulatedTicker>,
}

pub struct SimulatedTicker {
    name: String,
    receiver: Mutex<Option<mpsc::Receiver<TickerEvent>>>,
    subscribe_calls: Mutex<Vec<Vec<Product>>>,
    subscribed: Mutex<Vec<Product>>,
}

/// Producer side of a simulated venue.
#[derive(Clone)]
pub struct SimulatedFeed {
    sender: mpsc::Sender<TickerEvent>,
    ticker: Arc<SimulatedTicker>,
}

impl SimulatedExchange {
    pub fn new(name: &str, buffer: usize) -> (Self, SimulatedFeed) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let ticker = Arc::new(SimulatedTicker {
            name: name.to_string(),
            receiver: Mutex::new(Some(receiver)),
            subscribe_calls: Mutex::new(Vec::new()),
            subscribed: Mutex::new(Vec::new()),
        });
        let feed = SimulatedFeed {
            sender,
            ticker: ticker.clone(),
        };
        (
            Self {
                name: name.to_string(),
                ticker,
            },
            feed,
        )
    }
}

impl ExchangeProvider for SimulatedExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn ticker(&self) -> Arc<dyn TickerHandle> {
        self.ticker.clone()
    }
}

#[async_trait]
impl TickerHandle for SimulatedTicker {
    async fn subscribe(&self, products: &[Product]) -> Result<(), ExchangeError> {
        debug!("[{}] subscribe {:?}", self.name, products);
        self.subscribe_calls.lock().await.push(products.to_vec());
        let mut subscribed = self.subscribed.lock().await;
        for p in products {
            if !subscribed.contains(p) {
                subscribed.push(p.clone());
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, products: &[Product]) -> Result<(), ExchangeError> {
        self.subscribed.lock().await.retain(|p| !products.contains(p));
        Ok(())
    }

    async fn channel(&self) -> Result<mpsc::Receiver<TickerEvent>, ExchangeError> {
        self.receiver
            .lock()
            .await
            .take()
            .ok_or_else(|| ExchangeError::ChannelTaken(self.name.clone()))
    }
}

impl SimulatedFeed {
    /// Deliver one tick, waiting for buffer room.
    pub async fn push(&self, tick: TickerEvent) -> Result<(), ExchangeError> {
        self.sender
            .send(tick)
            .await
            .map_err(|_| ExchangeError::Connection(format!("{} ticker consumer is gone", self.ticker.name)))
    }

    /// True once the consumer dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Products currently subscribed, in first-subscribed order.
    pub async fn subscribed(&self) -> Vec<Product> {
        self.ticker.subscribed.lock().await.clone()
    }

    /// Every `subscribe` call received, with its product list.
    pub async fn subscribe_calls(&self) -> Vec<Vec<Product>> {
        self.ticker.subscribe_calls.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_channel_has_single_consumer() {
        let (exchange, feed) = SimulatedExchange::new("sim", 4);
        let ticker = exchange.ticker();

        let mut rx = ticker.channel().await.unwrap();
        assert!(matches!(ticker.channel().await, Err(ExchangeError::ChannelTaken(_))));

        let tick = TickerEvent::new(Product::new("BTC", "EUR"), dec!(100), Side::Buy, dec!(1), Utc::now());
        feed.push(tick.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(tick));

        drop(rx);
        assert!(feed.is_closed());
    }

    #[tokio::test]
    async fn test_subscription_bookkeeping() {
        let (exchange, feed) = SimulatedExchange::new("sim", 4);
        let ticker = exchange.ticker();
        let btc = Product::new("BTC", "EUR");
        let eth = Product::new("ETH", "EUR");

        ticker.subscribe(&[btc.clone(), eth.clone()]).await.unwrap();
        ticker.subscribe(&[btc.clone()]).await.unwrap();
        assert_eq!(feed.subscribed().await, vec![btc.clone(), eth.clone()]);
        assert_eq!(feed.subscribe_calls().await.len(), 2);

        ticker.unsubscribe(&[btc]).await.unwrap();
        assert_eq!(feed.subscribed().await, vec![eth]);
    }
}
