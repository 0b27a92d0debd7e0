use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::exchange::{ExchangeError, ExchangeProvider, TickerHandle};
use crate::config::CoinbaseConfig;
use crate::models::{Product, Side, TickerEvent};

/// Coinbase (ex-GDAX) public ticker feed.
///
/// One reconnecting WebSocket connection. Every product ever subscribed is
/// re-subscribed after a reconnect.
pub struct CoinbaseExchange {
    name: String,
    ticker: Arc<CoinbaseTicker>,
}

pub struct CoinbaseTicker {
    config: CoinbaseConfig,
    products: Mutex<BTreeSet<Product>>,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<Control>>>,
    tick_tx: mpsc::Sender<TickerEvent>,
    tick_rx: Mutex<Option<mpsc::Receiver<TickerEvent>>>,
}

#[derive(Debug)]
enum Control {
    Subscribe(Vec<Product>),
    Unsubscribe(Vec<Product>),
}

#[derive(Serialize)]
struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    channels: Vec<Channel>,
}

#[derive(Serialize)]
struct Channel {
    name: &'static str,
    product_ids: Vec<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct TickerMsg {
    product_id: String,
    price: Decimal,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    last_size: Option<Decimal>,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

impl CoinbaseExchange {
    pub fn new(name: &str, config: CoinbaseConfig, buffer: usize) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::channel(buffer.max(1));
        Self {
            name: name.to_string(),
            ticker: Arc::new(CoinbaseTicker {
                config,
                products: Mutex::new(BTreeSet::new()),
                control_tx,
                control_rx: Mutex::new(Some(control_rx)),
                tick_tx,
                tick_rx: Mutex::new(Some(tick_rx)),
            }),
        }
    }

    /// Spawn the connection task. Calling it twice has no effect.
    pub async fn start(&self, shutdown: broadcast::Receiver<()>) {
        let Some(control_rx) = self.ticker.control_rx.lock().await.take() else {
            warn!("[{}] feed already started", self.name);
            return;
        };
        let ticker = self.ticker.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            ticker.run(name, control_rx, shutdown).await;
        });
    }
}

impl ExchangeProvider for CoinbaseExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn ticker(&self) -> Arc<dyn TickerHandle> {
        self.ticker.clone()
    }
}

#[async_trait]
impl TickerHandle for CoinbaseTicker {
    async fn subscribe(&self, products: &[Product]) -> Result<(), ExchangeError> {
        self.products.lock().await.extend(products.iter().cloned());
        self.control_tx
            .send(Control::Subscribe(products.to_vec()))
            .map_err(|_| ExchangeError::Subscribe("coinbase feed is not running".into()))
    }

    async fn unsubscribe(&self, products: &[Product]) -> Result<(), ExchangeError> {
        {
            let mut held = self.products.lock().await;
            for p in products {
                held.remove(p);
            }
        }
        self.control_tx
            .send(Control::Unsubscribe(products.to_vec()))
            .map_err(|_| ExchangeError::Subscribe("coinbase feed is not running".into()))
    }

    async fn channel(&self) -> Result<mpsc::Receiver<TickerEvent>, ExchangeError> {
        self.tick_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ExchangeError::ChannelTaken("coinbase".into()))
    }
}

impl CoinbaseTicker {
    async fn run(
        &self,
        name: String,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let ws_url = self.config.ws_url.clone();
        let mut backoff_ms: u64 = 500;

        loop {
            info!("[{name}] connecting to {ws_url}");

            let conn = tokio::select! {
                result = connect_async(ws_url.as_str()) => result,
                _ = shutdown.recv() => {
                    info!("[{name}] feed shutdown");
                    return;
                }
            };

            match conn {
                Ok((ws_stream, _)) => {
                    info!("[{name}] connected");
                    backoff_ms = 500;

                    let (mut write, mut read) = ws_stream.split();

                    let held: Vec<Product> = self.products.lock().await.iter().cloned().collect();
                    if !held.is_empty() {
                        if let Err(e) = write.send(Message::Text(subscribe_payload("subscribe", &held))).await {
                            warn!("[{name}] resubscribe failed: {e}");
                        }
                    }

                    loop {
                        tokio::select! {
                            msg = read.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let Some(tick) = parse_message(&name, &text) else {
                                        continue;
                                    };
                                    if self.tick_tx.send(tick).await.is_err() {
                                        info!("[{name}] tick consumer gone, closing feed");
                                        return;
                                    }
                                }
                                Some(Ok(Message::Ping(_))) => debug!("[{name}] ping"),
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!("[{name}] ws error: {e}");
                                    break;
                                }
                                None => {
                                    warn!("[{name}] ws stream ended");
                                    break;
                                }
                            },
                            ctl = control_rx.recv() => {
                                let Some(ctl) = ctl else { return };
                                let payload = match &ctl {
                                    Control::Subscribe(p) => subscribe_payload("subscribe", p),
                                    Control::Unsubscribe(p) => subscribe_payload("unsubscribe", p),
                                };
                                debug!("[{name}] {ctl:?}");
                                if let Err(e) = write.send(Message::Text(payload)).await {
                                    warn!("[{name}] control send failed: {e}");
                                    break;
                                }
                            }
                            _ = shutdown.recv() => {
                                info!("[{name}] feed shutdown");
                                let _ = write.close().await;
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("[{name}] connection failed: {e}");
                }
            }

            warn!("[{name}] reconnecting in {backoff_ms}ms");
            tokio::select! {
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)) => {}
                _ = shutdown.recv() => {
                    info!("[{name}] feed shutdown");
                    return;
                }
            }
            backoff_ms = (backoff_ms * 2).min(30_000);
        }
    }
}

fn subscribe_payload(kind: &str, products: &[Product]) -> String {
    let request = SubscribeRequest {
        kind,
        channels: vec![Channel {
            name: "ticker",
            product_ids: products.iter().map(Product::to_string).collect(),
        }],
    };
    // a struct of strings always serializes
    serde_json::to_string(&request).unwrap_or_default()
}

/// Turn one feed frame into a tick. Non-ticker frames yield `None`.
fn parse_message(name: &str, text: &str) -> Option<TickerEvent> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!("[{name}] unparseable frame: {e}");
            return None;
        }
    };

    match envelope.kind.as_str() {
        "ticker" => {}
        "error" => {
            warn!(
                "[{name}] feed error: {} {}",
                envelope.message.unwrap_or_default(),
                envelope.reason.unwrap_or_default()
            );
            return None;
        }
        other => {
            debug!("[{name}] ignoring {other} frame");
            return None;
        }
    }

    let msg: TickerMsg = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("[{name}] bad ticker frame: {e}");
            return None;
        }
    };

    let product = match msg.product_id.parse::<Product>() {
        Ok(p) => p,
        Err(e) => {
            warn!("[{name}] {e}");
            return None;
        }
    };

    let side = match msg.side.as_deref() {
        Some("sell") => Side::Sell,
        _ => Side::Buy,
    };

    Some(TickerEvent {
        product,
        price: msg.price,
        side,
        size: msg.last_size.unwrap_or_default(),
        time: msg.time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_ticker_frame() {
        let frame = r#"{
            "type": "ticker",
            "trade_id": 20153558,
            "sequence": 3262786978,
            "time": "2017-09-02T17:05:49.250000Z",
            "product_id": "BTC-EUR",
            "price": "4388.01000000",
            "side": "sell",
            "last_size": "0.03000000",
            "best_bid": "4388",
            "best_ask": "4388.01"
        }"#;

        let tick = parse_message("gdax", frame).unwrap();
        assert_eq!(tick.product, Product::new("BTC", "EUR"));
        assert_eq!(tick.price, dec!(4388.01));
        assert_eq!(tick.side, Side::Sell);
        assert_eq!(tick.size, dec!(0.03));
        assert_eq!(tick.timestamp(), Some(1_504_371_949));
    }

    #[test]
    fn test_first_ticker_without_trade_has_no_time() {
        let frame = r#"{"type":"ticker","sequence":1,"product_id":"ETH-EUR","price":"250.10"}"#;
        let tick = parse_message("gdax", frame).unwrap();
        assert_eq!(tick.timestamp(), None);
        assert_eq!(tick.size, Decimal::ZERO);
    }

    #[test]
    fn test_non_ticker_frames_are_ignored() {
        assert!(parse_message("gdax", r#"{"type":"subscriptions","channels":[]}"#).is_none());
        assert!(parse_message("gdax", r#"{"type":"heartbeat","sequence":1}"#).is_none());
        assert!(parse_message("gdax", r#"{"type":"error","message":"Failed to subscribe"}"#).is_none());
        assert!(parse_message("gdax", "not json").is_none());
    }

    #[test]
    fn test_subscribe_payload() {
        let payload = subscribe_payload("subscribe", &[Product::new("btc", "eur")]);
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "subscribe",
                "channels": [{"name": "ticker", "product_ids": ["BTC-EUR"]}]
            })
        );
    }

    #[tokio::test]
    async fn test_subscribe_before_start_keeps_products() {
        let exchange = CoinbaseExchange::new("gdax", CoinbaseConfig::default(), 8);
        let ticker = exchange.ticker();
        ticker.subscribe(&[Product::new("BTC", "EUR")]).await.unwrap();
        assert_eq!(exchange.ticker.products.lock().await.len(), 1);
        assert!(ticker.channel().await.is_ok());
        assert!(ticker.channel().await.is_err());
    }
}
