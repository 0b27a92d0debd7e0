use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{Product, TickerEvent};

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("exchange '{0}' not found")]
    NotFound(String),

    #[error("exchange registry is not initialized")]
    ManagerNotInitialized,

    #[error("ticker channel of '{0}' was already taken")]
    ChannelTaken(String),

    #[error("subscription failed: {0}")]
    Subscribe(String),

    #[error("connection error: {0}")]
    Connection(String),
}

/// Subscribable tick stream of one venue.
#[async_trait]
pub trait TickerHandle: Send + Sync {
    async fn subscribe(&self, products: &[Product]) -> Result<(), ExchangeError>;

    async fn unsubscribe(&self, products: &[Product]) -> Result<(), ExchangeError>;

    /// Hand over the tick stream. There is a single consumer: the first call
    /// gets the receiver, later calls fail with `ChannelTaken`.
    async fn channel(&self) -> Result<mpsc::Receiver<TickerEvent>, ExchangeError>;
}

pub trait ExchangeProvider: Send + Sync {
    fn name(&self) -> &str;

    fn ticker(&self) -> Arc<dyn TickerHandle>;
}

/// Name → exchange lookup. `Default` is uninitialized; use `new()` for an empty registry.
#[derive(Default)]
pub struct ExchangeRegistry {
    exchanges: Option<HashMap<String, Arc<dyn ExchangeProvider>>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self {
            exchanges: Some(HashMap::new()),
        }
    }

    pub fn add(&mut self, exchange: Arc<dyn ExchangeProvider>) {
        self.exchanges
            .get_or_insert_with(HashMap::new)
            .insert(exchange.name().to_string(), exchange);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ExchangeProvider>, ExchangeError> {
        self.exchanges
            .as_ref()
            .ok_or(ExchangeError::ManagerNotInitialized)?
            .get(name)
            .cloned()
            .ok_or_else(|| ExchangeError::NotFound(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.exchanges
            .as_ref()
            .is_some_and(|m| m.contains_key(name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.exchanges.iter().flat_map(|m| m.keys().cloned()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::simulated::SimulatedExchange;

    #[test]
    fn test_registry_lookup() {
        let mut registry = ExchangeRegistry::new();
        let (exchange, _feed) = SimulatedExchange::new("gdax", 8);
        registry.add(Arc::new(exchange));

        assert!(registry.has("gdax"));
        assert_eq!(registry.get("gdax").unwrap().name(), "gdax");
        assert!(matches!(registry.get("kraken"), Err(ExchangeError::NotFound(_))));
        assert_eq!(registry.names(), vec!["gdax".to_string()]);
    }

    #[test]
    fn test_uninitialized_registry() {
        let registry = ExchangeRegistry::default();
        assert!(matches!(registry.get("gdax"), Err(ExchangeError::ManagerNotInitialized)));
        assert!(!registry.has("gdax"));
    }
}
