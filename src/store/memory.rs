use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{CampaignStore, OrderStore, StoreError};
use crate::models::{Campaign, CampaignState, Order, Product};

/// In-process campaign/order store.
///
/// When opened on a file, the whole state is rewritten after each mutation
/// (temp file + rename) and reloaded on the next open.
pub struct MemoryStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    campaign_seq: u64,
    order_seq: u64,
    campaigns: BTreeMap<u64, Campaign>,
    orders: BTreeMap<u64, Order>,
}

impl StoreState {
    fn materialize(&self, campaign: &Campaign) -> Campaign {
        let mut out = campaign.clone();
        out.orders = self
            .orders
            .values()
            .filter(|o| o.campaign_id == campaign.id)
            .cloned()
            .collect();
        out
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            path: None,
        }
    }

    /// Open a file-backed store, loading the snapshot at `path` if present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoreState>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Store opened: {} ({} campaigns, {} orders)",
            path.display(),
            state.campaigns.len(),
            state.orders.len()
        );

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    pub async fn get(&self, id: u64) -> Result<Campaign, StoreError> {
        let state = self.state.read().await;
        state
            .campaigns
            .get(&id)
            .map(|c| state.materialize(c))
            .ok_or_else(|| StoreError::NotFound(format!("campaign {id}")))
    }

    /// Administrative removal. Orders of the campaign are kept.
    pub async fn delete(&self, id: u64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.campaigns.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("campaign {id}")));
        }
        self.flush(&state).await
    }

    async fn flush(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("Store flushed to {}", path.display());
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn find_by_provider_product_state(
        &self,
        provider: &str,
        product: &Product,
        states: &[CampaignState],
    ) -> Result<Vec<Campaign>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .campaigns
            .values()
            .filter(|c| c.provider == provider && &c.product_id == product && states.contains(&c.state))
            .map(|c| state.materialize(c))
            .collect())
    }

    async fn save_campaign(&self, campaign: &mut Campaign) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if campaign.id == 0 {
            state.campaign_seq += 1;
            campaign.id = state.campaign_seq;
        }
        if campaign.created_at.is_none() {
            campaign.created_at = Some(now);
        }
        campaign.updated_at = Some(now);

        let mut stored = campaign.clone();
        stored.orders.clear();
        state.campaigns.insert(stored.id, stored);

        self.flush(&state).await
    }

    async fn all(&self) -> Result<Vec<Campaign>, StoreError> {
        let state = self.state.read().await;
        Ok(state.campaigns.values().map(|c| state.materialize(c)).collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn save_order(&self, order: &mut Order) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if order.id == 0 {
            state.order_seq += 1;
            order.id = state.order_seq;
        }
        state.orders.insert(order.id, order.clone());
        self.flush(&state).await
    }

    async fn orders_for_campaign(&self, campaign_id: u64) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Side;
    use rust_decimal_macros::dec;

    fn campaign(provider: &str, from: &str) -> Campaign {
        Campaign::new(provider, Product::new(from, "EUR"), dec!(1), dec!(100), dec!(5), "percent")
    }

    #[tokio::test]
    async fn test_save_assigns_ids_and_timestamps() {
        let store = MemoryStore::new();
        let mut a = campaign("gdax", "BTC");
        let mut b = campaign("gdax", "ETH");

        store.save_campaign(&mut a).await.unwrap();
        store.save_campaign(&mut b).await.unwrap();

        assert_eq!((a.id, b.id), (1, 2));
        assert!(a.created_at.is_some());
        assert_eq!(a.created_at, a.updated_at);

        let created = a.created_at;
        a.state = CampaignState::Sell;
        store.save_campaign(&mut a).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(a.created_at, created);
        assert_eq!(store.get(1).await.unwrap().state, CampaignState::Sell);
    }

    #[tokio::test]
    async fn test_find_filters_provider_product_state() {
        let store = MemoryStore::new();
        let mut btc = campaign("gdax", "BTC");
        let mut eth = campaign("gdax", "ETH");
        let mut other = campaign("kraken", "BTC");
        let mut buying = campaign("gdax", "BTC");
        buying.state = CampaignState::Buying;
        for c in [&mut btc, &mut eth, &mut other, &mut buying] {
            store.save_campaign(c).await.unwrap();
        }

        let found = store
            .find_by_provider_product_state("gdax", &Product::new("BTC", "EUR"), &CampaignState::ACTIVE)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, btc.id);

        let none = store
            .find_by_provider_product_state("gdax", &Product::new("LTC", "EUR"), &CampaignState::ACTIVE)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_orders_are_materialized_on_read() {
        let store = MemoryStore::new();
        let mut c = campaign("gdax", "BTC");
        store.save_campaign(&mut c).await.unwrap();

        let mut order = Order::new("gdax", c.product_id.clone(), Side::Buy, dec!(1), dec!(90));
        order.campaign_id = c.id;
        store.save_order(&mut order).await.unwrap();
        assert_eq!(order.id, 1);

        let read = store.get(c.id).await.unwrap();
        assert_eq!(read.orders, vec![order.clone()]);
        assert_eq!(store.orders_for_campaign(c.id).await.unwrap(), vec![order]);
        assert!(store.orders_for_campaign(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let mut c = campaign("gdax", "BTC");
        store.save_campaign(&mut c).await.unwrap();

        store.delete(c.id).await.unwrap();
        assert!(matches!(store.get(c.id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(c.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("cryptotrader-store-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("cryptotrader.json");

        {
            let store = MemoryStore::open(&path).await.unwrap();
            let mut c = campaign("gdax", "BTC");
            store.save_campaign(&mut c).await.unwrap();
            let mut order = Order::new("gdax", c.product_id.clone(), Side::Buy, dec!(1), dec!(90));
            order.campaign_id = c.id;
            store.save_order(&mut order).await.unwrap();
        }

        let store = MemoryStore::open(&path).await.unwrap();
        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].orders.len(), 1);

        // sequences continue after reload
        let mut next = campaign("gdax", "ETH");
        store.save_campaign(&mut next).await.unwrap();
        assert_eq!(next.id, 2);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
