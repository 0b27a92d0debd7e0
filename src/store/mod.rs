pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Campaign, CampaignState, Order, Product};

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Campaign persistence. Each call is an atomic single-entity upsert or read.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Campaigns of `provider`/`product` currently in one of `states`.
    /// No match is an empty list, not an error.
    async fn find_by_provider_product_state(
        &self,
        provider: &str,
        product: &Product,
        states: &[CampaignState],
    ) -> Result<Vec<Campaign>, StoreError>;

    /// Upsert by id. Assigns the id on first save and stamps timestamps.
    async fn save_campaign(&self, campaign: &mut Campaign) -> Result<(), StoreError>;

    async fn all(&self) -> Result<Vec<Campaign>, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or update. Assigns the id on first save.
    async fn save_order(&self, order: &mut Order) -> Result<(), StoreError>;

    /// Orders linked to `campaign_id`, oldest first.
    async fn orders_for_campaign(&self, campaign_id: u64) -> Result<Vec<Order>, StoreError>;
}
