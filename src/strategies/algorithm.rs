use async_trait::async_trait;
use thiserror::Error;

use super::options::Options;
use crate::models::{Campaign, TickerEvent};
use crate::signals::{SignalError, Timeseries};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AlgorithmError {
    #[error("algorithm '{0}' not found")]
    NotFound(String),

    #[error("algorithm registry is not initialized")]
    RegistryNotInitialized,

    /// Trend could not be fit; the decision is skipped for this tick.
    #[error("trend indeterminate: {0}")]
    Regression(#[from] SignalError),

    #[error("campaign misconfigured: {0}")]
    Configuration(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// A pluggable entry/exit evaluator.
///
/// `buy` is called for campaigns waiting in `Buy`, `sell` for those in
/// `Sell`. Both may move the campaign through its transient state, persist
/// it, and record orders.
#[async_trait]
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &str;

    /// Default configuration, merged under each campaign's overrides.
    fn options(&self) -> Options;

    async fn buy(
        &self,
        tick: &TickerEvent,
        campaign: &mut Campaign,
        series: &Timeseries,
    ) -> Result<(), AlgorithmError>;

    async fn sell(
        &self,
        tick: &TickerEvent,
        campaign: &mut Campaign,
        series: &Timeseries,
    ) -> Result<(), AlgorithmError>;
}
