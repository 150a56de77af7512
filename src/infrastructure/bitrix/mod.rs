pub mod client;
pub mod fetchers;

pub use client::{BitrixClient, BitrixSettings};

use crate::domain::crm::{Category, Department, Manager, Stage, StageHistoryEntry};
use crate::domain::deal::RawDeal;
use crate::domain::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deal listing parameters; serialized as part of cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<usize>,
}

/// Read access to the CRM. Implemented by [`BitrixClient`]; mocked in tests.
#[async_trait]
pub trait CrmSource {
    async fn deals(&self, query: &DealQuery) -> Result<Vec<RawDeal>>;
    async fn users(&self) -> Result<Vec<Manager>>;
    async fn departments(&self) -> Result<Vec<Department>>;
    async fn categories(&self) -> Result<Vec<Category>>;
    /// Stages of the default pipeline plus those of `category_ids`.
    async fn stages(&self, category_ids: &[i64]) -> Result<Vec<Stage>>;
    /// Deal id -> number of open activities.
    async fn open_activity_counts(&self, deal_ids: &[i64]) -> Result<HashMap<i64, usize>>;
    async fn stage_history(&self, deal_ids: &[i64]) -> Result<Vec<StageHistoryEntry>>;
}
