//! Loads deals (live CRM or an uploaded table), scores them and assembles the
//! dashboard report.

use crate::application::use_cases::analytics::{
    change_feed, deal_cards, failure_analysis, funnel_breakdown, headline_metrics,
    health_distribution, period_overview, problem_counts, problem_deals, stage_pulse, timeline,
    DealCard, FailureAnalysis, FunnelBreakdown, HeadlineMetrics, HealthBin, PeriodOverview,
    ProblemCount, ProblemDeals, StagePulse, Timeline,
};
use crate::application::use_cases::anomalies::{detect_anomalies, Anomaly};
use crate::application::use_cases::gradation::{gradation, Gradation};
use crate::application::use_cases::managers::{
    manager_performance, manager_zones, stage_conversion, ManagerFunnel, ManagerPerformance,
    ManagerZone,
};
use crate::application::use_cases::offline_import::OfflineDataset;
use crate::application::use_cases::periods::{period_range, previous_range};
use crate::application::use_cases::scoring::{score_deals, ScoringContext};
use crate::application::use_cases::stage_rules::{stage_sort_key, StageRules};
use crate::application::use_cases::stage_time::{stage_time_stats, StageTime};
use crate::application::use_cases::yearly_plan::{yearly_plan, YearlyPlan};
use crate::domain::crm::{stage_entry_times, CrmDirectory, Manager};
use crate::domain::deal::{RawDeal, ScoredDeal};
use crate::domain::error::{AppError, Result};
use crate::domain::period::{DateRange, Granularity, PeriodKind};
use crate::infrastructure::bitrix::{CrmSource, DealQuery};
use crate::infrastructure::db::cache::{CacheCategory, SqliteCache};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardQuery {
    pub period: PeriodKind,
    pub reference: NaiveDate,
    pub granularity: Granularity,
    pub stuck_days: i64,
    pub limit: usize,
    pub funnels: Vec<String>,
    pub managers: Vec<String>,
    pub department: Option<i64>,
    pub yearly_target: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Bitrix,
    Offline,
}

/// Scored deals of the selected and the previous period.
#[derive(Debug, Clone)]
pub struct LoadedDeals {
    pub source: DataSource,
    pub range: DateRange,
    pub previous_range: DateRange,
    pub current: Vec<ScoredDeal>,
    pub previous: Vec<ScoredDeal>,
    /// Source rows of `current`, for prompts that want the CRM's own fields.
    pub raws: Vec<RawDeal>,
    pub directory: CrmDirectory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    pub source: DataSource,
    pub range: DateRange,
    pub previous_range: DateRange,
    pub headline: HeadlineMetrics,
    pub overview: PeriodOverview,
    pub problems: Vec<ProblemCount>,
    pub problem_deals: Vec<ProblemDeals>,
    pub health_distribution: Vec<HealthBin>,
    pub funnels: Vec<FunnelBreakdown>,
    pub failures: FailureAnalysis,
    pub pulse: Vec<StagePulse>,
    pub feed: Vec<ScoredDeal>,
    pub zones: Vec<ManagerZone>,
    pub performance: Vec<ManagerPerformance>,
    pub stage_conversion: Vec<ManagerFunnel>,
    pub gradation: Gradation,
    pub stage_time: Vec<StageTime>,
    pub anomalies: Vec<Anomaly>,
    pub plan: YearlyPlan,
    pub cards: Vec<DealCard>,
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagersReport {
    pub zones: Vec<ManagerZone>,
    pub performance: Vec<ManagerPerformance>,
    pub stage_conversion: Vec<ManagerFunnel>,
}

pub struct DashboardUseCase {
    crm: Option<Arc<dyn CrmSource + Send + Sync>>,
    cache: Arc<SqliteCache>,
    rules: StageRules,
    offline: RwLock<Option<OfflineDataset>>,
}

/// Runs an auxiliary fetch; failures are logged and replaced by an empty value.
async fn best_effort<T, Fut>(what: &str, fetch: Fut) -> T
where
    T: Default,
    Fut: Future<Output = Result<T>>,
{
    match fetch.await {
        Ok(value) => value,
        Err(e) => {
            warn!(what, error = %e, "Auxiliary CRM data unavailable");
            T::default()
        }
    }
}

fn cache_params<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn created_in(deal: &ScoredDeal, range: &DateRange) -> bool {
    deal.created_date().map(|d| range.contains(d)).unwrap_or(false)
}

impl DashboardUseCase {
    pub fn new(
        crm: Option<Arc<dyn CrmSource + Send + Sync>>,
        cache: Arc<SqliteCache>,
        rules: StageRules,
    ) -> Self {
        Self {
            crm,
            cache,
            rules,
            offline: RwLock::new(None),
        }
    }

    pub fn has_crm(&self) -> bool {
        self.crm.is_some()
    }

    /// Replaces the uploaded table; it takes precedence over the live CRM.
    pub fn set_offline(&self, dataset: OfflineDataset) -> Result<()> {
        let mut slot = self
            .offline
            .write()
            .map_err(|_| AppError::Internal("Offline dataset lock poisoned".to_string()))?;
        *slot = Some(dataset);
        Ok(())
    }

    pub fn clear_offline(&self) -> Result<()> {
        let mut slot = self
            .offline
            .write()
            .map_err(|_| AppError::Internal("Offline dataset lock poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }

    fn offline_snapshot(&self) -> Result<Option<OfflineDataset>> {
        self.offline
            .read()
            .map(|slot| slot.clone())
            .map_err(|_| AppError::Internal("Offline dataset lock poisoned".to_string()))
    }

    pub fn source(&self) -> Result<Option<DataSource>> {
        if self.offline_snapshot()?.is_some() {
            Ok(Some(DataSource::Offline))
        } else if self.crm.is_some() {
            Ok(Some(DataSource::Bitrix))
        } else {
            Ok(None)
        }
    }

    async fn fetch_raw(&self, crm: &Arc<dyn CrmSource + Send + Sync>, query: &DealQuery) -> Result<Vec<RawDeal>> {
        self.cache
            .get_or_fetch(CacheCategory::Deals, &cache_params(query), || crm.deals(query))
            .await
    }

    async fn live_directory(&self, crm: &Arc<dyn CrmSource + Send + Sync>, raws: &[RawDeal]) -> CrmDirectory {
        let ids: Vec<i64> = raws.iter().filter_map(RawDeal::deal_id).collect();
        let category_ids: Vec<i64> = raws
            .iter()
            .map(RawDeal::category)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let ids_key = cache_params(&ids);
        let cache = &self.cache;

        let users = best_effort(
            "users",
            cache.get_or_fetch(CacheCategory::Users, "", || crm.users()),
        )
        .await;
        let departments = best_effort(
            "departments",
            cache.get_or_fetch(CacheCategory::Departments, "", || crm.departments()),
        )
        .await;
        let categories = best_effort(
            "categories",
            cache.get_or_fetch(CacheCategory::Categories, "", || crm.categories()),
        )
        .await;
        let stages = best_effort(
            "stages",
            cache.get_or_fetch(CacheCategory::Stages, &cache_params(&category_ids), || {
                crm.stages(&category_ids)
            }),
        )
        .await;
        let open_tasks = best_effort(
            "activities",
            cache.get_or_fetch(CacheCategory::Activities, &ids_key, || {
                crm.open_activity_counts(&ids)
            }),
        )
        .await;
        let history = best_effort(
            "stage history",
            cache.get_or_fetch(CacheCategory::StageHistory, &ids_key, || crm.stage_history(&ids)),
        )
        .await;

        let current_stage: HashMap<i64, String> = raws
            .iter()
            .filter_map(|raw| Some((raw.deal_id()?, raw.stage_id.clone()?)))
            .collect();

        CrmDirectory {
            managers: users.into_iter().map(|m| (m.id, m)).collect(),
            departments,
            stages: stages.into_iter().map(|s| (s.status_id.clone(), s)).collect(),
            categories: categories.into_iter().map(|c| (c.id, c)).collect(),
            open_tasks,
            stage_entered: stage_entry_times(&history, &current_stage),
        }
    }

    /// Offline tables carry no stages, pipelines or activities.
    fn offline_directory(dataset: &OfflineDataset) -> CrmDirectory {
        CrmDirectory {
            managers: dataset
                .managers
                .iter()
                .map(|(id, name)| {
                    (
                        *id,
                        Manager {
                            id: *id,
                            name: name.clone(),
                            departments: Vec::new(),
                            active: true,
                        },
                    )
                })
                .collect(),
            ..CrmDirectory::default()
        }
    }

    fn apply_filters(&self, deals: Vec<ScoredDeal>, query: &DashboardQuery, directory: &CrmDirectory) -> Vec<ScoredDeal> {
        deals
            .into_iter()
            .filter(|d| query.funnels.is_empty() || query.funnels.contains(&d.funnel))
            .filter(|d| query.managers.is_empty() || query.managers.contains(&d.manager))
            .filter(|d| match query.department {
                None => true,
                Some(dept) => directory
                    .managers
                    .get(&d.manager_id)
                    .map(|m| m.departments.contains(&dept))
                    .unwrap_or(false),
            })
            .collect()
    }

    async fn load_range(&self, query: &DashboardQuery, range: DateRange, previous: DateRange, now: NaiveDateTime) -> Result<LoadedDeals> {
        let (source, raws, directory) = if let Some(dataset) = self.offline_snapshot()? {
            let directory = Self::offline_directory(&dataset);
            (DataSource::Offline, dataset.deals, directory)
        } else if let Some(crm) = &self.crm {
            let deal_query = DealQuery {
                date_from: Some(previous.start.min(range.start)),
                date_to: Some(range.end.max(previous.end)),
                limit: Some(query.limit),
            };
            let raws = self.fetch_raw(crm, &deal_query).await?;
            let directory = self.live_directory(crm, &raws).await;
            (DataSource::Bitrix, raws, directory)
        } else {
            return Err(AppError::ValidationError(
                "No data source: set BITRIX24_WEBHOOK or upload a deal table".to_string(),
            ));
        };

        let ctx = ScoringContext {
            now,
            stuck_days: query.stuck_days,
            directory: &directory,
            rules: &self.rules,
        };
        let scored = self.apply_filters(score_deals(&raws, &ctx), query, &directory);
        let (current, previous_deals): (Vec<ScoredDeal>, Vec<ScoredDeal>) = scored
            .into_iter()
            .filter(|d| created_in(d, &range) || created_in(d, &previous))
            .partition(|d| created_in(d, &range));
        let current_ids: BTreeSet<i64> = current.iter().map(|d| d.id).collect();
        let raws: Vec<RawDeal> = raws
            .into_iter()
            .filter(|raw| raw.deal_id().map(|id| current_ids.contains(&id)).unwrap_or(false))
            .collect();

        info!(
            source = ?source,
            current = current.len(),
            previous = previous_deals.len(),
            "Deals loaded"
        );
        Ok(LoadedDeals {
            source,
            range,
            previous_range: previous,
            current,
            previous: previous_deals,
            raws,
            directory,
        })
    }

    pub async fn load(&self, query: &DashboardQuery) -> Result<LoadedDeals> {
        let range = period_range(query.period, query.reference);
        self.load_range(query, range, previous_range(range), Utc::now().naive_utc())
            .await
    }

    /// Yearly plan for the reference year; filters of the query still apply.
    pub async fn plan(&self, query: &DashboardQuery) -> Result<YearlyPlan> {
        let range = period_range(PeriodKind::Year, query.reference);
        let loaded = self
            .load_range(query, range, previous_range(range), Utc::now().naive_utc())
            .await?;
        Ok(yearly_plan(&loaded.current, query.yearly_target, query.reference))
    }

    pub fn managers_report(deals: &[ScoredDeal]) -> ManagersReport {
        ManagersReport {
            zones: manager_zones(deals),
            performance: manager_performance(deals),
            stage_conversion: stage_conversion(deals),
        }
    }

    pub fn build_report(&self, loaded: &LoadedDeals, query: &DashboardQuery, plan: YearlyPlan) -> DashboardReport {
        let deals = &loaded.current;
        let stages = &loaded.directory.stages;
        DashboardReport {
            source: loaded.source,
            range: loaded.range,
            previous_range: loaded.previous_range,
            headline: headline_metrics(deals),
            overview: period_overview(deals, &loaded.previous),
            problems: problem_counts(deals, &loaded.previous),
            problem_deals: problem_deals(deals),
            health_distribution: health_distribution(deals),
            funnels: funnel_breakdown(deals),
            failures: failure_analysis(deals, &self.rules),
            pulse: stage_pulse(deals, |id| stage_sort_key(id, stages)),
            feed: change_feed(deals),
            zones: manager_zones(deals),
            performance: manager_performance(deals),
            stage_conversion: stage_conversion(deals),
            gradation: gradation(deals),
            stage_time: stage_time_stats(deals),
            anomalies: detect_anomalies(deals),
            plan,
            cards: deal_cards(deals, &query.managers),
            timeline: timeline(deals, query.granularity),
        }
    }

    pub async fn report(&self, query: &DashboardQuery) -> Result<DashboardReport> {
        let loaded = self.load(query).await?;
        let plan = self.plan(query).await?;
        Ok(self.build_report(&loaded, query, plan))
    }
}
