//! Per-manager aggregates: green/red zones and sales performance.

use crate::application::use_cases::analytics::mean;
use crate::domain::deal::ScoredDeal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GREEN_ZONE_MIN_HEALTH: f64 = 70.0;
pub const GREEN_ZONE_MAX_NO_TASKS: usize = 2;
pub const GREEN_ZONE_MAX_STUCK: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Green,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerZone {
    pub manager_id: i64,
    pub manager: String,
    pub deals: usize,
    pub health_avg: f64,
    pub potential_sum: u64,
    pub amount_sum: f64,
    pub no_tasks: usize,
    pub stuck: usize,
    pub lost: usize,
    pub zone: Zone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerPerformance {
    pub manager: String,
    pub deals: usize,
    pub revenue: f64,
    pub health_avg: f64,
    pub won: usize,
    pub lost: usize,
    pub conversion_pct: f64,
    pub base_quality_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConversion {
    pub stage: String,
    pub deals: usize,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerFunnel {
    pub manager: String,
    pub funnel: String,
    pub stages: Vec<StageConversion>,
}

pub fn zone_for(health_avg: f64, no_tasks: usize, stuck: usize) -> Zone {
    if health_avg >= GREEN_ZONE_MIN_HEALTH
        && no_tasks <= GREEN_ZONE_MAX_NO_TASKS
        && stuck <= GREEN_ZONE_MAX_STUCK
    {
        Zone::Green
    } else {
        Zone::Red
    }
}

/// Splits managers into green and red zones, ordered green first, then by
/// average health descending.
pub fn manager_zones(deals: &[ScoredDeal]) -> Vec<ManagerZone> {
    let mut by_manager: BTreeMap<i64, Vec<&ScoredDeal>> = BTreeMap::new();
    for deal in deals {
        by_manager.entry(deal.manager_id).or_default().push(deal);
    }

    let mut zones: Vec<ManagerZone> = by_manager
        .into_iter()
        .map(|(manager_id, deals)| {
            let health_avg = mean(deals.iter().map(|d| d.health as f64));
            let no_tasks = deals.iter().filter(|d| d.flags.no_tasks).count();
            let stuck = deals.iter().filter(|d| d.flags.stuck).count();
            ManagerZone {
                manager_id,
                manager: deals[0].manager.clone(),
                deals: deals.len(),
                health_avg,
                potential_sum: deals.iter().map(|d| d.potential as u64).sum(),
                amount_sum: deals.iter().map(|d| d.amount).sum(),
                no_tasks,
                stuck,
                lost: deals.iter().filter(|d| d.flags.lost).count(),
                zone: zone_for(health_avg, no_tasks, stuck),
            }
        })
        .collect();

    zones.sort_by(|a, b| {
        let rank = |z: Zone| if z == Zone::Green { 0 } else { 1 };
        rank(a.zone)
            .cmp(&rank(b.zone))
            .then_with(|| b.health_avg.total_cmp(&a.health_avg))
    });
    zones
}

pub fn manager_performance(deals: &[ScoredDeal]) -> Vec<ManagerPerformance> {
    let mut by_manager: BTreeMap<String, Vec<&ScoredDeal>> = BTreeMap::new();
    for deal in deals {
        by_manager.entry(deal.manager.clone()).or_default().push(deal);
    }

    by_manager
        .into_iter()
        .map(|(manager, deals)| {
            let total = deals.len();
            let won = deals.iter().filter(|d| d.success).count();
            let missing_links = deals
                .iter()
                .map(|d| d.flags.no_company as usize + d.flags.no_contact as usize)
                .sum::<usize>();
            ManagerPerformance {
                manager,
                deals: total,
                revenue: deals.iter().filter(|d| d.success).map(|d| d.amount).sum(),
                health_avg: round1(mean(deals.iter().map(|d| d.health as f64))),
                won,
                lost: deals.iter().filter(|d| d.failure).count(),
                conversion_pct: round1(won as f64 / total as f64 * 100.0),
                base_quality_pct: round1(100.0 - missing_links as f64 / (total * 2) as f64 * 100.0),
            }
        })
        .collect()
}

/// Share of each manager's deals sitting in each stage, per funnel.
pub fn stage_conversion(deals: &[ScoredDeal]) -> Vec<ManagerFunnel> {
    let mut grouped: BTreeMap<(String, String), BTreeMap<String, usize>> = BTreeMap::new();
    for deal in deals {
        *grouped
            .entry((deal.manager.clone(), deal.funnel.clone()))
            .or_default()
            .entry(deal.stage_name.clone())
            .or_insert(0) += 1;
    }

    grouped
        .into_iter()
        .map(|((manager, funnel), stages)| {
            let total: usize = stages.values().sum();
            let mut stages: Vec<StageConversion> = stages
                .into_iter()
                .map(|(stage, count)| StageConversion {
                    stage,
                    deals: count,
                    share_pct: round1(count as f64 / total as f64 * 100.0),
                })
                .collect();
            stages.sort_by(|a, b| b.deals.cmp(&a.deals).then_with(|| a.stage.cmp(&b.stage)));
            ManagerFunnel { manager, funnel, stages }
        })
        .collect()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::analytics::test_support::deal;

    #[test]
    fn test_zone_thresholds() {
        assert_eq!(zone_for(70.0, 2, 2), Zone::Green);
        assert_eq!(zone_for(69.9, 0, 0), Zone::Red);
        assert_eq!(zone_for(90.0, 3, 0), Zone::Red);
        assert_eq!(zone_for(90.0, 0, 3), Zone::Red);
    }

    #[test]
    fn test_manager_zones_aggregate_per_manager() {
        let a = deal(1, 100, 10.0);
        let b = deal(2, 60, 20.0);
        let mut c = deal(3, 20, 5.0);
        c.manager_id = 2;
        c.manager = "Boris".into();
        c.flags.lost = true;

        let zones = manager_zones(&[a, b, c]);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].manager, "Anna");
        assert_eq!(zones[0].zone, Zone::Green);
        assert_eq!(zones[0].health_avg, 80.0);
        assert_eq!(zones[0].amount_sum, 30.0);
        assert_eq!(zones[1].zone, Zone::Red);
        assert_eq!(zones[1].lost, 1);
    }

    #[test]
    fn test_manager_performance_conversion_and_base_quality() {
        let mut won = deal(1, 80, 1000.0);
        won.success = true;
        let mut missing = deal(2, 40, 50.0);
        missing.flags.no_company = true;
        missing.flags.no_contact = true;
        let mut failed = deal(3, 10, 50.0);
        failed.failure = true;
        failed.flags.no_contact = true;

        let perf = manager_performance(&[won, missing, failed]);
        assert_eq!(perf.len(), 1);
        let anna = &perf[0];
        assert_eq!(anna.revenue, 1000.0);
        assert_eq!(anna.won, 1);
        assert_eq!(anna.lost, 1);
        assert_eq!(anna.conversion_pct, 33.3);
        assert_eq!(anna.base_quality_pct, 50.0);
    }

    #[test]
    fn test_stage_conversion_shares() {
        let a = deal(1, 50, 0.0);
        let b = deal(2, 50, 0.0);
        let mut c = deal(3, 50, 0.0);
        c.stage_name = "Invoice".into();
        let funnels = stage_conversion(&[a, b, c]);
        assert_eq!(funnels.len(), 1);
        assert_eq!(funnels[0].stages[0], StageConversion { stage: "New".into(), deals: 2, share_pct: 66.7 });
        assert_eq!(funnels[0].stages[1].share_pct, 33.3);
    }
}
