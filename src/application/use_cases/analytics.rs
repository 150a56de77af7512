//! Dashboard aggregations over scored deals.

use crate::application::use_cases::periods::{delta, resample};
use crate::application::use_cases::stage_rules::StageRules;
use crate::domain::deal::ScoredDeal;
use crate::domain::period::{Aggregation, Bucket, Delta, Granularity};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const HEALTH_BIN_WIDTH: u8 = 5;
pub const FEED_LIMIT: usize = 200;
pub const CARD_LIMIT: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineMetrics {
    pub total_deals: usize,
    pub total_amount: f64,
    /// Mean of non-zero amounts.
    pub average_check: f64,
    pub average_health: f64,
    pub total_potential: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodOverview {
    pub deals: Delta,
    pub revenue: Delta,
    pub health: Delta,
    pub potential: Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    NoTasks,
    NoCompany,
    NoContact,
    Stuck,
    Failed,
}

impl ProblemKind {
    pub const ALL: [ProblemKind; 5] = [
        ProblemKind::NoTasks,
        ProblemKind::NoCompany,
        ProblemKind::NoContact,
        ProblemKind::Stuck,
        ProblemKind::Failed,
    ];

    pub fn matches(&self, deal: &ScoredDeal) -> bool {
        match self {
            ProblemKind::NoTasks => deal.flags.no_tasks,
            ProblemKind::NoCompany => deal.flags.no_company,
            ProblemKind::NoContact => deal.flags.no_contact,
            ProblemKind::Stuck => deal.flags.stuck,
            ProblemKind::Failed => deal.failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemCount {
    pub kind: ProblemKind,
    pub current: usize,
    pub previous: usize,
    pub change: i64,
}

/// Deals currently showing one problem, worst health first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDeals {
    pub kind: ProblemKind,
    pub deals: Vec<DealCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBin {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCount {
    pub stage: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelBreakdown {
    pub funnel: String,
    pub stages: Vec<StageCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureGroupBreakdown {
    pub label: String,
    /// Deals still sitting in one of the group's working stages.
    pub working: usize,
    pub reasons: Vec<StageCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub total: usize,
    pub reasons: Vec<StageCount>,
    pub groups: Vec<FailureGroupBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePulse {
    pub stage_id: String,
    pub amount: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Bad,
    Neutral,
    Good,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealCard {
    pub id: i64,
    pub title: String,
    pub manager: String,
    pub health: u8,
    pub potential: u8,
    pub amount: f64,
    pub days_in_work: i64,
    pub days_no_activity: i64,
    pub risks: Vec<String>,
    pub lost: bool,
    pub status: CardStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSeries {
    pub funnel: String,
    pub points: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSeries {
    pub kind: ProblemKind,
    pub points: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub deals: Vec<Bucket>,
    /// Deals created per bucket that show each problem.
    pub problems: Vec<ProblemSeries>,
    pub revenue_by_funnel: Vec<FunnelSeries>,
    pub health: Vec<Bucket>,
    pub potential: Vec<Bucket>,
}

pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

pub fn revenue<'a, I: IntoIterator<Item = &'a ScoredDeal>>(deals: I) -> f64 {
    deals.into_iter().filter(|d| d.success).map(|d| d.amount).sum()
}

pub fn headline_metrics(deals: &[ScoredDeal]) -> HeadlineMetrics {
    HeadlineMetrics {
        total_deals: deals.len(),
        total_amount: deals.iter().map(|d| d.amount).sum(),
        average_check: mean(deals.iter().map(|d| d.amount).filter(|a| *a != 0.0)),
        average_health: mean(deals.iter().map(|d| d.health as f64)),
        total_potential: deals.iter().map(|d| d.potential as u64).sum(),
    }
}

pub fn period_overview(current: &[ScoredDeal], previous: &[ScoredDeal]) -> PeriodOverview {
    PeriodOverview {
        deals: delta(current.len() as f64, previous.len() as f64),
        revenue: delta(revenue(current), revenue(previous)),
        health: delta(
            mean(current.iter().map(|d| d.health as f64)),
            mean(previous.iter().map(|d| d.health as f64)),
        ),
        potential: delta(
            mean(current.iter().map(|d| d.potential as f64)),
            mean(previous.iter().map(|d| d.potential as f64)),
        ),
    }
}

pub fn problem_counts(current: &[ScoredDeal], previous: &[ScoredDeal]) -> Vec<ProblemCount> {
    ProblemKind::ALL
        .iter()
        .map(|kind| {
            let now = current.iter().filter(|d| kind.matches(d)).count();
            let before = previous.iter().filter(|d| kind.matches(d)).count();
            ProblemCount {
                kind: *kind,
                current: now,
                previous: before,
                change: now as i64 - before as i64,
            }
        })
        .collect()
}

pub fn problem_deals(deals: &[ScoredDeal]) -> Vec<ProblemDeals> {
    ProblemKind::ALL
        .iter()
        .map(|kind| {
            let mut matching: Vec<&ScoredDeal> = deals.iter().filter(|d| kind.matches(d)).collect();
            sort_for_cards(&mut matching);
            ProblemDeals {
                kind: *kind,
                deals: matching.into_iter().take(FEED_LIMIT).map(deal_card).collect(),
            }
        })
        .collect()
}

/// Index of the 5-point health bin; `0-5%` includes 0, later bins are
/// left-open (`5-10%` holds 6..=10).
pub fn health_bin_index(health: u8) -> usize {
    if health <= HEALTH_BIN_WIDTH {
        return 0;
    }
    (((health.min(100) - 1) / HEALTH_BIN_WIDTH) as usize).min(19)
}

pub fn health_distribution(deals: &[ScoredDeal]) -> Vec<HealthBin> {
    let mut counts = [0usize; 20];
    for deal in deals {
        counts[health_bin_index(deal.health)] += 1;
    }
    counts
        .iter()
        .enumerate()
        .map(|(idx, count)| {
            let low = idx * HEALTH_BIN_WIDTH as usize;
            HealthBin {
                label: format!("{}-{}%", low, low + HEALTH_BIN_WIDTH as usize),
                count: *count,
            }
        })
        .collect()
}

/// Counts per key, sorted by count descending then key.
pub fn count_by<'a, I, F>(deals: I, key: F) -> Vec<StageCount>
where
    I: IntoIterator<Item = &'a ScoredDeal>,
    F: Fn(&ScoredDeal) -> String,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for deal in deals {
        *counts.entry(key(deal)).or_insert(0) += 1;
    }
    let mut out: Vec<StageCount> = counts
        .into_iter()
        .map(|(stage, count)| StageCount { stage, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.stage.cmp(&b.stage)));
    out
}

pub fn funnel_breakdown(deals: &[ScoredDeal]) -> Vec<FunnelBreakdown> {
    let mut by_funnel: BTreeMap<String, Vec<&ScoredDeal>> = BTreeMap::new();
    for deal in deals {
        by_funnel.entry(deal.funnel.clone()).or_default().push(deal);
    }
    by_funnel
        .into_iter()
        .map(|(funnel, deals)| FunnelBreakdown {
            funnel,
            stages: count_by(deals, |d| d.stage_name.clone()),
        })
        .collect()
}

pub fn failure_analysis(deals: &[ScoredDeal], rules: &StageRules) -> FailureAnalysis {
    let failures: Vec<&ScoredDeal> = deals.iter().filter(|d| d.failure).collect();
    let groups = rules
        .failure_groups
        .iter()
        .map(|group| FailureGroupBreakdown {
            label: group.label.clone(),
            working: deals
                .iter()
                .filter(|d| group.main_stages.iter().any(|s| s == &d.stage_name))
                .count(),
            reasons: count_by(
                failures
                    .iter()
                    .copied()
                    .filter(|d| group.failure_stages.iter().any(|s| s == &d.stage_name)),
                |d| d.stage_name.clone(),
            ),
        })
        .collect();

    FailureAnalysis {
        total: failures.len(),
        reasons: count_by(failures.iter().copied(), |d| d.stage_name.clone()),
        groups,
    }
}

/// Amount and count per stage id, ordered by the supplied sort key.
pub fn stage_pulse<F>(deals: &[ScoredDeal], sort_key: F) -> Vec<StagePulse>
where
    F: Fn(&str) -> i64,
{
    let mut by_stage: HashMap<String, (f64, usize)> = HashMap::new();
    for deal in deals {
        let entry = by_stage.entry(deal.stage_id.clone()).or_insert((0.0, 0));
        entry.0 += deal.amount;
        entry.1 += 1;
    }
    let mut out: Vec<StagePulse> = by_stage
        .into_iter()
        .map(|(stage_id, (amount, count))| StagePulse { stage_id, amount, count })
        .collect();
    out.sort_by(|a, b| {
        sort_key(&a.stage_id)
            .cmp(&sort_key(&b.stage_id))
            .then_with(|| a.stage_id.cmp(&b.stage_id))
    });
    out
}

/// Most recently modified deals first.
pub fn change_feed(deals: &[ScoredDeal]) -> Vec<ScoredDeal> {
    let mut feed: Vec<ScoredDeal> = deals.to_vec();
    feed.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    feed.truncate(FEED_LIMIT);
    feed
}

fn sort_for_cards(deals: &mut [&ScoredDeal]) {
    deals.sort_by(|a, b| {
        a.health
            .cmp(&b.health)
            .then_with(|| b.potential.cmp(&a.potential))
            .then_with(|| b.amount.total_cmp(&a.amount))
    });
}

pub fn deal_card(d: &ScoredDeal) -> DealCard {
    DealCard {
        id: d.id,
        title: d.title.clone(),
        manager: d.manager.clone(),
        health: d.health,
        potential: d.potential,
        amount: d.amount,
        days_in_work: d.days_in_work,
        days_no_activity: d.days_no_activity,
        risks: d.flags.risks().into_iter().map(String::from).collect(),
        lost: d.flags.lost,
        status: if d.health < 60 {
            CardStatus::Bad
        } else if d.health >= 80 {
            CardStatus::Good
        } else {
            CardStatus::Neutral
        },
    }
}

pub fn deal_cards(deals: &[ScoredDeal], managers: &[String]) -> Vec<DealCard> {
    let mut picked: Vec<&ScoredDeal> = deals
        .iter()
        .filter(|d| managers.is_empty() || managers.contains(&d.manager))
        .collect();
    sort_for_cards(&mut picked);
    picked.into_iter().take(CARD_LIMIT).map(deal_card).collect()
}

fn series<F>(deals: &[&ScoredDeal], value: F) -> Vec<(NaiveDateTime, f64)>
where
    F: Fn(&ScoredDeal) -> f64,
{
    deals
        .iter()
        .filter_map(|d| d.created_at.map(|ts| (ts, value(*d))))
        .collect()
}

pub fn timeline(deals: &[ScoredDeal], granularity: Granularity) -> Timeline {
    let dated: Vec<&ScoredDeal> = deals.iter().filter(|d| d.created_at.is_some()).collect();

    let mut by_funnel: BTreeMap<String, Vec<&ScoredDeal>> = BTreeMap::new();
    for deal in dated.iter().filter(|d| d.success) {
        by_funnel.entry(deal.funnel.clone()).or_default().push(*deal);
    }

    Timeline {
        deals: resample(&series(&dated, |_| 1.0), granularity, Aggregation::Count),
        problems: ProblemKind::ALL
            .iter()
            .map(|kind| {
                let matching: Vec<&ScoredDeal> = dated.iter().copied().filter(|d| kind.matches(d)).collect();
                ProblemSeries {
                    kind: *kind,
                    points: resample(&series(&matching, |_| 1.0), granularity, Aggregation::Count),
                }
            })
            .collect(),
        revenue_by_funnel: by_funnel
            .into_iter()
            .map(|(funnel, funnel_deals)| FunnelSeries {
                funnel,
                points: resample(&series(&funnel_deals, |d| d.amount), granularity, Aggregation::Sum),
            })
            .collect(),
        health: resample(&series(&dated, |d| d.health as f64), granularity, Aggregation::Mean),
        potential: resample(&series(&dated, |d| d.potential as f64), granularity, Aggregation::Mean),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::deal;
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_headline_metrics_ignores_zero_amounts_for_average_check() {
        let deals = vec![deal(1, 100, 0.0), deal(2, 50, 300.0), deal(3, 0, 100.0)];
        let metrics = headline_metrics(&deals);
        assert_eq!(metrics.total_deals, 3);
        assert_eq!(metrics.total_amount, 400.0);
        assert_eq!(metrics.average_check, 200.0);
        assert_eq!(metrics.average_health, 50.0);
        assert_eq!(headline_metrics(&[]).average_health, 0.0);
    }

    #[test]
    fn test_health_bins() {
        assert_eq!(health_bin_index(0), 0);
        assert_eq!(health_bin_index(5), 0);
        assert_eq!(health_bin_index(6), 1);
        assert_eq!(health_bin_index(70), 13);
        assert_eq!(health_bin_index(100), 19);

        let distribution = health_distribution(&[deal(1, 0, 0.0), deal(2, 100, 0.0), deal(3, 99, 0.0)]);
        assert_eq!(distribution.len(), 20);
        assert_eq!(distribution[0].label, "0-5%");
        assert_eq!(distribution[0].count, 1);
        assert_eq!(distribution[19].label, "95-100%");
        assert_eq!(distribution[19].count, 2);
    }

    #[test]
    fn test_overview_revenue_counts_successful_deals_only() {
        let mut won = deal(1, 80, 1000.0);
        won.success = true;
        let open = deal(2, 40, 5000.0);
        let overview = period_overview(&[won, open], &[]);
        assert_eq!(overview.revenue.current, 1000.0);
        assert_eq!(overview.deals.current, 2.0);
        assert_eq!(overview.deals.change_pct, 0.0);
        assert_eq!(overview.health.current, 60.0);
    }

    #[test]
    fn test_problem_counts_compare_periods() {
        let mut a = deal(1, 50, 0.0);
        a.flags.no_tasks = true;
        let mut b = deal(2, 50, 0.0);
        b.flags.no_tasks = true;
        b.failure = true;
        let counts = problem_counts(&[a.clone(), b], &[a]);
        let no_tasks = counts.iter().find(|c| c.kind == ProblemKind::NoTasks).unwrap();
        assert_eq!((no_tasks.current, no_tasks.previous, no_tasks.change), (2, 1, 1));
        let failed = counts.iter().find(|c| c.kind == ProblemKind::Failed).unwrap();
        assert_eq!(failed.change, 1);
    }

    #[test]
    fn test_problem_deals_list_worst_first() {
        let mut a = deal(1, 70, 0.0);
        a.flags.stuck = true;
        let mut b = deal(2, 30, 0.0);
        b.flags.stuck = true;
        let lists = problem_deals(&[a, b, deal(3, 10, 0.0)]);
        assert_eq!(lists.len(), ProblemKind::ALL.len());
        let stuck = lists.iter().find(|l| l.kind == ProblemKind::Stuck).unwrap();
        assert_eq!(stuck.deals.iter().map(|c| c.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(stuck.deals[0].risks, vec!["stuck".to_string()]);
        assert!(lists.iter().find(|l| l.kind == ProblemKind::NoTasks).unwrap().deals.is_empty());
    }

    #[test]
    fn test_timeline_counts_problems_per_bucket() {
        let mut a = deal(1, 50, 0.0);
        a.flags.no_contact = true;
        let mut b = deal(2, 50, 0.0);
        b.flags.no_contact = true;
        b.created_at = NaiveDate::from_ymd_opt(2025, 4, 2).and_then(|d| d.and_hms_opt(9, 0, 0));
        let line = timeline(&[a, b, deal(3, 50, 0.0)], Granularity::Month);
        let no_contact = line.problems.iter().find(|s| s.kind == ProblemKind::NoContact).unwrap();
        assert_eq!(no_contact.points.len(), 2);
        assert!(no_contact.points.iter().all(|p| p.value == 1.0));
        let failed = line.problems.iter().find(|s| s.kind == ProblemKind::Failed).unwrap();
        assert!(failed.points.is_empty());
        assert_eq!(line.deals[0].value, 2.0);
    }

    #[test]
    fn test_failure_analysis_groups() {
        let rules = StageRules::default();
        let mut a = deal(1, 10, 0.0);
        a.failure = true;
        a.stage_name = "Недозвон".to_string();
        let mut b = deal(2, 10, 0.0);
        b.failure = true;
        b.stage_name = "Выбрали конкурентов".to_string();
        let mut c = deal(3, 10, 0.0);
        c.failure = true;
        c.stage_name = "Дорого".to_string();

        let mut d = deal(4, 90, 0.0);
        d.stage_name = "КП отправлено".to_string();
        let analysis = failure_analysis(&[a, b, c, d], &rules);
        assert_eq!(analysis.total, 3);
        assert_eq!(analysis.groups[0].working, 0);
        assert_eq!(analysis.groups[1].working, 1);
        assert_eq!(analysis.reasons.len(), 3);
        assert_eq!(analysis.groups[0].reasons.len(), 2);
        assert_eq!(analysis.groups[1].reasons.len(), 2);
    }

    #[test]
    fn test_deal_cards_order_and_status() {
        let mut low = deal(1, 20, 100.0);
        low.flags.no_tasks = true;
        let high = deal(2, 90, 100.0);
        let mid_rich = deal(3, 20, 900.0);
        let cards = deal_cards(&[high, low, mid_rich], &[]);
        assert_eq!(cards.iter().map(|c| c.id).collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(cards[1].risks, vec!["no tasks".to_string()]);
        assert_eq!(cards[1].status, CardStatus::Bad);
        assert_eq!(cards[2].status, CardStatus::Good);
        assert!(deal_cards(&[deal(5, 50, 0.0)], &["Boris".to_string()]).is_empty());
    }

    #[test]
    fn test_stage_pulse_sorted_by_key() {
        let mut a = deal(1, 50, 10.0);
        a.stage_id = "WON".into();
        let b = deal(2, 50, 5.0);
        let c = deal(3, 50, 7.0);
        let pulse = stage_pulse(&[a, b, c], |id| if id == "NEW" { 1 } else { 2 });
        assert_eq!(pulse[0], StagePulse { stage_id: "NEW".into(), amount: 12.0, count: 2 });
        assert_eq!(pulse[1].stage_id, "WON");
    }
}
