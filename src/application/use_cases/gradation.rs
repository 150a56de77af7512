use crate::domain::deal::ScoredDeal;
use serde::{Deserialize, Serialize};

pub const QUICK_WIN_MIN_HEALTH: u8 = 70;
pub const QUICK_WIN_MIN_PROBABILITY: f64 = 50.0;
pub const WORK_ON_MIN_HEALTH: u8 = 40;
pub const STOP_IDLE_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    QuickWin,
    WorkOn,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeSummary {
    pub grade: Grade,
    pub count: usize,
    pub amount: f64,
    pub deal_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradation {
    pub quick_wins: GradeSummary,
    pub work_on: GradeSummary,
    pub stop_list: GradeSummary,
}

pub fn is_quick_win(deal: &ScoredDeal) -> bool {
    deal.health >= QUICK_WIN_MIN_HEALTH
        && deal.probability >= QUICK_WIN_MIN_PROBABILITY
        && !deal.failure
}

pub fn is_work_on(deal: &ScoredDeal) -> bool {
    deal.health >= WORK_ON_MIN_HEALTH && deal.health < QUICK_WIN_MIN_HEALTH && !deal.failure
}

pub fn is_stop(deal: &ScoredDeal) -> bool {
    deal.health < WORK_ON_MIN_HEALTH
        || deal.failure
        || (deal.flags.stuck && deal.days_no_activity > STOP_IDLE_DAYS)
}

/// The three lists are independent filters; a stale mid-health deal can be
/// both "work on" and "stop".
pub fn gradation(deals: &[ScoredDeal]) -> Gradation {
    let summarize = |grade: Grade, keep: fn(&ScoredDeal) -> bool| {
        let picked: Vec<&ScoredDeal> = deals.iter().filter(|d| keep(d)).collect();
        GradeSummary {
            grade,
            count: picked.len(),
            amount: picked.iter().map(|d| d.amount).sum(),
            deal_ids: picked.iter().map(|d| d.id).collect(),
        }
    };

    Gradation {
        quick_wins: summarize(Grade::QuickWin, is_quick_win),
        work_on: summarize(Grade::WorkOn, is_work_on),
        stop_list: summarize(Grade::Stop, is_stop),
    }
}
