//! Yearly sales plan: fact versus target for the reference year, with a
//! forecast from the weighted potential of still-open deals.

use crate::domain::deal::ScoredDeal;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const AT_RISK_FORECAST_PCT: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanRisk {
    OnTrack,
    AtRisk,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthPlan {
    pub month: u32,
    pub plan: f64,
    pub fact: f64,
    pub completion_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterFact {
    pub quarter: u32,
    pub fact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyPlan {
    pub year: i32,
    pub target: f64,
    pub actual: f64,
    pub remaining: f64,
    pub completion_pct: f64,
    pub monthly_plan: f64,
    pub months_left: u32,
    pub adjusted_monthly_plan: f64,
    pub weighted_potential: f64,
    pub forecast: f64,
    pub forecast_pct: f64,
    pub risk: PlanRisk,
    pub months: Vec<MonthPlan>,
    pub quarters: Vec<QuarterFact>,
}

pub fn plan_risk(forecast_pct: f64) -> PlanRisk {
    if forecast_pct >= 100.0 {
        PlanRisk::OnTrack
    } else if forecast_pct >= AT_RISK_FORECAST_PCT {
        PlanRisk::AtRisk
    } else {
        PlanRisk::Critical
    }
}

fn pct(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// Builds the plan for the year of `today` from deals created in that year.
pub fn yearly_plan(deals: &[ScoredDeal], target: f64, today: NaiveDate) -> YearlyPlan {
    let year = today.year();
    let in_year: Vec<&ScoredDeal> = deals
        .iter()
        .filter(|d| d.created_date().map(|c| c.year()) == Some(year))
        .collect();

    let mut by_month = [0.0f64; 12];
    for deal in in_year.iter().filter(|d| d.success) {
        if let Some(created) = deal.created_date() {
            by_month[created.month0() as usize] += deal.amount;
        }
    }
    let actual: f64 = by_month.iter().sum();

    let monthly_plan = target / 12.0;
    let remaining = (target - actual).max(0.0);
    let months_left = 12 - today.month() + 1;
    let weighted_potential: f64 = in_year
        .iter()
        .filter(|d| !d.success && !d.flags.lost)
        .map(|d| d.amount * d.probability / 100.0)
        .sum();
    let forecast = actual + weighted_potential;
    let forecast_pct = pct(forecast, target);

    YearlyPlan {
        year,
        target,
        actual,
        remaining,
        completion_pct: pct(actual, target),
        monthly_plan,
        months_left,
        adjusted_monthly_plan: remaining / months_left as f64,
        weighted_potential,
        forecast,
        forecast_pct,
        risk: plan_risk(forecast_pct),
        months: by_month
            .iter()
            .enumerate()
            .map(|(idx, fact)| MonthPlan {
                month: idx as u32 + 1,
                plan: monthly_plan,
                fact: *fact,
                completion_pct: pct(*fact, monthly_plan),
            })
            .collect(),
        quarters: by_month
            .chunks(3)
            .enumerate()
            .map(|(idx, months)| QuarterFact {
                quarter: idx as u32 + 1,
                fact: months.iter().sum(),
            })
            .collect(),
    }
}
