//! "System bypass" detection: deals whose data suggests work happening
//! outside the CRM.

use crate::domain::deal::ScoredDeal;
use serde::{Deserialize, Serialize};

pub const RECENT_ACTIVITY_DAYS: i64 = 3;
pub const STUCK_HIGH_PROBABILITY: f64 = 70.0;
pub const WEAK_HEALTH: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ActivityWithoutTasks,
    StuckWithHighProbability,
    LargeDealLowHealth,
}

impl AnomalyKind {
    pub fn severity(&self) -> Severity {
        match self {
            AnomalyKind::ActivityWithoutTasks => Severity::Medium,
            AnomalyKind::StuckWithHighProbability | AnomalyKind::LargeDealLowHealth => Severity::High,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AnomalyKind::ActivityWithoutTasks => "Recent activity but no open tasks",
            AnomalyKind::StuckWithHighProbability => "Stuck despite a high close probability",
            AnomalyKind::LargeDealLowHealth => "Large deal with low health",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub deal_id: i64,
    pub title: String,
    pub manager: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
}

/// Percentile `q` in `[0, 1]` with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

pub fn detect_anomalies(deals: &[ScoredDeal]) -> Vec<Anomaly> {
    let amounts: Vec<f64> = deals.iter().map(|d| d.amount).collect();
    let large_threshold = percentile(&amounts, 0.75);

    let mut found = Vec::new();
    for deal in deals {
        let mut push = |kind: AnomalyKind| {
            found.push(Anomaly {
                deal_id: deal.id,
                title: deal.title.clone(),
                manager: deal.manager.clone(),
                kind,
                severity: kind.severity(),
                description: kind.description().to_string(),
            })
        };

        if deal.flags.no_tasks && deal.days_no_activity < RECENT_ACTIVITY_DAYS {
            push(AnomalyKind::ActivityWithoutTasks);
        }
        if deal.flags.stuck && deal.probability > STUCK_HIGH_PROBABILITY {
            push(AnomalyKind::StuckWithHighProbability);
        }
        if let Some(threshold) = large_threshold {
            if deal.health < WEAK_HEALTH && deal.amount > threshold {
                push(AnomalyKind::LargeDealLowHealth);
            }
        }
    }

    found.sort_by(|a, b| b.severity.cmp(&a.severity));
    found
}
