use crate::domain::deal::ScoredDeal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTime {
    pub stage: String,
    pub mean_days: f64,
    /// Sample standard deviation; 0 for a single deal.
    pub std_days: f64,
    pub min_days: i64,
    pub max_days: i64,
    pub count: usize,
}

pub fn stage_time_stats(deals: &[ScoredDeal]) -> Vec<StageTime> {
    let mut by_stage: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for deal in deals {
        by_stage.entry(deal.stage_name.as_str()).or_default().push(deal.days_in_stage);
    }

    let mut stats: Vec<StageTime> = by_stage
        .into_iter()
        .map(|(stage, days)| {
            let count = days.len();
            let mean = days.iter().sum::<i64>() as f64 / count as f64;
            let std = if count > 1 {
                let var = days.iter().map(|d| (*d as f64 - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
                var.sqrt()
            } else {
                0.0
            };
            StageTime {
                stage: stage.to_string(),
                mean_days: mean,
                std_days: std,
                min_days: days.iter().copied().min().unwrap_or(0),
                max_days: days.iter().copied().max().unwrap_or(0),
                count,
            }
        })
        .collect();

    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::analytics::test_support::deal;

    fn in_stage(id: i64, stage: &str, days: i64) -> ScoredDeal {
        let mut d = deal(id, 50, 0.0);
        d.stage_name = stage.to_string();
        d.days_in_stage = days;
        d
    }

    #[test]
    fn test_stage_time_stats() {
        let deals = vec![
            in_stage(1, "Invoice", 2),
            in_stage(2, "Invoice", 4),
            in_stage(3, "Invoice", 6),
            in_stage(4, "New", 10),
        ];
        let stats = stage_time_stats(&deals);
        assert_eq!(stats[0].stage, "Invoice");
        assert_eq!(stats[0].count, 3);
        assert_eq!(stats[0].mean_days, 4.0);
        assert_eq!(stats[0].std_days, 2.0);
        assert_eq!((stats[0].min_days, stats[0].max_days), (2, 6));
        assert_eq!(stats[1].std_days, 0.0);
    }
}
