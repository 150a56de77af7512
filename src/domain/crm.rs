use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manager {
    pub id: i64,
    pub name: String,
    pub departments: Vec<i64>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub status_id: String,
    pub name: String,
    pub sort: i64,
    pub category_id: i64,
}

/// A deal pipeline ("funnel"). Category 0 is the portal's default pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub owner_id: i64,
    pub stage_id: String,
    pub created_time: NaiveDateTime,
}

/// Everything the dashboard needs from the CRM besides the deals themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmDirectory {
    pub managers: HashMap<i64, Manager>,
    pub departments: Vec<Department>,
    pub stages: HashMap<String, Stage>,
    pub categories: HashMap<i64, Category>,
    /// Deal id -> number of open (not completed) activities.
    pub open_tasks: HashMap<i64, usize>,
    /// Deal id -> time the deal entered its current stage.
    pub stage_entered: HashMap<i64, NaiveDateTime>,
}

impl CrmDirectory {
    pub fn manager_name(&self, id: i64) -> String {
        self.managers
            .get(&id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn stage_name(&self, stage_id: &str) -> String {
        self.stages
            .get(stage_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| stage_id.to_string())
    }

    pub fn funnel_name(&self, category_id: i64) -> String {
        self.categories
            .get(&category_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "Main".to_string())
    }

    pub fn has_open_tasks(&self, deal_id: i64) -> bool {
        self.open_tasks.get(&deal_id).copied().unwrap_or(0) > 0
    }
}

/// Latest entry time into each deal's current stage.
pub fn stage_entry_times(
    history: &[StageHistoryEntry],
    current_stage: &HashMap<i64, String>,
) -> HashMap<i64, NaiveDateTime> {
    let mut entered: HashMap<i64, NaiveDateTime> = HashMap::new();
    for entry in history {
        let Some(stage) = current_stage.get(&entry.owner_id) else {
            continue;
        };
        if stage != &entry.stage_id {
            continue;
        }
        entered
            .entry(entry.owner_id)
            .and_modify(|ts| {
                if entry.created_time > *ts {
                    *ts = entry.created_time;
                }
            })
            .or_insert(entry.created_time);
    }
    entered
}
