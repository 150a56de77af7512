//! Stage classification rules.
//!
//! Pipelines are portal-specific, so success and failure stages are matched by
//! display name through configurable rules, with the standard Bitrix24 stage
//! ids (`WON`, `LOSE`) as a portal-independent fallback.

use crate::domain::crm::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard Bitrix24 deal stage suffixes in pipeline order.
pub const FALLBACK_STAGE_ORDER: [&str; 8] = [
    "NEW",
    "PREPARATION",
    "PREPAYMENT_INVOICE",
    "EXECUTING",
    "FINAL_INVOICE",
    "WON",
    "LOSE",
    "APOLOGY",
];

pub const UNKNOWN_STAGE_SORT: i64 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureGroup {
    pub label: String,
    /// Working stages a deal passes through before it can fail into this group.
    pub main_stages: Vec<String>,
    pub failure_stages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRules {
    /// Funnel name -> name of its successful closing stage.
    pub success_stages: HashMap<String, String>,
    pub failure_keywords: Vec<String>,
    pub failure_groups: Vec<FailureGroup>,
}

impl Default for StageRules {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            success_stages: HashMap::from([
                ("Основная воронка продаж".to_string(), "Успешно реализовано".to_string()),
                ("Физ.Лица".to_string(), "Сделка успешна".to_string()),
                ("Не приоритетные сделки".to_string(), "Сделка успешна".to_string()),
            ]),
            failure_keywords: strings(&[
                "проиг", "отказ", "lose", "fail", "недозвон", "спам", "нецелевой",
            ]),
            failure_groups: vec![
                FailureGroup {
                    label: "Group 1".to_string(),
                    main_stages: strings(&[
                        "Неразобранное",
                        "В работе",
                        "Сделка квалифицирована",
                        "Квалифицирована как не приоритетная",
                    ]),
                    failure_stages: strings(&[
                        "Недозвон",
                        "Не абонент",
                        "СПАМ",
                        "Нецелевой",
                        "Дорого",
                        "Организация не действует",
                        "Был конфликт",
                        "Не одобрили отсрочку платежа",
                        "Не устроили сроки",
                        "Сделка отменена клиентом",
                        "Удалено из неразобр. Авито",
                    ]),
                },
                FailureGroup {
                    label: "Group 2".to_string(),
                    main_stages: strings(&["КП отправлено", "Счёт выставлен/Документы подготовлены"]),
                    failure_stages: strings(&[
                        "Выбрали конкурентов",
                        "Дорого",
                        "Был конфликт",
                        "Не одобрили отсрочку платежа",
                        "Не устроили сроки",
                        "Сделка отменена клиентом",
                    ]),
                },
            ],
        }
    }
}

impl StageRules {
    pub fn is_success(&self, stage_name: &str, stage_id: &str, funnel: &str) -> bool {
        if stage_suffix(stage_id).eq_ignore_ascii_case("WON") {
            return true;
        }
        match self.success_stages.get(funnel) {
            Some(success) if !success.is_empty() => {
                stage_name.to_lowercase().contains(&success.to_lowercase())
            }
            _ => false,
        }
    }

    pub fn is_failure(&self, stage_name: &str, stage_id: &str) -> bool {
        let lowered = stage_name.to_lowercase();
        if self
            .failure_keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
        {
            return true;
        }
        is_lost_stage(stage_id)
    }
}

/// `LOSE` anywhere in the upper-cased stage id marks a lost deal.
pub fn is_lost_stage(stage_id: &str) -> bool {
    stage_id.to_uppercase().contains("LOSE")
}

/// Stage id without its `C{category}:` prefix.
pub fn stage_suffix(stage_id: &str) -> &str {
    match stage_id.split_once(':') {
        Some((prefix, suffix)) if prefix.starts_with('C') => suffix,
        _ => stage_id,
    }
}

/// Category encoded in a stage id such as `C5:NEW`; plain ids belong to category 0.
pub fn stage_category(stage_id: &str) -> Option<i64> {
    let (prefix, _) = stage_id.split_once(':')?;
    prefix.strip_prefix('C')?.parse().ok()
}

/// Sort key for a stage: CRM `SORT` when known, else the standard stage order.
pub fn stage_sort_key(stage_id: &str, stages: &HashMap<String, Stage>) -> i64 {
    if let Some(stage) = stages.get(stage_id) {
        return stage.sort;
    }
    let suffix = stage_suffix(stage_id).to_uppercase();
    FALLBACK_STAGE_ORDER
        .iter()
        .position(|known| *known == suffix)
        .map(|idx| (idx as i64 + 1) * 10)
        .unwrap_or(UNKNOWN_STAGE_SORT)
}
