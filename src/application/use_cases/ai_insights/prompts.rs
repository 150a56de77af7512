use crate::application::use_cases::managers::{ManagerPerformance, ManagerZone};
use crate::domain::deal::{RawDeal, ScoredDeal};
use serde_json::json;
use std::collections::BTreeMap;

use super::DealStats;

pub(crate) const SUMMARY_SAMPLE: usize = 4;
pub(crate) const ANALYSIS_SAMPLE: usize = 10;

pub(crate) fn build_summary_system_prompt(language: &str) -> String {
    format!(
        "You are a CRM sales analyst. Respond in {}. Reply strictly with valid JSON with keys: summary (string), actions (string[]). Return only JSON.",
        language
    )
}

pub(crate) fn build_summary_user_prompt(
    company: &str,
    zones: &[ManagerZone],
    deals: &[ScoredDeal],
) -> String {
    let mut weakest: Vec<&ScoredDeal> = deals.iter().collect();
    weakest.sort_by_key(|d| d.health);

    let kpi: Vec<serde_json::Value> = zones
        .iter()
        .map(|z| {
            json!({
                "manager": z.manager,
                "deals": z.deals,
                "health_avg": (z.health_avg * 10.0).round() / 10.0,
                "potential_sum": z.potential_sum,
                "amount_sum": z.amount_sum,
                "no_tasks": z.no_tasks,
                "stuck": z.stuck,
                "lost": z.lost,
                "zone": z.zone,
            })
        })
        .collect();

    let sample: Vec<serde_json::Value> = weakest
        .into_iter()
        .take(SUMMARY_SAMPLE)
        .map(|d| {
            json!({
                "id": d.id,
                "title": d.title,
                "health": d.health,
                "potential": d.potential,
                "amount": d.amount,
                "days_in_work": d.days_in_work,
                "no_tasks": d.flags.no_tasks,
                "stuck": d.flags.stuck,
                "no_company": d.flags.no_company,
                "no_contact": d.flags.no_contact,
                "lost": d.flags.lost,
            })
        })
        .collect();

    json!({
        "company": company,
        "kpi_summary": kpi,
        "sample_deals": sample,
    })
    .to_string()
}

pub(crate) fn build_expert_system_prompt(language: &str) -> String {
    format!(
        "You are an expert in CRM analytics and sales management. Respond in {}.",
        language
    )
}

pub(crate) fn build_recommendations_user_prompt(avg_health: f64, stats: &DealStats) -> String {
    let mut body = String::new();
    body.push_str(&format!("Current average deal health: {:.1}%.\n\n", avg_health));
    body.push_str("Deal statistics:\n");
    body.push_str(&format!("- Total deals: {}\n", stats.total));
    body.push_str(&format!("- Without tasks: {}\n", stats.no_tasks));
    body.push_str(&format!("- Without company: {}\n", stats.no_company));
    body.push_str(&format!("- Without contact: {}\n", stats.no_contact));
    body.push_str(&format!("- Stuck: {}\n", stats.stuck));
    body.push_str(&format!("- Lost: {}\n", stats.lost));
    body.push_str(
        "\nGive concrete step-by-step recommendations on what exactly to do in Bitrix24 CRM to:\n\
         1. Raise deal health to 70%\n\
         2. Keep deal health at or above 70%\n\n\
         Recommendations must be concrete CRM actions, measurable, practical and prioritised.\n\
         Format: short bullet points.",
    );
    body
}

pub(crate) fn build_manager_review_user_prompt(
    performance: &ManagerPerformance,
    zone: Option<&ManagerZone>,
) -> String {
    let mut body = String::new();
    body.push_str("Review the work of a sales manager.\n\n");
    body.push_str(&format!("Manager: {}\n", performance.manager));
    body.push_str(&format!("Deals: {}\n", performance.deals));
    body.push_str(&format!("Revenue: {:.0}\n", performance.revenue));
    body.push_str(&format!("Average health: {}%\n", performance.health_avg));
    body.push_str(&format!("Won: {}\n", performance.won));
    body.push_str(&format!("Lost: {}\n", performance.lost));
    if let Some(zone) = zone {
        body.push_str(&format!("Without tasks: {}\n", zone.no_tasks));
        body.push_str(&format!("Stuck: {}\n", zone.stuck));
    }
    body.push_str(
        "\nGive a short analysis (2-3 paragraphs):\n\
         1. Strengths\n\
         2. Problem areas\n\
         3. Concrete recommendations\n\n\
         Format: bullet points.",
    );
    body
}

pub(crate) fn build_ask_system_prompt(language: &str) -> String {
    format!("Answer in {}, to the point.", language)
}

/// Compact CRM snapshot: totals plus deal counts per stage.
pub(crate) fn crm_snapshot(deals: &[ScoredDeal]) -> serde_json::Value {
    let mut stages: BTreeMap<&str, usize> = BTreeMap::new();
    for deal in deals {
        *stages.entry(deal.stage_name.as_str()).or_insert(0) += 1;
    }
    json!({
        "total_deals": deals.len(),
        "total_volume": deals.iter().map(|d| d.amount).sum::<f64>(),
        "deals_by_stage": stages,
    })
}

pub(crate) fn build_ask_user_prompt(deals: &[ScoredDeal], question: &str) -> String {
    let snapshot = serde_json::to_string_pretty(&crm_snapshot(deals)).unwrap_or_default();
    format!(
        "Here is a short CRM summary:\n\n{}\n\nUser question:\n\n{}\n\nAnswer as usefully and concisely as possible, for the business. Put advice in a separate list.",
        snapshot,
        question.trim()
    )
}

pub(crate) fn build_analysis_system_prompt(language: &str) -> String {
    format!(
        "You are a CRM analytics expert. Respond in {}. Reply strictly with JSON with keys: health_score (integer 0-100), summary (string), recommendations (string[]). Return only JSON.",
        language
    )
}

pub(crate) fn build_analysis_user_prompt(deals: &[RawDeal]) -> String {
    let sample: Vec<&RawDeal> = deals.iter().take(ANALYSIS_SAMPLE).collect();
    format!(
        "Analyse the Bitrix24 deals.\n\nTotal deals: {}\nExamples:\n{}",
        deals.len(),
        serde_json::to_string_pretty(&sample).unwrap_or_default()
    )
}
