//! AI-generated summaries and recommendations over scored deals.
//!
//! Every call is best-effort: a missing key, a transport error or an
//! unparseable answer is logged and replaced by static text.

mod llm_output;
mod prompts;

use crate::application::use_cases::managers::{ManagerPerformance, ManagerZone};
use crate::domain::deal::{RawDeal, ScoredDeal};
use crate::domain::error::{AppError, Result};
use crate::domain::insight::{AiSummary, DealAnalysis, ManagerReview};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::response::clean_llm_response;
use llm_output::{normalize_language, parse_json_object};
use prompts::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const MAX_REVIEWED_MANAGERS: usize = 3;

pub const NO_KEY_SUMMARY: &str = "AI summary unavailable (no API key).";
pub const SUMMARY_PARSE_FALLBACK: &str = "Could not parse the AI response.";
pub const SUMMARY_FAILED: &str = "Could not build the AI summary.";
pub const NO_KEY_TEXT: &str = "AI key is not configured.";
pub const REQUEST_FAILED_TEXT: &str = "AI request failed. Check the API key and try again.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealStats {
    pub total: usize,
    pub no_tasks: usize,
    pub no_company: usize,
    pub no_contact: usize,
    pub stuck: usize,
    pub lost: usize,
}

impl DealStats {
    pub fn from_deals(deals: &[ScoredDeal]) -> Self {
        let count = |pred: fn(&ScoredDeal) -> bool| deals.iter().filter(|d| pred(d)).count();
        Self {
            total: deals.len(),
            no_tasks: count(|d| d.flags.no_tasks),
            no_company: count(|d| d.flags.no_company),
            no_contact: count(|d| d.flags.no_contact),
            stuck: count(|d| d.flags.stuck),
            lost: count(|d| d.flags.lost),
        }
    }
}

/// Sampling presets per operation: (max_tokens, temperature).
const SUMMARY_SAMPLING: (u32, f32) = (800, 0.1);
const RECOMMENDATIONS_SAMPLING: (u32, f32) = (1000, 0.3);
const MANAGER_REVIEW_SAMPLING: (u32, f32) = (800, 0.3);
const ASK_SAMPLING: (u32, f32) = (900, 0.19);
const ANALYSIS_SAMPLING: (u32, f32) = (800, 0.2);

pub struct InsightsUseCase {
    llm_client: Arc<dyn LLMClient + Send + Sync>,
    config: LLMConfig,
    language: String,
}

impl InsightsUseCase {
    pub fn new(llm_client: Arc<dyn LLMClient + Send + Sync>, config: LLMConfig, language: &str) -> Self {
        Self {
            llm_client,
            config,
            language: normalize_language(language),
        }
    }

    pub fn is_available(&self) -> bool {
        self.config.has_key()
    }

    async fn complete(&self, sampling: (u32, f32), system: &str, user: &str) -> Result<String> {
        let config = self.config.with_sampling(sampling.0, sampling.1);
        let raw = self.llm_client.generate(&config, system, user).await?;
        Ok(clean_llm_response(&raw))
    }

    pub async fn summarize(&self, company: &str, zones: &[ManagerZone], deals: &[ScoredDeal]) -> AiSummary {
        if !self.is_available() {
            return AiSummary { summary: NO_KEY_SUMMARY.to_string(), actions: Vec::new() };
        }

        let system = build_summary_system_prompt(&self.language);
        let user = build_summary_user_prompt(company, zones, deals);
        match self.complete(SUMMARY_SAMPLING, &system, &user).await {
            Ok(text) => parse_json_object::<AiSummary>(&text).unwrap_or_else(|| {
                warn!("AI summary was not valid JSON");
                AiSummary { summary: SUMMARY_PARSE_FALLBACK.to_string(), actions: Vec::new() }
            }),
            Err(e) => {
                warn!(error = %e, "AI summary failed");
                AiSummary { summary: SUMMARY_FAILED.to_string(), actions: Vec::new() }
            }
        }
    }

    pub async fn health_recommendations(&self, avg_health: f64, stats: &DealStats) -> String {
        if !self.is_available() {
            return NO_KEY_TEXT.to_string();
        }
        let system = build_expert_system_prompt(&self.language);
        let user = build_recommendations_user_prompt(avg_health, stats);
        self.text_or_fallback("health recommendations", RECOMMENDATIONS_SAMPLING, &system, &user)
            .await
    }

    /// Reviews up to three managers, in the order given.
    pub async fn manager_reviews(
        &self,
        performance: &[ManagerPerformance],
        zones: &[ManagerZone],
        managers: &[String],
    ) -> Vec<ManagerReview> {
        let mut reviews = Vec::new();
        for name in managers.iter().take(MAX_REVIEWED_MANAGERS) {
            let Some(perf) = performance.iter().find(|p| &p.manager == name) else {
                warn!(manager = %name, "No performance data for manager review");
                continue;
            };
            let review = if self.is_available() {
                let system = build_expert_system_prompt(&self.language);
                let user = build_manager_review_user_prompt(perf, zones.iter().find(|z| &z.manager == name));
                self.text_or_fallback("manager review", MANAGER_REVIEW_SAMPLING, &system, &user)
                    .await
            } else {
                NO_KEY_TEXT.to_string()
            };
            reviews.push(ManagerReview { manager: name.clone(), review });
        }
        reviews
    }

    pub async fn ask(&self, deals: &[ScoredDeal], question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(AppError::ValidationError("Question must not be empty".to_string()));
        }
        if !self.is_available() {
            return Ok(NO_KEY_TEXT.to_string());
        }
        let system = build_ask_system_prompt(&self.language);
        let user = build_ask_user_prompt(deals, question);
        Ok(self.text_or_fallback("ask", ASK_SAMPLING, &system, &user).await)
    }

    pub async fn analyze_deals(&self, deals: &[RawDeal]) -> DealAnalysis {
        if deals.is_empty() {
            return DealAnalysis {
                health_score: 0,
                summary: "No data to analyse".to_string(),
                recommendations: vec!["Add deals to the CRM".to_string()],
            };
        }
        if !self.is_available() {
            return DealAnalysis {
                health_score: 0,
                summary: NO_KEY_TEXT.to_string(),
                recommendations: Vec::new(),
            };
        }

        let system = build_analysis_system_prompt(&self.language);
        let user = build_analysis_user_prompt(deals);
        let parsed = match self.complete(ANALYSIS_SAMPLING, &system, &user).await {
            Ok(text) => parse_json_object::<DealAnalysis>(&text),
            Err(e) => {
                warn!(error = %e, "AI deal analysis failed");
                None
            }
        };
        parsed.unwrap_or_else(|| DealAnalysis {
            health_score: 0,
            summary: SUMMARY_PARSE_FALLBACK.to_string(),
            recommendations: Vec::new(),
        })
    }

    async fn text_or_fallback(&self, operation: &str, sampling: (u32, f32), system: &str, user: &str) -> String {
        match self.complete(sampling, system, user).await {
            Ok(text) => {
                info!(operation, chars = text.len(), "AI answer received");
                text
            }
            Err(e) => {
                warn!(operation, error = %e, "AI request failed");
                REQUEST_FAILED_TEXT.to_string()
            }
        }
    }
}
