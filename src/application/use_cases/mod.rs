pub mod ai_insights;
pub mod analytics;
pub mod anomalies;
pub mod auth;
pub mod dashboard;
pub mod export;
pub mod gradation;
pub mod managers;
pub mod offline_import;
pub mod periods;
pub mod scoring;
pub mod stage_rules;
pub mod stage_time;
pub mod yearly_plan;
