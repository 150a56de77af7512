use serde::{Deserialize, Serialize};

/// Short AI summary with an action plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// Whole-portfolio AI assessment of a deal sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealAnalysis {
    #[serde(default)]
    pub health_score: i64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerReview {
    pub manager: String,
    pub review: String,
}
