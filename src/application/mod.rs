pub mod use_cases;

pub use use_cases::ai_insights::InsightsUseCase;
pub use use_cases::dashboard::DashboardUseCase;
