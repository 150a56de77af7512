pub mod crm;
pub mod deal;
pub mod error;
pub mod insight;
pub mod llm_config;
pub mod period;
