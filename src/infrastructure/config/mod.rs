//! Service configuration: built-in defaults, then an optional
//! `dealpulse.toml`, then environment variables (a `.env` file is loaded
//! first). The Bitrix24 webhook, Perplexity key and auth bypass use their
//! conventional unprefixed names; every other key uses `DEALPULSE_`.

use crate::application::use_cases::auth::{AccessGate, DEFAULT_PASSWORD_SHA256, DEFAULT_USERNAME};
use crate::application::use_cases::scoring::DEFAULT_STUCK_DAYS;
use crate::application::use_cases::stage_rules::StageRules;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, DEFAULT_MODEL, PERPLEXITY_API_URL};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use validator::Validate;

pub const CONFIG_FILE: &str = "dealpulse.toml";
pub const ENV_PREFIX: &str = "DEALPULSE_";
const UNPREFIXED_KEYS: [&str; 3] = ["BITRIX24_WEBHOOK", "PERPLEXITY_API_KEY", "DISABLE_AUTH"];

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    pub bitrix24_webhook: Option<String>,
    pub perplexity_api_key: Option<String>,
    #[validate(length(min = 1))]
    pub perplexity_api_url: String,
    #[validate(length(min = 1))]
    pub perplexity_model: String,
    pub ai_language: String,
    pub disable_auth: bool,
    #[validate(length(min = 1))]
    pub auth_username: String,
    #[validate(length(equal = 64))]
    pub auth_password_sha256: String,
    pub bind_address: String,
    #[validate(range(min = 1))]
    pub port: u16,
    pub data_dir: PathBuf,
    pub page_pause_ms: u64,
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
    pub use_batch: bool,
    #[validate(range(min = 1, max = 365))]
    pub stuck_days: i64,
    #[validate(range(min = 1, max = 100000))]
    pub deal_limit: usize,
    pub company_alias: String,
    #[validate(range(min = 0.0))]
    pub yearly_target: f64,
    pub stage_rules: StageRules,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bitrix24_webhook: None,
            perplexity_api_key: None,
            perplexity_api_url: PERPLEXITY_API_URL.to_string(),
            perplexity_model: DEFAULT_MODEL.to_string(),
            ai_language: "English".to_string(),
            disable_auth: false,
            auth_username: DEFAULT_USERNAME.to_string(),
            auth_password_sha256: DEFAULT_PASSWORD_SHA256.to_string(),
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("data"),
            page_pause_ms: 400,
            request_timeout_secs: 30,
            use_batch: true,
            stuck_days: DEFAULT_STUCK_DAYS,
            deal_limit: 600,
            company_alias: "My Company".to_string(),
            yearly_target: 10_000_000.0,
            stage_rules: StageRules::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                warn!(error = %e, "Failed to read .env file");
            }
        }
        Self::extract(Self::figment(Path::new(CONFIG_FILE)))
    }

    pub fn figment(config_file: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::raw().only(&UNPREFIXED_KEYS))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn extract(figment: Figment) -> Result<Self> {
        let mut config: AppConfig = figment
            .extract()
            .map_err(|e| AppError::ValidationError(format!("Invalid configuration: {}", e)))?;
        config.normalize();
        config.validate()?;
        if let Some(webhook) = config.bitrix24_webhook.as_deref() {
            url::Url::parse(webhook).map_err(|e| {
                AppError::ValidationError(format!("Invalid BITRIX24_WEBHOOK: {}", e))
            })?;
        }
        info!(
            webhook = config.bitrix24_webhook.is_some(),
            ai = config.perplexity_api_key.is_some(),
            auth = !config.disable_auth,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Blank secrets count as unset; the webhook loses its trailing slash.
    fn normalize(&mut self) {
        let blank_to_none = |value: &mut Option<String>| {
            if value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(false) {
                *value = None;
            }
        };
        blank_to_none(&mut self.bitrix24_webhook);
        blank_to_none(&mut self.perplexity_api_key);
        if let Some(webhook) = self.bitrix24_webhook.as_mut() {
            *webhook = webhook.trim().trim_end_matches('/').to_string();
        }
        self.auth_password_sha256 = self.auth_password_sha256.trim().to_ascii_lowercase();
    }

    pub fn llm_config(&self) -> LLMConfig {
        LLMConfig {
            api_url: self.perplexity_api_url.clone(),
            model: self.perplexity_model.clone(),
            api_key: self.perplexity_api_key.clone(),
            ..LLMConfig::default()
        }
    }

    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(self.disable_auth, &self.auth_username, &self.auth_password_sha256)
    }

    pub fn cache_url(&self) -> String {
        format!("sqlite://{}", self.data_dir.join("dealpulse.db").display())
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}
