use crate::application::{DashboardUseCase, InsightsUseCase};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::bitrix::{BitrixClient, BitrixSettings, CrmSource};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::cache::SqliteCache;
use crate::infrastructure::llm_clients::{LLMClient, PerplexityClient};
use crate::infrastructure::storage::ensure_data_dir;
use crate::interfaces::http::{add_log, start_server, HttpState, QueryDefaults};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub fn run() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    if let Err(err) = actix_web::rt::System::new().block_on(serve()) {
        error!(error = %err, "dealpulse stopped");
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    let config = AppConfig::load()?;
    ensure_data_dir(&config.data_dir)?;

    let cache = Arc::new(SqliteCache::init(&config.cache_url()).await?);
    let purged = cache.purge_expired().await?;
    info!(purged, "Cache ready");

    let crm: Option<Arc<dyn CrmSource + Send + Sync>> = match config.bitrix24_webhook.as_deref() {
        Some(webhook) => {
            let settings = BitrixSettings {
                page_pause: Duration::from_millis(config.page_pause_ms),
                timeout: Duration::from_secs(config.request_timeout_secs),
                use_batch: config.use_batch,
            };
            Some(Arc::new(BitrixClient::new(webhook, settings)?))
        }
        None => {
            warn!("BITRIX24_WEBHOOK is not set; upload a deal table to /api/import");
            None
        }
    };

    let llm_client: Arc<dyn LLMClient + Send + Sync> = Arc::new(PerplexityClient::new());
    let insights = InsightsUseCase::new(llm_client, config.llm_config(), &config.ai_language);
    let dashboard = DashboardUseCase::new(crm, cache.clone(), config.stage_rules.clone());

    let logs = Arc::new(Mutex::new(Vec::new()));
    add_log(
        &logs,
        "INFO",
        "App",
        &format!("Listening on {}:{}", config.bind_address, config.port),
    );

    let state = HttpState {
        dashboard: Arc::new(dashboard),
        insights: Arc::new(insights),
        cache,
        gate: config.access_gate(),
        defaults: QueryDefaults {
            stuck_days: config.stuck_days,
            limit: config.deal_limit,
            yearly_target: config.yearly_target,
            company_alias: config.company_alias.clone(),
        },
        export_dir: config.export_dir(),
        logs,
    };

    info!(address = %config.bind_address, port = config.port, "Starting HTTP API");
    start_server(state, &config.bind_address, config.port)?
        .await
        .map_err(|e| AppError::IoError(format!("HTTP server failed: {}", e)))
}
