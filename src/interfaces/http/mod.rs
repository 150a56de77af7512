use crate::application::use_cases::ai_insights::DealStats;
use crate::application::use_cases::analytics::mean;
use crate::application::use_cases::auth::AccessGate;
use crate::application::use_cases::dashboard::{DashboardQuery, DashboardUseCase, LoadedDeals};
use crate::application::use_cases::export::{bundle_zip, render, write_reports, ReportDocument, BUNDLE_NAME};
use crate::application::use_cases::managers::manager_zones;
use crate::application::use_cases::offline_import::{import_bytes, TableFormat};
use crate::application::InsightsUseCase;
use crate::domain::error::AppError;
use crate::domain::period::{Granularity, PeriodKind};
use crate::infrastructure::db::cache::SqliteCache;
use crate::infrastructure::storage::ensure_export_dir;
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::{
    delete, dev::Server, get, post, web, App, HttpRequest, HttpResponse, HttpServer, ResponseError,
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use validator::Validate;

const LOG_CAPACITY: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
}

/// Values used when a request leaves a dashboard parameter out.
#[derive(Debug, Clone)]
pub struct QueryDefaults {
    pub stuck_days: i64,
    pub limit: usize,
    pub yearly_target: f64,
    pub company_alias: String,
}

pub struct HttpState {
    pub dashboard: Arc<DashboardUseCase>,
    pub insights: Arc<InsightsUseCase>,
    pub cache: Arc<SqliteCache>,
    pub gate: AccessGate,
    pub defaults: QueryDefaults,
    pub export_dir: PathBuf,
    pub logs: Arc<Mutex<Vec<LogEntry>>>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::SecurityError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::CrmError(_) | AppError::LLMError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        if matches!(self, AppError::SecurityError(_)) {
            response.insert_header((header::WWW_AUTHENTICATE, "Basic realm=\"dealpulse\""));
        }
        response.json(json!({ "error": self.to_string() }))
    }
}

type ApiResult = std::result::Result<HttpResponse, AppError>;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DashboardParams {
    pub period: Option<PeriodKind>,
    pub reference: Option<NaiveDate>,
    pub granularity: Option<Granularity>,
    #[validate(range(min = 1, max = 365))]
    pub stuck_days: Option<i64>,
    #[validate(range(min = 1, max = 100000))]
    pub limit: Option<usize>,
    /// Comma separated funnel names.
    pub funnels: Option<String>,
    /// Comma separated manager names.
    pub managers: Option<String>,
    pub department: Option<i64>,
    #[validate(range(min = 0.0))]
    pub yearly_target: Option<f64>,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl DashboardParams {
    pub fn into_query(self, defaults: &QueryDefaults) -> Result<DashboardQuery, AppError> {
        self.validate()?;
        Ok(DashboardQuery {
            period: self.period.unwrap_or_default(),
            reference: self.reference.unwrap_or_else(|| Local::now().date_naive()),
            granularity: self.granularity.unwrap_or_default(),
            stuck_days: self.stuck_days.unwrap_or(defaults.stuck_days),
            limit: self.limit.unwrap_or(defaults.limit),
            funnels: split_list(self.funnels.as_deref()),
            managers: split_list(self.managers.as_deref()),
            department: self.department,
            yearly_target: self.yearly_target.unwrap_or(defaults.yearly_target),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub managers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    pub format: String,
}

#[derive(Debug, Deserialize)]
pub struct PurgeParams {
    #[serde(default)]
    pub all: bool,
}

fn authorize(data: &HttpState, req: &HttpRequest) -> Result<(), AppError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    data.gate.check_header(header).map_err(|e| {
        add_log(&data.logs, "WARN", "HttpApi", &format!("Rejected {}: {}", req.path(), e));
        e
    })
}

/// Records a failed request in the log ring and hands the error back.
fn failed(data: &HttpState, action: &str, e: AppError) -> AppError {
    let level = if e.is_client_error() { "WARN" } else { "ERROR" };
    add_log(&data.logs, level, "HttpApi", &format!("{} failed: {}", action, e));
    e
}

async fn load(
    data: &HttpState,
    params: DashboardParams,
    action: &str,
) -> Result<(DashboardQuery, LoadedDeals), AppError> {
    let query = params.into_query(&data.defaults)?;
    add_log(
        &data.logs,
        "INFO",
        "HttpApi",
        &format!("{} ({:?} around {})", action, query.period, query.reference),
    );
    let loaded = data.dashboard.load(&query).await.map_err(|e| failed(data, action, e))?;
    Ok((query, loaded))
}

#[get("/health")]
async fn health(data: web::Data<HttpState>) -> ApiResult {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "source": data.dashboard.source()?,
        "ai": data.insights.is_available(),
    })))
}

#[get("/dashboard")]
async fn dashboard(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let query = params.into_inner().into_query(&data.defaults)?;
    add_log(
        &data.logs,
        "INFO",
        "HttpApi",
        &format!("Dashboard ({:?} around {})", query.period, query.reference),
    );
    let report = data.dashboard.report(&query).await.map_err(|e| failed(&data, "Dashboard", e))?;
    Ok(HttpResponse::Ok().json(report))
}

#[get("/deals")]
async fn deals(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "Deals").await?;
    Ok(HttpResponse::Ok().json(loaded.current))
}

#[get("/managers")]
async fn managers(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "Managers").await?;
    Ok(HttpResponse::Ok().json(DashboardUseCase::managers_report(&loaded.current)))
}

#[get("/plan")]
async fn plan(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let query = params.into_inner().into_query(&data.defaults)?;
    let yearly = data.dashboard.plan(&query).await.map_err(|e| failed(&data, "Plan", e))?;
    Ok(HttpResponse::Ok().json(yearly))
}

#[get("/export/{name}")]
async fn export_document(
    data: web::Data<HttpState>,
    req: HttpRequest,
    name: web::Path<String>,
    params: web::Query<DashboardParams>,
) -> ApiResult {
    authorize(&data, &req)?;
    let doc = ReportDocument::from_name(&name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown report '{}'", name)))?;
    let (_, loaded) = load(&data, params.into_inner(), "Export").await?;
    let body = render(doc, &loaded.current, &manager_zones(&loaded.current))?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", doc.file_name()),
        ))
        .body(body))
}

#[get("/export")]
async fn export_bundle(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "Export").await?;
    let body = bundle_zip(&loaded.current, &manager_zones(&loaded.current))?;
    Ok(HttpResponse::Ok()
        .content_type("application/zip")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", BUNDLE_NAME),
        ))
        .body(body))
}

#[post("/export")]
async fn export_all(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "Export").await?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let dir = ensure_export_dir(&data.export_dir, &stamp)?;
    let written = write_reports(&dir, &loaded.current, &manager_zones(&loaded.current))?;
    let files: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
    add_log(&data.logs, "INFO", "HttpApi", &format!("Exported {} reports to {}", files.len(), dir.display()));
    Ok(HttpResponse::Ok().json(json!({ "files": files })))
}

#[post("/import")]
async fn import(
    data: web::Data<HttpState>,
    req: HttpRequest,
    params: web::Query<ImportParams>,
    body: web::Bytes,
) -> ApiResult {
    authorize(&data, &req)?;
    let format = match params.format.trim().to_ascii_lowercase().as_str() {
        "csv" => TableFormat::Csv,
        "xlsx" => TableFormat::Xlsx,
        other => {
            return Err(AppError::ValidationError(format!("Unsupported format '{}'", other)));
        }
    };
    if body.is_empty() {
        return Err(AppError::ValidationError("Empty upload".to_string()));
    }
    let dataset = import_bytes(&body, format).map_err(|e| failed(&data, "Import", e))?;
    let summary = json!({ "deals": dataset.deals.len(), "managers": dataset.managers.len() });
    data.dashboard.set_offline(dataset)?;
    add_log(&data.logs, "INFO", "HttpApi", &format!("Imported offline table: {}", summary));
    Ok(HttpResponse::Ok().json(summary))
}

#[delete("/import")]
async fn clear_import(data: web::Data<HttpState>, req: HttpRequest) -> ApiResult {
    authorize(&data, &req)?;
    data.dashboard.clear_offline()?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/ai/summary")]
async fn ai_summary(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "AI summary").await?;
    let zones = manager_zones(&loaded.current);
    let summary = data
        .insights
        .summarize(&data.defaults.company_alias, &zones, &loaded.current)
        .await;
    Ok(HttpResponse::Ok().json(summary))
}

#[post("/ai/recommendations")]
async fn ai_recommendations(
    data: web::Data<HttpState>,
    req: HttpRequest,
    params: web::Query<DashboardParams>,
) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "AI recommendations").await?;
    let avg_health = mean(loaded.current.iter().map(|d| d.health as f64));
    let text = data
        .insights
        .health_recommendations(avg_health, &DealStats::from_deals(&loaded.current))
        .await;
    Ok(HttpResponse::Ok().json(json!({ "text": text })))
}

#[post("/ai/ask")]
async fn ai_ask(
    data: web::Data<HttpState>,
    req: HttpRequest,
    params: web::Query<DashboardParams>,
    body: web::Json<AskRequest>,
) -> ApiResult {
    authorize(&data, &req)?;
    body.validate()?;
    let (_, loaded) = load(&data, params.into_inner(), "AI question").await?;
    let answer = data.insights.ask(&loaded.current, &body.question).await?;
    Ok(HttpResponse::Ok().json(json!({ "answer": answer })))
}

#[post("/ai/managers")]
async fn ai_managers(
    data: web::Data<HttpState>,
    req: HttpRequest,
    params: web::Query<DashboardParams>,
    body: web::Json<ReviewRequest>,
) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "AI manager review").await?;
    let report = DashboardUseCase::managers_report(&loaded.current);
    let names = if body.managers.is_empty() {
        report.zones.iter().map(|z| z.manager.clone()).collect()
    } else {
        body.managers.clone()
    };
    let reviews = data
        .insights
        .manager_reviews(&report.performance, &report.zones, &names)
        .await;
    Ok(HttpResponse::Ok().json(reviews))
}

#[post("/ai/analyze")]
async fn ai_analyze(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<DashboardParams>) -> ApiResult {
    authorize(&data, &req)?;
    let (_, loaded) = load(&data, params.into_inner(), "AI deal analysis").await?;
    Ok(HttpResponse::Ok().json(data.insights.analyze_deals(&loaded.raws).await))
}

#[post("/cache/purge")]
async fn purge_cache(data: web::Data<HttpState>, req: HttpRequest, params: web::Query<PurgeParams>) -> ApiResult {
    authorize(&data, &req)?;
    let removed = if params.all {
        data.cache.clear().await?
    } else {
        data.cache.purge_expired().await?
    };
    add_log(&data.logs, "INFO", "HttpApi", &format!("Cache purge removed {} entries", removed));
    Ok(HttpResponse::Ok().json(json!({ "removed": removed, "stats": data.cache.stats().await? })))
}

#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>, req: HttpRequest) -> ApiResult {
    authorize(&data, &req)?;
    let logs = data
        .logs
        .lock()
        .map_err(|_| AppError::Internal("Log buffer lock poisoned".to_string()))?;
    Ok(HttpResponse::Ok().json(&*logs))
}

pub fn add_log_entry(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) -> LogEntry {
    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
    };
    if let Ok(mut logs) = logs.lock() {
        logs.push(entry.clone());
        if logs.len() > LOG_CAPACITY {
            logs.remove(0);
        }
    }
    entry
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    add_log_entry(logs, level, source, message);
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health)
            .service(dashboard)
            .service(deals)
            .service(managers)
            .service(plan)
            .service(export_bundle)
            .service(export_document)
            .service(export_all)
            .service(import)
            .service(clear_import)
            .service(ai_summary)
            .service(ai_recommendations)
            .service(ai_ask)
            .service(ai_managers)
            .service(ai_analyze)
            .service(purge_cache)
            .service(get_logs),
    );
}

pub fn start_server(state: HttpState, bind_address: &str, port: u16) -> std::io::Result<Server> {
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(32 * 1024 * 1024))
            .configure(configure)
    })
    .bind((bind_address, port))?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::stage_rules::StageRules;
    use crate::domain::llm_config::LLMConfig;
    use crate::infrastructure::llm_clients::LLMClient;
    use actix_web::test::{call_service, init_service, read_body, read_body_json, TestRequest};
    use base64::Engine;

    struct SilentLlm;

    #[async_trait::async_trait]
    impl LLMClient for SilentLlm {
        async fn generate(&self, _config: &LLMConfig, _system: &str, _user: &str) -> crate::domain::error::Result<String> {
            Err(AppError::LLMError("offline".to_string()))
        }
    }

    async fn state(gate: AccessGate) -> web::Data<HttpState> {
        let cache = Arc::new(SqliteCache::in_memory().await.unwrap());
        let dir = tempfile::tempdir().unwrap();
        web::Data::new(HttpState {
            dashboard: Arc::new(DashboardUseCase::new(None, cache.clone(), StageRules::default())),
            insights: Arc::new(InsightsUseCase::new(Arc::new(SilentLlm), LLMConfig::default(), "English")),
            cache,
            gate,
            defaults: QueryDefaults {
                stuck_days: 5,
                limit: 600,
                yearly_target: 1_000_000.0,
                company_alias: "Focus LLC".to_string(),
            },
            export_dir: dir.into_path(),
            logs: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn basic(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            base64::prelude::BASE64_STANDARD.encode(format!("{}:{}", user, pass))
        )
    }

    const CSV: &str = "ID;TITLE;STAGE_ID;OPPORTUNITY;ASSIGNED_BY_ID;COMPANY_ID;CONTACT_ID;PROBABILITY;DATE_CREATE;DATE_MODIFY;LAST_ACTIVITY_TIME;manager\n\
        1;Pumps;NEW;1000;7;3;4;50;2025-03-05 10:00:00;2025-03-06 10:00:00;2025-03-06 10:00:00;Anna\n\
        2;Valves;LOSE;500;8;0;0;0;2025-03-07 10:00:00;2025-03-07 10:00:00;;Boris\n";

    #[actix_web::test]
    async fn test_health_needs_no_credentials() {
        let app = init_service(App::new().app_data(state(AccessGate::default()).await).configure(configure)).await;
        let resp = call_service(&app, TestRequest::get().uri("/api/health").to_request()).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ai"], false);
    }

    #[actix_web::test]
    async fn test_protected_routes_require_basic_auth() {
        let data = state(AccessGate::default()).await;
        let app = init_service(App::new().app_data(data.clone()).configure(configure)).await;

        let resp = call_service(&app, TestRequest::get().uri("/api/logs").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

        let req = TestRequest::get()
            .uri("/api/logs")
            .insert_header((header::AUTHORIZATION, basic("admin", "admin123")))
            .to_request();
        let resp = call_service(&app, req).await;
        assert!(resp.status().is_success());
        let logs: Vec<LogEntry> = read_body_json(resp).await;
        assert_eq!(logs[0].level, "WARN");
    }

    #[actix_web::test]
    async fn test_dashboard_without_source_is_bad_request() {
        let app = init_service(
            App::new()
                .app_data(state(AccessGate::new(true, "admin", "")).await)
                .configure(configure),
        )
        .await;
        let resp = call_service(&app, TestRequest::get().uri("/api/dashboard").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/api/deals?stuck_days=0").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_import_then_dashboard_and_export() {
        let app = init_service(
            App::new()
                .app_data(state(AccessGate::new(true, "admin", "")).await)
                .configure(configure),
        )
        .await;

        let req = TestRequest::post()
            .uri("/api/import?format=csv")
            .set_payload(CSV)
            .to_request();
        let resp = call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["deals"], 2);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/api/dashboard?period=month&reference=2025-03-15")
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        let report: serde_json::Value = read_body_json(resp).await;
        assert_eq!(report["source"], "offline");
        assert_eq!(report["headline"]["total_deals"], 2);

        let resp = call_service(
            &app,
            TestRequest::get()
                .uri("/api/export/managers?reference=2025-03-15&managers=Anna")
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        let bytes = read_body(resp).await;
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Anna"));
        assert!(!text.contains("Boris"));

        let resp = call_service(
            &app,
            TestRequest::get().uri("/api/export/unknown").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = call_service(
            &app,
            TestRequest::get().uri("/api/export?reference=2025-03-15").to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "application/zip");
        let bytes = read_body(resp).await;
        assert!(bytes.starts_with(b"PK"));
    }

    #[actix_web::test]
    async fn test_ai_without_key_returns_static_text() {
        let app = init_service(
            App::new()
                .app_data(state(AccessGate::new(true, "admin", "")).await)
                .configure(configure),
        )
        .await;
        call_service(
            &app,
            TestRequest::post().uri("/api/import?format=csv").set_payload(CSV).to_request(),
        )
        .await;

        let req = TestRequest::post()
            .uri("/api/ai/ask?reference=2025-03-15")
            .set_json(json!({ "question": "Which deals are at risk?" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = read_body_json(resp).await;
        assert_eq!(body["answer"], crate::application::use_cases::ai_insights::NO_KEY_TEXT);

        let req = TestRequest::post()
            .uri("/api/ai/ask")
            .set_json(json!({ "question": "" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: AppError| e.status_code();
        assert_eq!(status(AppError::ValidationError("limit".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AppError::SecurityError("denied".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AppError::NotFound("report".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(AppError::CrmError("crm.deal.list returned invalid JSON".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status(AppError::LLMError("timeout".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(AppError::ParseError("Corrupt cache entry".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status(AppError::DatabaseError("locked".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_split_list_and_defaults() {
        assert_eq!(split_list(Some(" Main, ,Service ")), vec!["Main", "Service"]);
        let defaults = QueryDefaults {
            stuck_days: 7,
            limit: 100,
            yearly_target: 5.0,
            company_alias: String::new(),
        };
        let query = DashboardParams::default().into_query(&defaults).unwrap();
        assert_eq!(query.stuck_days, 7);
        assert_eq!(query.period, PeriodKind::Month);
        assert!(query.funnels.is_empty());
    }

    #[test]
    fn test_log_ring_is_bounded() {
        let logs = Mutex::new(Vec::new());
        for i in 0..(LOG_CAPACITY + 5) {
            add_log(&logs, "INFO", "Test", &i.to_string());
        }
        let logs = logs.lock().unwrap();
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs[0].message, "5");
    }
}
