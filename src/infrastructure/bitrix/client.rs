//! Bitrix24 REST transport: single calls, sequential pagination and the
//! `batch` endpoint.

use crate::domain::error::{AppError, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bitrix24 list methods return at most this many rows per call.
pub const PAGE_SIZE: usize = 50;
/// Maximum number of sub-commands accepted by `batch.json`.
pub const BATCH_LIMIT: usize = 50;

pub type Params = Vec<(String, String)>;

#[derive(Debug, Clone)]
pub struct BitrixSettings {
    pub page_pause: Duration,
    pub timeout: Duration,
    pub use_batch: bool,
}

impl Default for BitrixSettings {
    fn default() -> Self {
        Self {
            page_pause: Duration::from_millis(400),
            timeout: Duration::from_secs(30),
            use_batch: true,
        }
    }
}

pub struct BitrixClient {
    client: reqwest::Client,
    webhook: String,
    settings: BitrixSettings,
}

/// Rows of a list response: `result` is either the array itself or an object
/// wrapping it under `items` (or `categories` for `crm.category.list`).
pub fn items_of(result: &Value) -> Vec<Value> {
    match result {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => ["items", "categories"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn check_error(body: &Value) -> Result<()> {
    if let Some(code) = body.get("error").and_then(Value::as_str) {
        let description = body
            .get("error_description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(AppError::CrmError(format!("{}: {}", code, description)));
    }
    Ok(())
}

/// `method?query` string for a batch sub-command.
pub fn batch_command(method: &str, params: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    let query = serializer.finish();
    if query.is_empty() {
        method.to_string()
    } else {
        format!("{}?{}", method, query)
    }
}

impl BitrixClient {
    pub fn new(webhook: &str, settings: BitrixSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::CrmError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            webhook: webhook.trim().trim_end_matches('/').to_string(),
            settings,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}.json", self.webhook, method)
    }

    async fn decode(response: reqwest::Response, method: &str) -> Result<Value> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::CrmError(format!("{} read failed: {}", method, e)))?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                AppError::CrmError(format!("{} returned invalid JSON: {}", method, e))
            } else {
                AppError::CrmError(format!("{} failed ({}): {}", method, status, text))
            }
        })?;
        check_error(&body)?;
        if !status.is_success() {
            return Err(AppError::CrmError(format!("{} failed ({})", method, status)));
        }
        Ok(body)
    }

    /// One `GET {webhook}/{method}.json` call; returns the whole response body.
    pub async fn call(&self, method: &str, params: &[(String, String)]) -> Result<Value> {
        let response = self
            .client
            .get(self.method_url(method))
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::CrmError(format!("{} request failed: {}", method, e)))?;
        Self::decode(response, method).await
    }

    /// All rows of a list method, batched when enabled.
    pub async fn list(&self, method: &str, params: &[(String, String)], limit: Option<usize>) -> Result<Vec<Value>> {
        if self.settings.use_batch {
            self.list_batched(method, params, limit).await
        } else {
            self.list_sequential(method, params, limit).await
        }
    }

    /// Pages through a list method with `start` offsets until a short or
    /// empty page, pausing between pages.
    pub async fn list_sequential(
        &self,
        method: &str,
        params: &[(String, String)],
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut start = 0usize;
        loop {
            let mut query = params.to_vec();
            query.push(("start".to_string(), start.to_string()));
            let body = self.call(method, &query).await?;
            let page = items_of(body.get("result").unwrap_or(&Value::Null));
            let page_len = page.len();
            items.extend(page);
            debug!(method, start, page_len, "Fetched page");

            if let Some(limit) = limit {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }
            if page_len < PAGE_SIZE {
                break;
            }
            start += PAGE_SIZE;
            tokio::time::sleep(self.settings.page_pause).await;
        }
        info!(method, total = items.len(), "List fetched");
        Ok(items)
    }

    /// First page directly, then the remaining `start` offsets (known from
    /// `total`) as batch sub-commands. Falls back to sequential paging when
    /// the first page carries no `total` or a batch page comes back missing.
    pub async fn list_batched(
        &self,
        method: &str,
        params: &[(String, String)],
        limit: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut query = params.to_vec();
        query.push(("start".to_string(), "0".to_string()));
        let first = self.call(method, &query).await?;
        let mut items = items_of(first.get("result").unwrap_or(&Value::Null));

        let more_wanted = items.len() >= PAGE_SIZE && limit.map_or(true, |l| l > PAGE_SIZE);
        let total = first
            .get("total")
            .and_then(|t| t.as_u64().or_else(|| t.as_str().and_then(|s| s.parse().ok())))
            .map(|t| t as usize);

        if more_wanted {
            let Some(total) = total else {
                warn!(method, "No total in first page, paging sequentially");
                return self.list_sequential(method, params, limit).await;
            };
            let wanted = limit.map(|l| l.min(total)).unwrap_or(total);
            let offsets: Vec<usize> = (PAGE_SIZE..wanted).step_by(PAGE_SIZE).collect();
            let commands: Vec<(String, String)> = offsets
                .iter()
                .map(|offset| {
                    let mut sub = params.to_vec();
                    sub.push(("start".to_string(), offset.to_string()));
                    (format!("p{}", offset), batch_command(method, &sub))
                })
                .collect();
            let results = self.batch(&commands).await?;
            for offset in offsets {
                match results.get(&format!("p{}", offset)) {
                    Some(result) => items.extend(items_of(result)),
                    None => {
                        warn!(method, offset, "Batch page missing, paging sequentially");
                        return self.list_sequential(method, params, limit).await;
                    }
                }
            }
        }

        if let Some(limit) = limit {
            items.truncate(limit);
        }
        info!(method, total = items.len(), "List fetched via batch");
        Ok(items)
    }

    /// Runs named sub-commands through `batch.json`, at most fifty per call.
    /// Failed sub-commands are logged and left out of the result.
    pub async fn batch(&self, commands: &[(String, String)]) -> Result<HashMap<String, Value>> {
        let mut results = HashMap::new();
        for (index, chunk) in commands.chunks(BATCH_LIMIT).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.page_pause).await;
            }
            let cmd: Map<String, Value> = chunk
                .iter()
                .map(|(name, command)| (name.clone(), Value::String(command.clone())))
                .collect();
            let response = self
                .client
                .post(self.method_url("batch"))
                .json(&json!({ "halt": 0, "cmd": cmd }))
                .send()
                .await
                .map_err(|e| AppError::CrmError(format!("batch request failed: {}", e)))?;
            let body = Self::decode(response, "batch").await?;

            let outer = body.get("result").cloned().unwrap_or(Value::Null);
            if let Some(errors) = outer.get("result_error").and_then(Value::as_object) {
                for (name, error) in errors {
                    warn!(command = %name, error = %error, "Batch sub-command failed");
                }
            }
            if let Some(ok) = outer.get("result").and_then(Value::as_object) {
                for (name, value) in ok {
                    results.insert(name.clone(), value.clone());
                }
            }
            debug!(chunk = index, commands = chunk.len(), "Batch executed");
        }
        Ok(results)
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Minimal Bitrix24 stand-in serving `total` synthetic deals.

    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    pub struct Calls {
        pub list: AtomicUsize,
        pub batch: AtomicUsize,
        pub batch_sizes: std::sync::Mutex<Vec<usize>>,
    }

    /// Deviations from a well-behaved portal.
    #[derive(Clone, Copy, Default)]
    pub struct Quirks {
        pub omit_total: bool,
        /// Batch sub-command for this `start` offset is silently dropped.
        pub drop_batch_start: Option<usize>,
    }

    struct Portal {
        total: usize,
        quirks: Quirks,
        calls: Arc<Calls>,
    }

    fn query_map(query: &str) -> HashMap<String, String> {
        url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
    }

    fn page(portal: &Portal, start: usize) -> Value {
        let rows: Vec<Value> = (start..(start + 50).min(portal.total))
            .map(|i| json!({ "ID": (i + 1).to_string(), "TITLE": format!("Deal {}", i + 1) }))
            .collect();
        let mut body = json!({ "result": rows });
        if !portal.quirks.omit_total {
            body["total"] = json!(portal.total);
        }
        if start + 50 < portal.total {
            body["next"] = json!(start + 50);
        }
        body
    }

    async fn deal_list(req: HttpRequest, portal: web::Data<Portal>) -> HttpResponse {
        portal.calls.list.fetch_add(1, Ordering::SeqCst);
        let query = query_map(req.query_string());
        let start = query.get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
        HttpResponse::Ok().json(page(&portal, start))
    }

    async fn batch(body: web::Json<Value>, portal: web::Data<Portal>) -> HttpResponse {
        portal.calls.batch.fetch_add(1, Ordering::SeqCst);
        let cmd = body["cmd"].as_object().cloned().unwrap_or_default();
        portal.calls.batch_sizes.lock().unwrap().push(cmd.len());
        let mut result = serde_json::Map::new();
        let mut errors = serde_json::Map::new();
        for (name, command) in cmd {
            let command = command.as_str().unwrap_or_default();
            let (method, query) = command.split_once('?').unwrap_or((command, ""));
            if method == "crm.deal.list" {
                let start = query_map(query).get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
                if portal.quirks.drop_batch_start == Some(start) {
                    continue;
                }
                result.insert(name, page(&portal, start)["result"].clone());
            } else {
                errors.insert(name, json!({ "error": "ERROR_METHOD_NOT_FOUND" }));
            }
        }
        HttpResponse::Ok().json(json!({ "result": { "result": result, "result_error": errors } }))
    }

    async fn broken() -> HttpResponse {
        HttpResponse::BadRequest().json(json!({
            "error": "INVALID_CREDENTIALS",
            "error_description": "Invalid request credentials"
        }))
    }

    async fn garbled() -> HttpResponse {
        HttpResponse::Ok().content_type("application/json").body("{\"result\": [")
    }

    pub fn spawn(total: usize) -> (String, Arc<Calls>) {
        spawn_with(total, Quirks::default())
    }

    pub fn spawn_with(total: usize, quirks: Quirks) -> (String, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let portal = web::Data::new(Portal {
            total,
            quirks,
            calls: calls.clone(),
        });
        let server = HttpServer::new(move || {
            App::new()
                .app_data(portal.clone())
                .route("/hook/crm.deal.list.json", web::get().to(deal_list))
                .route("/hook/batch.json", web::post().to(batch))
                .route("/hook/profile.json", web::get().to(broken))
                .route("/hook/user.get.json", web::get().to(garbled))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        (format!("http://{}/hook/", addr), calls)
    }
}
