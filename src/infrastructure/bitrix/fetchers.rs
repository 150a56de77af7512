//! Typed Bitrix24 fetchers on top of [`BitrixClient`].

use super::client::{batch_command, items_of, BitrixClient, Params};
use super::{CrmSource, DealQuery};
use crate::application::use_cases::stage_rules::stage_category;
use crate::domain::crm::{Category, Department, Manager, Stage, StageHistoryEntry};
use crate::domain::deal::{parse_int, parse_timestamp, RawDeal};
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

pub const DEAL_FIELDS: [&str; 15] = [
    "ID",
    "TITLE",
    "STAGE_ID",
    "OPPORTUNITY",
    "ASSIGNED_BY_ID",
    "COMPANY_ID",
    "CONTACT_ID",
    "PROBABILITY",
    "DATE_CREATE",
    "DATE_MODIFY",
    "LAST_ACTIVITY_TIME",
    "CATEGORY_ID",
    "BEGINDATE",
    "CLOSEDATE",
    "CLOSED",
];

/// Deal ids per activity/history request; keeps URLs short.
pub const ID_CHUNK: usize = 40;
const DEFAULT_STAGE_SORT: i64 = 5000;
const DEAL_ENTITY_TYPE: &str = "2";

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

/// Field as text whether Bitrix sent a string or a number.
fn text(row: &Value, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int(row: &Value, key: &str) -> Option<i64> {
    parse_int(text(row, key).as_deref())
}

pub fn deal_params(query: &DealQuery) -> Params {
    let mut params: Params = DEAL_FIELDS
        .iter()
        .map(|field| param("select[]", field))
        .collect();
    params.push(param("order[DATE_CREATE]", "DESC"));
    if let Some(from) = query.date_from {
        params.push(param("filter[>=DATE_CREATE]", format!("{}T00:00:00", from)));
    }
    if let Some(to) = query.date_to {
        params.push(param("filter[<=DATE_CREATE]", format!("{}T23:59:59", to)));
    }
    params
}

pub fn parse_user(row: &Value) -> Option<Manager> {
    let id = int(row, "ID")?;
    let full = format!(
        "{} {}",
        text(row, "NAME").unwrap_or_default(),
        text(row, "LAST_NAME").unwrap_or_default()
    );
    let name = match full.trim() {
        "" => text(row, "LOGIN").unwrap_or_else(|| format!("User {}", id)),
        trimmed => trimmed.to_string(),
    };
    let departments = match row.get("UF_DEPARTMENT") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
            .collect(),
        Some(Value::String(s)) => s.split(',').filter_map(|p| p.trim().parse().ok()).collect(),
        Some(Value::Number(n)) => n.as_i64().into_iter().collect(),
        _ => Vec::new(),
    };
    let active = match row.get("ACTIVE") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "Y",
        _ => true,
    };
    Some(Manager {
        id,
        name,
        departments,
        active,
    })
}

pub fn parse_department(row: &Value) -> Option<Department> {
    Some(Department {
        id: int(row, "ID")?,
        name: text(row, "NAME").unwrap_or_default(),
        parent_id: int(row, "PARENT"),
    })
}

/// Accepts both `crm.category.list` (lowercase keys) and the legacy
/// `crm.dealcategory.list` rows.
pub fn parse_category(row: &Value) -> Option<Category> {
    let id = int(row, "id").or_else(|| int(row, "ID"))?;
    let name = text(row, "name")
        .or_else(|| text(row, "NAME"))
        .unwrap_or_else(|| format!("Funnel {}", id));
    Some(Category { id, name })
}

pub fn parse_stage(row: &Value, category_id: i64) -> Option<Stage> {
    let status_id = text(row, "STATUS_ID")?;
    let name = text(row, "NAME")
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| status_id.clone());
    Some(Stage {
        category_id: stage_category(&status_id).unwrap_or(category_id),
        sort: int(row, "SORT").unwrap_or(DEFAULT_STAGE_SORT),
        status_id,
        name,
    })
}

pub fn parse_history(row: &Value) -> Option<StageHistoryEntry> {
    Some(StageHistoryEntry {
        owner_id: int(row, "OWNER_ID")?,
        stage_id: text(row, "STAGE_ID")?,
        created_time: parse_timestamp(&text(row, "CREATED_TIME")?)?,
    })
}

fn id_filter(key: &str, ids: &[i64]) -> Params {
    ids.iter().map(|id| param(key, id)).collect()
}

impl BitrixClient {
    async fn category_stages(&self, category_ids: &[i64]) -> Result<Vec<Stage>> {
        let commands: Vec<(String, String)> = category_ids
            .iter()
            .map(|cid| {
                let params = vec![param("filter[ENTITY_ID]", format!("DEAL_STAGE_{}", cid))];
                (format!("c{}", cid), batch_command("crm.status.list", &params))
            })
            .collect();
        let results = self.batch(&commands).await?;

        let mut stages = Vec::new();
        for cid in category_ids {
            let mut rows = results
                .get(&format!("c{}", cid))
                .map(items_of)
                .unwrap_or_default();
            if rows.is_empty() {
                let body = self
                    .call("crm.dealcategory.stage.list", &[param("id", cid)])
                    .await;
                match body {
                    Ok(body) => rows = items_of(body.get("result").unwrap_or(&Value::Null)),
                    Err(e) => warn!(category = cid, error = %e, "Legacy stage list failed"),
                }
            }
            stages.extend(rows.iter().filter_map(|row| parse_stage(row, *cid)));
        }
        Ok(stages)
    }
}

#[async_trait]
impl CrmSource for BitrixClient {
    async fn deals(&self, query: &DealQuery) -> Result<Vec<RawDeal>> {
        let rows = self.list("crm.deal.list", &deal_params(query), query.limit).await?;
        let deals = rows
            .into_iter()
            .map(serde_json::from_value::<RawDeal>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::CrmError(format!("Unexpected deal payload: {}", e)))?;
        info!(count = deals.len(), "Loaded deals");
        Ok(deals)
    }

    async fn users(&self) -> Result<Vec<Manager>> {
        let rows = self.list("user.get", &[], None).await?;
        Ok(rows.iter().filter_map(parse_user).collect())
    }

    async fn departments(&self) -> Result<Vec<Department>> {
        let rows = self.list("department.get", &[], None).await?;
        Ok(rows.iter().filter_map(parse_department).collect())
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        let params = vec![param("entityTypeId", DEAL_ENTITY_TYPE)];
        let rows = match self.list("crm.category.list", &params, None).await {
            Ok(rows) if !rows.is_empty() => rows,
            Ok(_) => self.list("crm.dealcategory.list", &[], None).await?,
            Err(e) => {
                warn!(error = %e, "crm.category.list failed, using crm.dealcategory.list");
                self.list("crm.dealcategory.list", &[], None).await?
            }
        };
        Ok(rows.iter().filter_map(parse_category).collect())
    }

    async fn stages(&self, category_ids: &[i64]) -> Result<Vec<Stage>> {
        let base = vec![param("filter[ENTITY_ID]", "DEAL_STAGE")];
        let mut stages: Vec<Stage> = self
            .list("crm.status.list", &base, None)
            .await?
            .iter()
            .filter_map(|row| parse_stage(row, 0))
            .collect();

        let extra: Vec<i64> = category_ids
            .iter()
            .copied()
            .filter(|cid| *cid > 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !extra.is_empty() {
            stages.extend(self.category_stages(&extra).await?);
        }
        Ok(stages)
    }

    async fn open_activity_counts(&self, deal_ids: &[i64]) -> Result<HashMap<i64, usize>> {
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for chunk in deal_ids.chunks(ID_CHUNK) {
            let mut params = vec![
                param("filter[OWNER_TYPE_ID]", DEAL_ENTITY_TYPE),
                param("filter[COMPLETED]", "N"),
                param("select[]", "ID"),
                param("select[]", "OWNER_ID"),
            ];
            params.extend(id_filter("filter[OWNER_ID][]", chunk));
            for row in self.list("crm.activity.list", &params, None).await? {
                if let Some(owner) = int(&row, "OWNER_ID") {
                    *counts.entry(owner).or_default() += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn stage_history(&self, deal_ids: &[i64]) -> Result<Vec<StageHistoryEntry>> {
        let mut entries = Vec::new();
        for chunk in deal_ids.chunks(ID_CHUNK) {
            let mut params = vec![
                param("entityTypeId", DEAL_ENTITY_TYPE),
                param("order[ID]", "ASC"),
            ];
            params.extend(id_filter("filter[OWNER_ID][]", chunk));
            let rows = self.list("crm.stagehistory.deal.list", &params, None).await?;
            entries.extend(rows.iter().filter_map(parse_history));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bitrix::BitrixSettings;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_parse_user_name_fallbacks() {
        let full = parse_user(&json!({
            "ID": "7", "NAME": "Anna", "LAST_NAME": "Ivanova",
            "UF_DEPARTMENT": [1, "3"], "ACTIVE": true
        }))
        .unwrap();
        assert_eq!(full.name, "Anna Ivanova");
        assert_eq!(full.departments, vec![1, 3]);
        assert!(full.active);

        let login = parse_user(&json!({
            "ID": 8, "NAME": "", "LAST_NAME": " ", "LOGIN": "petrov",
            "UF_DEPARTMENT": "2, 5", "ACTIVE": "N"
        }))
        .unwrap();
        assert_eq!(login.name, "petrov");
        assert_eq!(login.departments, vec![2, 5]);
        assert!(!login.active);

        assert!(parse_user(&json!({ "NAME": "No id" })).is_none());
    }

    #[test]
    fn test_parse_stage_and_category() {
        let stage = parse_stage(&json!({ "STATUS_ID": "C3:WON", "NAME": "" }), 0).unwrap();
        assert_eq!(stage.name, "C3:WON");
        assert_eq!(stage.category_id, 3);
        assert_eq!(stage.sort, 5000);

        let cat = parse_category(&json!({ "id": 4, "name": "Service" })).unwrap();
        assert_eq!((cat.id, cat.name.as_str()), (4, "Service"));
        let legacy = parse_category(&json!({ "ID": "5", "NAME": "Dealers" })).unwrap();
        assert_eq!(legacy.id, 5);
    }

    #[test]
    fn test_deal_params_date_filters() {
        let params = deal_params(&DealQuery {
            date_from: NaiveDate::from_ymd_opt(2025, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2025, 3, 31),
            limit: None,
        });
        assert_eq!(params.iter().filter(|(k, _)| k == "select[]").count(), 15);
        assert!(params.contains(&param("filter[>=DATE_CREATE]", "2025-01-01T00:00:00")));
        assert!(params.contains(&param("filter[<=DATE_CREATE]", "2025-03-31T23:59:59")));
    }

    #[test]
    fn test_parse_history() {
        let entry = parse_history(&json!({
            "OWNER_ID": "12", "STAGE_ID": "PREPARATION", "CREATED_TIME": "2025-02-01T10:00:00+03:00"
        }))
        .unwrap();
        assert_eq!(entry.owner_id, 12);
        assert_eq!(entry.created_time.to_string(), "2025-02-01 07:00:00");
    }

    async fn portal(req: HttpRequest, body: Option<web::Json<Value>>) -> HttpResponse {
        let method = req.match_info().get("method").unwrap_or_default().to_string();
        let query: Vec<(String, String)> =
            url::form_urlencoded::parse(req.query_string().as_bytes()).into_owned().collect();
        let has = |k: &str, v: &str| query.iter().any(|(qk, qv)| qk == k && qv == v);
        let result = match method.as_str() {
            "crm.category.list" => json!({ "categories": [] }),
            "crm.dealcategory.list" => json!([{ "ID": "3", "NAME": "Service" }]),
            "crm.status.list" if has("filter[ENTITY_ID]", "DEAL_STAGE") => json!([
                { "STATUS_ID": "NEW", "NAME": "New", "SORT": "10" },
                { "STATUS_ID": "WON", "NAME": "Won", "SORT": "60" }
            ]),
            "crm.dealcategory.stage.list" => json!([{ "STATUS_ID": "C3:NEW", "NAME": "Intake", "SORT": 10 }]),
            "crm.activity.list" => json!([
                { "ID": "1", "OWNER_ID": "10" },
                { "ID": "2", "OWNER_ID": "10" },
                { "ID": "3", "OWNER_ID": "11" }
            ]),
            "batch" => {
                let cmd = body.map(|b| b["cmd"].clone()).unwrap_or_default();
                let names: Vec<String> = cmd.as_object().map(|o| o.keys().cloned().collect()).unwrap_or_default();
                let empty: serde_json::Map<String, Value> =
                    names.into_iter().map(|n| (n, json!([]))).collect();
                return HttpResponse::Ok().json(json!({ "result": { "result": empty, "result_error": [] } }));
            }
            _ => json!([]),
        };
        HttpResponse::Ok().json(json!({ "result": result, "total": 0 }))
    }

    fn spawn_portal() -> String {
        let server = HttpServer::new(|| App::new().route("/hook/{method}.json", web::to(portal)))
            .workers(1)
            .bind(("127.0.0.1", 0))
            .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}/hook", addr)
    }

    fn client(hook: &str) -> BitrixClient {
        BitrixClient::new(
            hook,
            BitrixSettings {
                page_pause: Duration::from_millis(1),
                timeout: Duration::from_secs(5),
                use_batch: true,
            },
        )
        .unwrap()
    }

    #[actix_web::test]
    async fn test_categories_fall_back_to_legacy_method() {
        let hook = spawn_portal();
        let cats = client(&hook).categories().await.unwrap();
        assert_eq!(cats, vec![Category { id: 3, name: "Service".into() }]);
    }

    #[actix_web::test]
    async fn test_stages_include_category_fallback() {
        let hook = spawn_portal();
        let stages = client(&hook).stages(&[0, 3, 3]).await.unwrap();
        let ids: Vec<&str> = stages.iter().map(|s| s.status_id.as_str()).collect();
        assert_eq!(ids, vec!["NEW", "WON", "C3:NEW"]);
        assert_eq!(stages[2].category_id, 3);
        assert_eq!(stages[0].sort, 10);
    }

    #[actix_web::test]
    async fn test_open_activity_counts() {
        let hook = spawn_portal();
        let counts = client(&hook).open_activity_counts(&[10, 11]).await.unwrap();
        assert_eq!(counts.get(&10), Some(&2));
        assert_eq!(counts.get(&11), Some(&1));
    }
}
