use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Deal row as returned by `crm.deal.list` or read from an offline table.
///
/// Bitrix24 sends most numeric fields as strings, sometimes as numbers and
/// sometimes as `null`, so every field is kept as an optional string and
/// interpreted through the accessors below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RawDeal {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub stage_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub opportunity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub assigned_by_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub probability: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_create: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date_modify: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_activity_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub begindate: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub closedate: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub closed: Option<String>,
}

impl RawDeal {
    pub fn deal_id(&self) -> Option<i64> {
        parse_int(self.id.as_deref())
    }

    pub fn amount(&self) -> f64 {
        parse_float(self.opportunity.as_deref()).unwrap_or(0.0)
    }

    pub fn probability_pct(&self) -> f64 {
        parse_float(self.probability.as_deref()).unwrap_or(0.0)
    }

    pub fn manager_id(&self) -> i64 {
        parse_int(self.assigned_by_id.as_deref()).unwrap_or(0)
    }

    pub fn has_company(&self) -> bool {
        parse_int(self.company_id.as_deref()).unwrap_or(0) != 0
    }

    pub fn has_contact(&self) -> bool {
        parse_int(self.contact_id.as_deref()).unwrap_or(0) != 0
    }

    pub fn category(&self) -> i64 {
        parse_int(self.category_id.as_deref()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.closed.as_deref(), Some("Y") | Some("y") | Some("true") | Some("1"))
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        self.date_create.as_deref().and_then(parse_timestamp)
    }

    pub fn modified_at(&self) -> Option<NaiveDateTime> {
        self.date_modify.as_deref().and_then(parse_timestamp)
    }

    pub fn last_activity_at(&self) -> Option<NaiveDateTime> {
        self.last_activity_time.as_deref().and_then(parse_timestamp)
    }

    pub fn begin_at(&self) -> Option<NaiveDateTime> {
        self.begindate.as_deref().and_then(parse_timestamp)
    }

    pub fn closed_at(&self) -> Option<NaiveDateTime> {
        self.closedate.as_deref().and_then(parse_timestamp)
    }
}

/// Data-hygiene flags derived for every deal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealFlags {
    pub no_company: bool,
    pub no_contact: bool,
    pub no_tasks: bool,
    pub stuck: bool,
    pub lost: bool,
}

impl DealFlags {
    /// Human-readable risk labels, excluding `lost` which is reported separately.
    pub fn risks(&self) -> Vec<&'static str> {
        let mut risks = Vec::new();
        if self.no_tasks {
            risks.push("no tasks");
        }
        if self.no_company {
            risks.push("no company");
        }
        if self.no_contact {
            risks.push("no contact");
        }
        if self.stuck {
            risks.push("stuck");
        }
        risks
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDeal {
    pub id: i64,
    pub title: String,
    pub manager_id: i64,
    pub manager: String,
    pub stage_id: String,
    pub stage_name: String,
    pub category_id: i64,
    pub funnel: String,
    pub amount: f64,
    pub probability: f64,
    pub created_at: Option<NaiveDateTime>,
    pub modified_at: Option<NaiveDateTime>,
    pub last_activity_at: Option<NaiveDateTime>,
    pub stage_started_at: Option<NaiveDateTime>,
    pub closed_at: Option<NaiveDateTime>,
    pub closed: bool,
    pub days_in_work: i64,
    pub days_no_activity: i64,
    pub days_in_stage: i64,
    pub health: u8,
    pub potential: u8,
    pub flags: DealFlags,
    pub success: bool,
    pub failure: bool,
}

impl ScoredDeal {
    pub fn created_date(&self) -> Option<NaiveDate> {
        self.created_at.map(|ts| ts.date())
    }
}

/// Parses the timestamp shapes seen in Bitrix24 payloads and spreadsheet
/// exports. Offsets are normalised to UTC and dropped.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.naive_utc());
    }
    if let Ok(ts) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(ts.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d.%m.%Y %H:%M:%S", "%d.%m.%Y %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ts);
        }
    }
    for format in ["%Y-%m-%d", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

pub fn parse_int(value: Option<&str>) -> Option<i64> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}

pub fn parse_float(value: Option<&str>) -> Option<f64> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', ".")
        .replace(' ', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Accepts a string, number, bool or null and keeps it as an optional string.
pub fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Bool(b)) => Some(if b { "Y" } else { "N" }.to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}
