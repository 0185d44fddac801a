//! Typed tool parameters and the checks shared between reporting operations.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::Rejection;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivitySearch {
    #[serde(default, rename = "identityIds", alias = "identityids", deserialize_with = "lenient_string")]
    pub identity_ids: Option<String>,
    #[serde(default, rename = "startDate", deserialize_with = "lenient_string")]
    pub start_date: Option<String>,
    #[serde(default, rename = "endDate", deserialize_with = "lenient_string")]
    pub end_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub verdict: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfectedLookupQuery {
    #[serde(default, rename = "identityIds", alias = "identityids", deserialize_with = "lenient_string")]
    pub identity_ids: Option<String>,
    #[serde(default, rename = "startDate", deserialize_with = "lenient_string")]
    pub start_date: Option<String>,
    #[serde(default, rename = "endDate", deserialize_with = "lenient_string")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRange {
    #[serde(default, rename = "startDate", deserialize_with = "lenient_string")]
    pub start_date: Option<String>,
    #[serde(default, rename = "endDate", deserialize_with = "lenient_string")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentitySearch {
    #[serde(default, deserialize_with = "lenient_string")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationListRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub access: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
}

/// Accepts a string, a number, or an array of those (joined with commas).
/// Blank strings become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let text = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(serde::de::Error::custom(format!("unsupported list entry: {other}"))),
            })
            .collect::<Result<Vec<_>, _>>()?
            .join(","),
        Some(other) => return Err(serde::de::Error::custom(format!("expected a string, got {other}"))),
    };
    let trimmed = text.trim();
    Ok(if trimmed.is_empty() { None } else { Some(trimmed.to_string()) })
}

/// Parses an ISO-8601 date or timestamp into epoch milliseconds.
/// Bare dates are taken as midnight UTC; timestamps without an offset as UTC.
/// Seconds may be omitted.
pub fn to_epoch_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive).timestamp_millis());
    }
    let minutes = raw.strip_suffix('Z').unwrap_or(raw);
    if let Ok(naive) = NaiveDateTime::parse_from_str(minutes, "%Y-%m-%dT%H:%M") {
        return Some(Utc.from_utc_datetime(&naive).timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

/// Both ends must be present and parseable; each failure names its field.
pub fn require_range(start: Option<&str>, end: Option<&str>) -> Result<(i64, i64), Rejection> {
    let start = start.ok_or_else(|| Rejection::new("No start date provided. Ask the user for a start date"))?;
    let end = end.ok_or_else(|| Rejection::new("No end date provided. Ask the user for an end date"))?;
    let from = to_epoch_millis(start)
        .ok_or_else(|| Rejection::new(format!("Invalid start date '{start}'. Provide an ISO-8601 date")))?;
    let to = to_epoch_millis(end)
        .ok_or_else(|| Rejection::new(format!("Invalid end date '{end}'. Provide an ISO-8601 date")))?;
    Ok((from, to))
}

/// Normalizes a comma-separated identity id list. Every token must be an integer.
pub fn parse_identity_ids(raw: Option<&str>) -> Result<Option<String>, Rejection> {
    let Some(raw) = raw else { return Ok(None) };
    let ids = raw
        .split(',')
        .map(|token| token.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| {
            Rejection::new(
                "Invalid identity ids provided. If names or emails are provided, the identity ids must be fetched with the identity lookup first",
            )
        })?;
    Ok(Some(ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")))
}
