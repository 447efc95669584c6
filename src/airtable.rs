//! Airtable problem-report sink
//!
//! Operators flag bad workflow results into an Airtable table. The record
//! schema on the Airtable side drifts occasionally, so a rejected field
//! (`UNKNOWN_FIELD_NAME` / `INVALID_VALUE_FOR_COLUMN`) triggers exactly one
//! retry with that field dropped.

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::config::AirtableConfig;
use crate::error::{ApiError, ErrorCode};
use crate::workflow::n8n::parse_body;

/// Serialized payloads are capped before being written to the table.
const MAX_PAYLOAD_LEN: usize = 90_000;

/// A problem report submitted by an operator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemReport {
    /// Operator comment describing the problem (1-2000 chars)
    pub comment: String,
    /// Execution the report refers to
    pub execution_id: Option<String>,
    /// Whether that execution reported success
    pub success: Option<bool>,
    /// When that execution completed
    pub executed_at: Option<String>,
    /// Full response payload, serialized and truncated server-side
    pub payload: Option<Value>,
}

/// Outcome of a report submission.
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    /// Airtable accepted the record; carries its response body.
    Success(Value),
    /// Submission failed after the self-healing retry, if any.
    Failure(ApiError),
}

/// Client for the Airtable records API.
pub struct AirtableClient {
    client: reqwest::Client,
    config: AirtableConfig,
}

impl AirtableClient {
    /// Create a client from configuration.
    pub fn new(config: AirtableConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }

    /// Submit one report as an Airtable record.
    pub async fn submit(&self, report: &ProblemReport) -> ReportOutcome {
        let (Some(api_key), Some(base_id), Some(table_name)) = (
            self.config.api_key.as_deref(),
            self.config.base_id.as_deref(),
            self.config.table_name.as_deref(),
        ) else {
            return ReportOutcome::Failure(ApiError::coded(
                "Missing configuration: AIRTABLE_API_KEY / AIRTABLE_BASE_ID / AIRTABLE_TABLE_NAME",
                ErrorCode::EnvMissing,
            ));
        };

        let url = match record_url(&self.config.api_base, base_id, table_name) {
            Ok(url) => url,
            Err(e) => return ReportOutcome::Failure(ApiError::message(e)),
        };

        let mut fields = build_fields(report);

        for attempt in 0..2u8 {
            let body = json!({"records": [{"fields": fields}]});
            let response = match self
                .client
                .post(url.as_str())
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Airtable request failed");
                    return ReportOutcome::Failure(ApiError::coded(
                        format!("Network error while calling Airtable ({e})."),
                        ErrorCode::NetworkError,
                    ));
                }
            };

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let data = parse_body(&text);

            if status.is_success() {
                debug!(attempt, "Problem report stored");
                return ReportOutcome::Success(data);
            }

            let err_type = data
                .get("error")
                .and_then(|e| e.get("type"))
                .and_then(Value::as_str);
            let message = error_message(&data, status.as_u16());

            warn!(
                status = status.as_u16(),
                error_type = err_type.unwrap_or(""),
                attempt,
                "Airtable rejected the record"
            );

            if let Some(field) = droppable_field(attempt, err_type, &message, &fields) {
                debug!(field = %field, "Dropping rejected field and retrying");
                fields.remove(&field);
                continue;
            }

            return ReportOutcome::Failure(ApiError {
                message,
                status: Some(status.as_u16()),
                code: Some(ErrorCode::AirtableHttpError),
            });
        }

        ReportOutcome::Failure(ApiError::coded(
            "Airtable error (retries exhausted)",
            ErrorCode::AirtableHttpError,
        ))
    }
}

/// Build the record URL with percent-encoded path segments.
fn record_url(api_base: &str, base_id: &str, table_name: &str) -> Result<Url, String> {
    let mut url =
        Url::parse(api_base).map_err(|e| format!("Invalid Airtable API base: {e}"))?;
    url.path_segments_mut()
        .map_err(|()| "Airtable API base cannot carry path segments".to_string())?
        .push(base_id)
        .push(table_name);
    Ok(url)
}

/// Map a report onto the table's column set.
fn build_fields(report: &ProblemReport) -> Map<String, Value> {
    let mut fields = Map::new();

    fields.insert(
        "ExecutionId".to_string(),
        Value::String(report.execution_id.clone().unwrap_or_else(|| "—".to_string())),
    );
    fields.insert("Comment".to_string(), Value::String(report.comment.clone()));

    let payload_json = serde_json::to_string(report.payload.as_ref().unwrap_or(&Value::Null))
        .unwrap_or_else(|_| "null".to_string());
    fields.insert(
        "Payload".to_string(),
        Value::String(truncate(&payload_json, MAX_PAYLOAD_LEN)),
    );

    if let Some(success) = report.success {
        fields.insert("Success".to_string(), Value::Bool(success));
    }

    if let Some(date) = to_date_only(report.executed_at.as_deref()) {
        fields.insert("ExecutedAt".to_string(), Value::String(date));
    }

    fields
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Airtable date columns want a plain `YYYY-MM-DD`. An absent timestamp
/// means "now"; an unparseable one drops the column entirely.
fn to_date_only(input: Option<&str>) -> Option<String> {
    let date = match input {
        Some(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()?
            .with_timezone(&chrono::Utc),
        None => chrono::Utc::now(),
    };
    Some(date.format("%Y-%m-%d").to_string())
}

/// Decide whether a rejected record earns the single self-healing retry.
///
/// Only on the first attempt, only for the two schema-drift error types,
/// and only when the named field is actually part of the record.
fn droppable_field(
    attempt: u8,
    err_type: Option<&str>,
    message: &str,
    fields: &Map<String, Value>,
) -> Option<String> {
    if attempt != 0 {
        return None;
    }
    if !matches!(
        err_type,
        Some("UNKNOWN_FIELD_NAME") | Some("INVALID_VALUE_FOR_COLUMN")
    ) {
        return None;
    }
    parse_field_name(message).filter(|field| fields.contains_key(field))
}

/// Pull the offending column name out of an Airtable error message.
///
/// Messages may embed escaped quotes depending on how the error body was
/// serialized, so both forms are accepted.
fn parse_field_name(message: &str) -> Option<String> {
    for pattern in [
        r#"Unknown field name: \\?"([^"\\]+)\\?""#,
        r#"Field \\?"([^"\\]+)\\?""#,
    ] {
        if let Ok(re) = Regex::new(pattern) {
            if let Some(captures) = re.captures(message) {
                return Some(captures[1].to_string());
            }
        }
    }
    None
}

fn error_message(data: &Value, status: u16) -> String {
    if let Value::String(s) = data {
        return s.clone();
    }
    data.get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map_or_else(|| format!("Airtable error ({status})"), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report() -> ProblemReport {
        ProblemReport {
            comment: "judge verdict looks wrong".into(),
            execution_id: Some("exec-9".into()),
            success: Some(false),
            executed_at: Some("2026-08-06T10:15:30.000Z".into()),
            payload: Some(json!({"success": false})),
        }
    }

    #[test]
    fn fields_cover_the_full_record() {
        let fields = build_fields(&report());
        assert_eq!(fields["ExecutionId"], json!("exec-9"));
        assert_eq!(fields["Comment"], json!("judge verdict looks wrong"));
        assert_eq!(fields["Payload"], json!("{\"success\":false}"));
        assert_eq!(fields["Success"], json!(false));
        assert_eq!(fields["ExecutedAt"], json!("2026-08-06"));
    }

    #[test]
    fn absent_execution_id_uses_placeholder() {
        let mut r = report();
        r.execution_id = None;
        let fields = build_fields(&r);
        assert_eq!(fields["ExecutionId"], json!("—"));
    }

    #[test]
    fn unparseable_timestamp_drops_the_date_column() {
        let mut r = report();
        r.executed_at = Some("yesterday-ish".into());
        let fields = build_fields(&r);
        assert!(!fields.contains_key("ExecutedAt"));
    }

    #[test]
    fn absent_timestamp_means_today() {
        assert!(to_date_only(None).is_some());
    }

    #[test]
    fn oversize_payloads_are_truncated_with_ellipsis() {
        let out = truncate(&"x".repeat(MAX_PAYLOAD_LEN + 10), MAX_PAYLOAD_LEN);
        assert_eq!(out.chars().count(), MAX_PAYLOAD_LEN + 3);
        assert!(out.ends_with("..."));

        let short = truncate("short", MAX_PAYLOAD_LEN);
        assert_eq!(short, "short");
    }

    #[test]
    fn field_name_extraction_handles_both_quote_forms() {
        assert_eq!(
            parse_field_name(r#"Unknown field name: "ExecutedAt""#),
            Some("ExecutedAt".to_string())
        );
        assert_eq!(
            parse_field_name(r#"Unknown field name: \"Success\""#),
            Some("Success".to_string())
        );
        assert_eq!(
            parse_field_name(r#"Field "Payload" cannot accept the provided value"#),
            Some("Payload".to_string())
        );
        assert_eq!(parse_field_name("something else entirely"), None);
    }

    #[test]
    fn schema_drift_retry_drops_exactly_the_named_field() {
        let fields = build_fields(&report());
        let message = r#"Unknown field name: "ExecutedAt""#;

        // First attempt with a drift error naming a present field: retry.
        assert_eq!(
            droppable_field(0, Some("UNKNOWN_FIELD_NAME"), message, &fields),
            Some("ExecutedAt".to_string())
        );
        assert_eq!(
            droppable_field(0, Some("INVALID_VALUE_FOR_COLUMN"), r#"Field "Success""#, &fields),
            Some("Success".to_string())
        );

        // Second attempt never retries again.
        assert_eq!(
            droppable_field(1, Some("UNKNOWN_FIELD_NAME"), message, &fields),
            None
        );
        // Other error types surface immediately.
        assert_eq!(
            droppable_field(0, Some("AUTHENTICATION_REQUIRED"), message, &fields),
            None
        );
        // A named field that is not part of the record cannot be dropped.
        assert_eq!(
            droppable_field(
                0,
                Some("UNKNOWN_FIELD_NAME"),
                r#"Unknown field name: "NotOurs""#,
                &fields
            ),
            None
        );
    }

    #[test]
    fn record_url_percent_encodes_segments() {
        let url = record_url("https://api.airtable.com/v0", "appXYZ", "Problem Reports").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.airtable.com/v0/appXYZ/Problem%20Reports"
        );
    }

    #[test]
    fn error_message_prefers_the_nested_airtable_message() {
        let body = json!({"error": {"type": "UNKNOWN_FIELD_NAME", "message": "Unknown field name: \"Foo\""}});
        assert_eq!(error_message(&body, 422), "Unknown field name: \"Foo\"");
        assert_eq!(error_message(&json!({}), 502), "Airtable error (502)");
        assert_eq!(
            error_message(&Value::String("plain".into()), 500),
            "plain"
        );
    }
}
