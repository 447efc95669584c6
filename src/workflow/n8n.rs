//! n8n upstream invoker
//!
//! Performs the outbound call to the workflow webhook with a bounded
//! timeout, one retry on 5xx, and authentication header composition.
//! Failures never escape as errors; every outcome is a value the envelope
//! builder can wrap.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use super::input::CanonicalPayload;
use crate::config::N8nConfig;
use crate::error::{ApiError, ErrorCode};

/// Tagged outcome of a workflow invocation.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    /// 2xx reply; carries the upstream body parsed as JSON when possible,
    /// as an opaque string otherwise.
    Success(Value),
    /// Anything else: missing config, validation narrowing, timeout,
    /// network failure, or an upstream HTTP error after retries.
    Failure(ApiError),
}

/// Client for the n8n customer-message webhook.
pub struct N8nClient {
    client: Client,
    config: N8nConfig,
}

impl N8nClient {
    /// Create a client from configuration.
    pub fn new(config: N8nConfig) -> Self {
        let client = Client::builder()
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }

    /// Invoke the workflow with a canonical payload.
    ///
    /// Only the structured triple is forwarded. Legacy pairs and free-form
    /// JSON payloads are accepted by the endpoint but are not part of this
    /// webhook's wire contract; without a triple the call fails with
    /// `VALIDATION_ERROR` before any network activity.
    pub async fn invoke(&self, payload: &CanonicalPayload) -> WorkflowOutcome {
        let Some(url) = self.config.webhook_url.as_deref() else {
            return WorkflowOutcome::Failure(ApiError::coded(
                "Missing configuration: N8N_WEBHOOK_URL is not set on the server.",
                ErrorCode::EnvMissing,
            ));
        };

        let Some(input) = payload.input() else {
            return WorkflowOutcome::Failure(ApiError::coded(
                "Invalid body: input is required to call this n8n webhook \
                 (firstname/lastname/message).",
                ErrorCode::ValidationError,
            ));
        };

        let body = json!({
            "firstname": input.firstname,
            "lastname": input.lastname,
            "message": input.message,
        });
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let mut last_error: Option<ApiError> = None;

        for attempt in 0..2u8 {
            let mut request = self.client.post(url).json(&body).timeout(timeout);

            if let Some(api_key) = &self.config.api_key {
                request = request.header("x-n8n-api-key", api_key);
            }
            if let (Some(user), Some(pass)) = (
                &self.config.basic_auth_user,
                &self.config.basic_auth_password,
            ) {
                let token = BASE64.encode(format!("{user}:{pass}"));
                request = request.header(reqwest::header::AUTHORIZATION, format!("Basic {token}"));
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    // Network-level failures and timeouts are not retried.
                    let is_timeout = e.is_timeout();
                    error!(
                        url = %url,
                        is_timeout,
                        error = %e,
                        "n8n request failed"
                    );
                    let err = if is_timeout {
                        ApiError::coded(
                            format!(
                                "Timeout: n8n did not respond within {} ms.",
                                self.config.timeout_ms
                            ),
                            ErrorCode::Timeout,
                        )
                    } else {
                        ApiError::coded(
                            format!("Network error while calling n8n ({e})."),
                            ErrorCode::NetworkError,
                        )
                    };
                    return WorkflowOutcome::Failure(err);
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    error!(url = %url, error = %e, "Failed to read n8n response body");
                    return WorkflowOutcome::Failure(ApiError::coded(
                        format!("Network error while calling n8n ({e})."),
                        ErrorCode::NetworkError,
                    ));
                }
            };
            let data = parse_body(&text);

            if !status.is_success() {
                let err = ApiError {
                    message: extract_error_message(&data, status.as_u16()),
                    status: Some(status.as_u16()),
                    code: Some(ErrorCode::N8nHttpError),
                };
                warn!(
                    url = %url,
                    status = status.as_u16(),
                    attempt,
                    "n8n returned a non-success status"
                );
                last_error = Some(err.clone());

                if should_retry(attempt, status.as_u16()) {
                    continue;
                }
                return WorkflowOutcome::Failure(err);
            }

            debug!(status = status.as_u16(), attempt, "n8n call succeeded");
            return WorkflowOutcome::Success(data);
        }

        WorkflowOutcome::Failure(last_error.unwrap_or_else(|| {
            ApiError::coded("Unknown error", ErrorCode::Unknown)
        }))
    }
}

/// Only 5xx responses are worth a second attempt.
pub(crate) fn is_retriable_status(status: u16) -> bool {
    (500..=599).contains(&status)
}

/// Exactly one retry, and only off the first attempt.
pub(crate) fn should_retry(attempt: u8, status: u16) -> bool {
    attempt == 0 && is_retriable_status(status)
}

/// Best-effort JSON parse, falling back to an opaque string.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Extract a human-readable message from an upstream error body.
pub(crate) fn extract_error_message(data: &Value, status: u16) -> String {
    if let Value::String(s) = data {
        return s.clone();
    }
    if let Some(message) = data.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    let snippet: String = data.to_string().chars().take(500).collect();
    format!("n8n error ({status}): {snippet}")
}
