//! End-to-end tests for the execution pipeline pieces
//!
//! Exercises the public surface the execute-workflow handler composes:
//! body parse, shape classification, sanitization, upstream result
//! normalization, and envelope construction.

use std::time::Instant;

use n8n_bridge::envelope::Envelope;
use n8n_bridge::error::{ApiError, ErrorCode};
use n8n_bridge::workflow::{RequestShape, input, normalize_workflow_result};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn normalize_bytes(body: &[u8]) -> n8n_bridge::Result<input::CanonicalPayload> {
    input::parse_request(body).and_then(input::normalize)
}

#[test]
fn every_single_shape_normalizes_with_sanitized_strings() {
    let structured = normalize_bytes(
        br#"{"input": {"firstname": " Ada ", "lastname": "Lovelace", "message": "hi"}}"#,
    )
    .unwrap();
    let msg = structured.input().unwrap();
    assert_eq!(msg.firstname, "Ada");
    assert_eq!(msg.message, "hi");

    let flat =
        normalize_bytes(br#"{"firstname": "Ada", "lastname": "Lovelace", "message": "hi"}"#)
            .unwrap();
    assert!(matches!(flat.shape, RequestShape::Flat(_)));

    let legacy = normalize_bytes(br#"{"param1": " a  ", "param2": "b"}"#).unwrap();
    assert_eq!(
        legacy.shape,
        RequestShape::Legacy {
            param1: "a".into(),
            param2: "b".into()
        }
    );
    assert!(legacy.input().is_none());
}

#[test]
fn mixed_shapes_are_rejected_even_when_both_validate() {
    let err = normalize_bytes(
        br#"{
            "input": {"firstname": "Ada", "lastname": "Lovelace", "message": "hi"},
            "firstname": "Ada", "lastname": "Lovelace", "message": "hi"
        }"#,
    )
    .unwrap_err();
    assert!(matches!(err, n8n_bridge::Error::Validation(_)));
}

#[test]
fn fenced_judge_string_normalizes_to_go() {
    // Matches the documented upstream quirk verbatim.
    let payload = json!({"judge": "```json\n{\"decision\":\"ACCEPT\"}\n```"});
    let normalized = normalize_workflow_result(&payload);
    assert_eq!(normalized["response"]["gemini"]["status"], json!("GO"));
}

#[test]
fn envelopes_always_carry_identity_and_timing() {
    let outcomes = [
        Envelope::success("a2f0df5e-0000-4000-8000-000000000000", Instant::now(), json!({})),
        Envelope::failure(
            "b2f0df5e-0000-4000-8000-000000000001",
            Instant::now(),
            ApiError::message("Validation failed"),
        ),
        Envelope::failure(
            "c2f0df5e-0000-4000-8000-000000000002",
            Instant::now(),
            ApiError {
                message: "upstream".into(),
                status: Some(503),
                code: Some(ErrorCode::N8nHttpError),
            },
        ),
    ];

    for envelope in outcomes {
        assert!(!envelope.execution_id.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(&envelope.executed_at).is_ok());

        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value["durationMs"].is_u64());
        assert!(value.get("executionId").is_some());
        assert!(value.get("executedAt").is_some());
        // success and failure envelopes are the same shape, with exactly
        // one of data/error present
        assert_eq!(
            value.get("data").is_some(),
            envelope.success,
        );
        assert_eq!(value.get("error").is_some(), !envelope.success);
    }
}

#[test]
fn failure_envelope_propagates_upstream_status() {
    let envelope = Envelope::failure(
        "exec",
        Instant::now(),
        ApiError {
            message: "n8n error".into(),
            status: Some(503),
            code: Some(ErrorCode::N8nHttpError),
        },
    );
    assert_eq!(envelope.http_status(), 503);

    let no_status = Envelope::failure("exec", Instant::now(), ApiError::message("boom"));
    assert_eq!(no_status.http_status(), 500);
}

#[test]
fn foreign_upstream_payloads_are_not_mangled() {
    let foreign = json!({"rows": [1, 2, 3], "ok": true});
    assert_eq!(normalize_workflow_result(&foreign), foreign);

    let wrapped = json!([{"motif_ia": "sav", "client": {"firstname": "Ada"}}]);
    let normalized = normalize_workflow_result(&wrapped);
    assert_eq!(normalized["motif_ia"], json!("sav"));
    assert_eq!(normalized["client"]["firstname"], json!("Ada"));
    assert_eq!(normalized["client"]["lastname"], Value::Null);
}
