//! Upstream result normalization (success path only)
//!
//! The workflow engine's reply shape drifts: sometimes an array with a
//! single record, sometimes a plain object, and its embedded judge verdict
//! may arrive as an object, a JSON-encoded string, or that string wrapped
//! in markdown code fences (including malformed single-backtick fences).
//! This module reshapes all of that into one fixed view. Payloads that
//! carry none of the recognized fields are foreign and pass through
//! untouched.

use serde_json::{Value, json};

/// The judge verdict after fence stripping and best-effort parsing.
#[derive(Debug, Clone, PartialEq)]
struct JudgeVerdict {
    decision: Option<String>,
    feedback: Vec<String>,
    raw: Value,
}

/// Reshape an upstream success payload into the fixed result view.
///
/// Arrays are unwrapped to their first element. If none of `motif_ia`/
/// `motif`, `reponse`, `judge`, or `client` can be located, the original
/// payload is returned unchanged.
#[must_use]
pub fn normalize_workflow_result(data: &Value) -> Value {
    let record = match data {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(Value::Object(obj)) = record else {
        return data.clone();
    };

    let motif = obj.get("motif_ia").or_else(|| obj.get("motif"));
    let reponse = obj.get("reponse");
    let judge = obj.get("judge");
    let client = obj.get("client");

    if motif.is_none() && reponse.is_none() && judge.is_none() && client.is_none() {
        return data.clone();
    }

    let verdict = judge.map(parse_judge);
    let status = derive_status(verdict.as_ref());
    let ko_reason = verdict.as_ref().and_then(|v| {
        if status.as_deref() == Some("GO") || v.feedback.is_empty() {
            None
        } else {
            Some(v.feedback.join("\n"))
        }
    });

    json!({
        "motif_ia": string_or_null(motif),
        "client": client_view(client),
        "response": {
            "gemini": {
                "status": status,
                "response": string_or_null(reponse),
                "ko_reason": ko_reason,
                "judge": verdict.map_or(Value::Null, |v| v.raw),
            }
        }
    })
}

/// `ACCEPT` and `GO` map to `GO`; any other decision is a `KO`; no
/// decision at all yields no status.
fn derive_status(verdict: Option<&JudgeVerdict>) -> Option<String> {
    let decision = verdict?.decision.as_deref()?;
    match decision {
        "ACCEPT" | "GO" => Some("GO".to_string()),
        _ => Some("KO".to_string()),
    }
}

fn parse_judge(value: &Value) -> JudgeVerdict {
    match value {
        Value::Object(_) => verdict_from_object(value.clone()),
        Value::String(s) => {
            let stripped = strip_code_fences(s);
            match serde_json::from_str::<Value>(&stripped) {
                Ok(parsed @ Value::Object(_)) => verdict_from_object(parsed),
                // Anything that is not a JSON object is a bare feedback line.
                _ => JudgeVerdict {
                    decision: None,
                    feedback: vec![stripped.clone()],
                    raw: Value::String(stripped),
                },
            }
        }
        other => JudgeVerdict {
            decision: None,
            feedback: Vec::new(),
            raw: other.clone(),
        },
    }
}

fn verdict_from_object(value: Value) -> JudgeVerdict {
    let decision = value
        .get("decision")
        .and_then(Value::as_str)
        .map(str::to_string);
    let feedback = match value.get("feedback") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };
    JudgeVerdict {
        decision,
        feedback,
        raw: value,
    }
}

/// Strip markdown code fences around a JSON-encoded string.
///
/// Handles the well-formed triple-backtick form with an optional language
/// tag, and the malformed single-backtick form some model outputs produce.
fn strip_code_fences(s: &str) -> String {
    let trimmed = s.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = match rest.split_once('\n') {
            Some((_tag, body)) => body,
            None => rest,
        };
        let body = body.trim_end();
        let body = body.strip_suffix("```").unwrap_or(body);
        return body.trim().to_string();
    }

    if trimmed.len() >= 2 && trimmed.starts_with('`') && trimmed.ends_with('`') {
        return trimmed[1..trimmed.len() - 1].trim().to_string();
    }

    trimmed.to_string()
}

fn string_or_null(value: Option<&Value>) -> Value {
    value
        .and_then(Value::as_str)
        .map_or(Value::Null, |s| Value::String(s.to_string()))
}

fn client_view(client: Option<&Value>) -> Value {
    match client {
        Some(Value::Object(c)) => json!({
            "firstname": string_or_null(c.get("firstname")),
            "lastname": string_or_null(c.get("lastname")),
            "message": string_or_null(c.get("message")),
        }),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fenced_json_judge_with_accept_maps_to_go() {
        let payload = json!({
            "judge": "```json\n{\"decision\":\"ACCEPT\"}\n```"
        });
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["response"]["gemini"]["status"], json!("GO"));
        assert_eq!(
            normalized["response"]["gemini"]["judge"]["decision"],
            json!("ACCEPT")
        );
    }

    #[test]
    fn go_decision_maps_to_go() {
        let payload = json!({"judge": {"decision": "GO"}});
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["response"]["gemini"]["status"], json!("GO"));
    }

    #[test]
    fn non_accept_decision_maps_to_ko_with_reason() {
        let payload = json!({
            "judge": {"decision": "REJECT", "feedback": ["tone is off", "wrong motif"]}
        });
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["response"]["gemini"]["status"], json!("KO"));
        assert_eq!(
            normalized["response"]["gemini"]["ko_reason"],
            json!("tone is off\nwrong motif")
        );
    }

    #[test]
    fn absent_decision_yields_null_status() {
        let payload = json!({"judge": {"feedback": "needs review"}});
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["response"]["gemini"]["status"], Value::Null);
        assert_eq!(
            normalized["response"]["gemini"]["ko_reason"],
            json!("needs review")
        );
    }

    #[test]
    fn unparseable_judge_string_becomes_a_feedback_line() {
        let payload = json!({"judge": "the reply contradicts itself"});
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["response"]["gemini"]["status"], Value::Null);
        assert_eq!(
            normalized["response"]["gemini"]["ko_reason"],
            json!("the reply contradicts itself")
        );
    }

    #[test]
    fn single_backtick_fence_is_stripped() {
        let payload = json!({"judge": "`{\"decision\":\"GO\"}`"});
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["response"]["gemini"]["status"], json!("GO"));
    }

    #[test]
    fn array_payload_takes_first_element() {
        let payload = json!([
            {"motif_ia": "retour produit", "judge": {"decision": "ACCEPT"}},
            {"motif_ia": "ignored"}
        ]);
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["motif_ia"], json!("retour produit"));
        assert_eq!(normalized["response"]["gemini"]["status"], json!("GO"));
    }

    #[test]
    fn client_fields_are_extracted_as_string_or_null() {
        let payload = json!({
            "client": {"firstname": "Ada", "lastname": 42, "message": "help"}
        });
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(normalized["client"]["firstname"], json!("Ada"));
        assert_eq!(normalized["client"]["lastname"], Value::Null);
        assert_eq!(normalized["client"]["message"], json!("help"));
    }

    #[test]
    fn reponse_field_feeds_gemini_response() {
        let payload = json!({"reponse": "Bonjour, voici la solution."});
        let normalized = normalize_workflow_result(&payload);
        assert_eq!(
            normalized["response"]["gemini"]["response"],
            json!("Bonjour, voici la solution.")
        );
        assert_eq!(normalized["response"]["gemini"]["status"], Value::Null);
    }

    #[test]
    fn foreign_payload_passes_through_unchanged() {
        let payload = json!({"result": "ok", "rows": [1, 2, 3]});
        assert_eq!(normalize_workflow_result(&payload), payload);

        let scalar = json!("plain string reply");
        assert_eq!(normalize_workflow_result(&scalar), scalar);

        let empty = json!([]);
        assert_eq!(normalize_workflow_result(&empty), empty);
    }

    #[test]
    fn fences_without_language_tag_are_stripped() {
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }
}
