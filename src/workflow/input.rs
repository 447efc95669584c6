//! Request validation and payload normalization
//!
//! The execution endpoint has accepted three request shapes over time: a
//! structured `input` object, the same triple as flat fields, and a legacy
//! positional pair. Classification is a tagged union so downstream code
//! branches exhaustively instead of probing an optional-everything bag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Maximum length for name fields and legacy parameters.
pub const MAX_NAME_LEN: usize = 200;
/// Maximum length for the customer message.
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// The structured customer-message triple forwarded to the workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerMessage {
    /// Customer first name
    pub firstname: String,
    /// Customer last name
    pub lastname: String,
    /// The message to process
    pub message: String,
}

/// Raw execution request body, before shape classification.
///
/// All fields optional; which combinations are acceptable is decided by
/// [`normalize`], not by the deserializer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExecuteRequest {
    /// Structured shape
    pub input: Option<CustomerMessage>,
    /// Flat-shape first name
    pub firstname: Option<String>,
    /// Flat-shape last name
    pub lastname: Option<String>,
    /// Flat-shape message
    pub message: Option<String>,
    /// Dry-run marker, carried but never forwarded upstream
    pub dry_run: Option<bool>,
    /// Free-form passthrough object, unvalidated
    pub json_payload: Option<Map<String, Value>>,
    /// Legacy positional parameter 1
    pub param1: Option<String>,
    /// Legacy positional parameter 2
    pub param2: Option<String>,
}

/// Which of the three historically-supported shapes a request satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestShape {
    /// `input: {firstname, lastname, message}`
    Structured(CustomerMessage),
    /// Flat `firstname` + `lastname` + `message`
    Flat(CustomerMessage),
    /// Legacy opaque pair
    Legacy {
        /// Legacy positional parameter 1
        param1: String,
        /// Legacy positional parameter 2
        param2: String,
    },
}

/// Canonical payload produced by the normalizer.
///
/// String fields of the winning shape are sanitized: ASCII control
/// characters stripped, surrounding whitespace trimmed.
#[derive(Debug, Clone)]
pub struct CanonicalPayload {
    /// The classified, sanitized request shape
    pub shape: RequestShape,
    /// Dry-run marker
    pub dry_run: Option<bool>,
    /// Free-form passthrough object
    pub json_payload: Option<Map<String, Value>>,
}

impl CanonicalPayload {
    /// The structured triple, when the request supplied one (directly or flat).
    #[must_use]
    pub fn input(&self) -> Option<&CustomerMessage> {
        match &self.shape {
            RequestShape::Structured(msg) | RequestShape::Flat(msg) => Some(msg),
            RequestShape::Legacy { .. } => None,
        }
    }
}

/// Parse a raw JSON body into a request.
///
/// Distinguishes malformed JSON (`BodyParse`) from a well-formed body that
/// does not match the schema (`Validation`).
pub fn parse_request(body: &[u8]) -> Result<RawExecuteRequest> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| Error::BodyParse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| Error::Validation(e.to_string()))
}

/// Validate and normalize a raw request into its canonical payload.
pub fn normalize(raw: RawExecuteRequest) -> Result<CanonicalPayload> {
    check_bounds(&raw)?;
    let shape = classify(&raw)?;

    let shape = match shape {
        RequestShape::Structured(msg) => RequestShape::Structured(sanitize_message(&msg)),
        RequestShape::Flat(msg) => RequestShape::Flat(sanitize_message(&msg)),
        RequestShape::Legacy { param1, param2 } => RequestShape::Legacy {
            param1: sanitize(&param1),
            param2: sanitize(&param2),
        },
    };

    Ok(CanonicalPayload {
        shape,
        dry_run: raw.dry_run,
        json_payload: raw.json_payload,
    })
}

/// Strip ASCII control characters (0x00-0x1F, 0x7F) and trim whitespace.
pub fn sanitize(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        .collect();
    stripped.trim().to_string()
}

fn sanitize_message(msg: &CustomerMessage) -> CustomerMessage {
    CustomerMessage {
        firstname: sanitize(&msg.firstname),
        lastname: sanitize(&msg.lastname),
        message: sanitize(&msg.message),
    }
}

/// Size bounds apply to every supplied string, winning shape or not.
fn check_bounds(raw: &RawExecuteRequest) -> Result<()> {
    if let Some(input) = &raw.input {
        check_len("input.firstname", &input.firstname, MAX_NAME_LEN)?;
        check_len("input.lastname", &input.lastname, MAX_NAME_LEN)?;
        check_len("input.message", &input.message, MAX_MESSAGE_LEN)?;
    }
    check_opt("firstname", raw.firstname.as_deref(), MAX_NAME_LEN)?;
    check_opt("lastname", raw.lastname.as_deref(), MAX_NAME_LEN)?;
    check_opt("message", raw.message.as_deref(), MAX_MESSAGE_LEN)?;
    check_opt("param1", raw.param1.as_deref(), MAX_NAME_LEN)?;
    check_opt("param2", raw.param2.as_deref(), MAX_NAME_LEN)?;
    Ok(())
}

fn check_opt(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) => check_len(field, v, max),
        None => Ok(()),
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len == 0 {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    if len > max {
        return Err(Error::Validation(format!(
            "{field} exceeds {max} characters"
        )));
    }
    Ok(())
}

/// Decide which shape the request satisfies.
///
/// `input` wins over the legacy pair when both are supplied, but mixing
/// `input` with any individual flat field is rejected outright, even when
/// both families would independently validate.
fn classify(raw: &RawExecuteRequest) -> Result<RequestShape> {
    let has_flat_field =
        raw.firstname.is_some() || raw.lastname.is_some() || raw.message.is_some();

    if let Some(input) = &raw.input {
        if has_flat_field {
            return Err(Error::Validation(
                "do not mix input.* with flat fields (firstname/lastname/message)".to_string(),
            ));
        }
        return Ok(RequestShape::Structured(input.clone()));
    }

    if let (Some(firstname), Some(lastname), Some(message)) =
        (&raw.firstname, &raw.lastname, &raw.message)
    {
        return Ok(RequestShape::Flat(CustomerMessage {
            firstname: firstname.clone(),
            lastname: lastname.clone(),
            message: message.clone(),
        }));
    }

    if let (Some(param1), Some(param2)) = (&raw.param1, &raw.param2) {
        return Ok(RequestShape::Legacy {
            param1: param1.clone(),
            param2: param2.clone(),
        });
    }

    Err(Error::Validation(
        "provide input or (firstname + lastname + message) or (param1 + param2)".to_string(),
    ))
}
