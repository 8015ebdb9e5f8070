//! Enrollment database reset over the device HTTP API
//!
//! `POST /api/erase-all` wipes every enrolled fingerprint on the sensor.
//! The device answers HTTP 200 with `{"message": "..."}` on success.
//! Anything else, including an unreachable device, is reported as a failed
//! [`ResetResult`] rather than an error; only a 200 with an unusable body
//! is an error, because that means the firmware and this tool disagree.

use crate::config::HttpSettings;
use crate::error::ResetError;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::error::Error as StdError;

/// Outcome of one reset request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetResult {
    pub success: bool,
    pub message: String,
}

impl ResetResult {
    fn succeeded(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

/// HTTP client bound to one device's erase endpoint
pub struct ResetClient {
    client: Client,
    url: String,
}

impl ResetClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, ResetError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ResetError::Client(error_chain(&e)))?;

        Ok(Self {
            client,
            url: settings.erase_url(),
        })
    }

    /// Send the erase request and interpret the response
    pub fn reset(&self) -> Result<ResetResult, ResetError> {
        log::debug!("POST {}", self.url);

        let response = match self.client.post(&self.url).send() {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Reset request failed: {}", e);
                return Ok(ResetResult::failed(error_chain(&e)));
            }
        };

        let status = response.status();
        let body = match response.text() {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Failed to read reset response body: {}", e);
                return Ok(ResetResult::failed(error_chain(&e)));
            }
        };
        log::debug!("Device answered {} with {} byte body", status, body.len());

        if status == StatusCode::OK {
            Ok(ResetResult::succeeded(parse_message(&body)?))
        } else {
            Ok(ResetResult::failed(body))
        }
    }
}

/// Reset the enrollment database of the device described by `settings`
pub fn reset(settings: &HttpSettings) -> Result<ResetResult, ResetError> {
    ResetClient::new(settings)?.reset()
}

/// Extract `message` from a successful erase response body
///
/// The body must be a JSON object with a string `message`; other fields are
/// ignored.
pub fn parse_message(body: &str) -> Result<String, ResetError> {
    let malformed = |reason: String| ResetError::MalformedResponse {
        reason,
        body: body.to_string(),
    };

    let value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(malformed(format!("expected a JSON object, got {}", json_kind(&value))));
    };

    match object.get("message") {
        Some(Value::String(message)) => Ok(message.clone()),
        Some(other) => Err(malformed(format!(
            "field `message` is {}, not a string",
            json_kind(other)
        ))),
        None => Err(malformed("missing field `message`".to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Render an error with its sources, e.g. "error sending request: connection refused"
fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
