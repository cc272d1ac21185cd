//! Response envelope normalization
//!
//! The job service answers in one of two shapes:
//!
//! ```text
//! bare:     {"jobs": [...]}
//! wrapped:  {"status": "success" | "error", "data": {"jobs": [...]}, "error": {"message": ".."}}
//! ```
//!
//! [`Envelope`] hides the difference so that facade operations produce the
//! same output for either shape.

use crate::classify::error_message;
use crate::error::{ClientError, Result};
use serde_json::{Map, Value};

/// Status flag value that marks a wrapped envelope as failed
pub const STATUS_ERROR: &str = "error";

/// Decoded response body in either envelope shape
#[derive(Debug, Clone)]
pub struct Envelope {
    body: Map<String, Value>,
}

impl Envelope {
    /// Wrap a decoded response body
    ///
    /// Anything other than a JSON object is rejected with `Unknown`.
    pub fn parse(value: Value) -> Result<Self> {
        match value {
            Value::Object(body) => Ok(Self { body }),
            other => Err(ClientError::unknown(format!(
                "Unexpected response shape: expected an object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Whether the wrapped status flag reports failure
    pub fn is_failure(&self) -> bool {
        self.body
            .get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| s.eq_ignore_ascii_case(STATUS_ERROR))
    }

    /// Turn a failed envelope into an error
    ///
    /// The server-supplied message wins; `fallback` is used when the error
    /// object is absent or carries no message.
    pub fn check(&self, fallback: &str) -> Result<()> {
        if !self.is_failure() {
            return Ok(());
        }
        let message = error_message(&Value::Object(self.body.clone()))
            .unwrap_or_else(|| fallback.to_string());
        Err(ClientError::unknown(message))
    }

    /// The `data` member of a wrapped envelope
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data").filter(|v| !v.is_null())
    }

    /// Look up `name` in the bare shape first, then under `data`
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body
            .get(name)
            .or_else(|| self.data().and_then(|data| data.get(name)))
    }

    /// Whether `name` sits at the top level (bare shape)
    pub fn has_bare(&self, name: &str) -> bool {
        self.body.contains_key(name)
    }

    /// Whether `name` sits under `data` (wrapped shape)
    pub fn has_wrapped(&self, name: &str) -> bool {
        self.data()
            .and_then(Value::as_object)
            .is_some_and(|data| data.contains_key(name))
    }

    /// Consume the envelope, returning the whole body as a value
    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }

    /// Consume the envelope, returning the `data` member
    pub fn into_data(mut self) -> Option<Value> {
        self.body.remove("data").filter(|v| !v.is_null())
    }

    /// Extract a list member from either shape
    ///
    /// The bare field takes precedence over the status flag, so a legacy
    /// server that answers `{"jobs": [...]}` is never misread. A present but
    /// null list is treated as empty. An absent list is an error.
    pub fn into_list(mut self, name: &str, fallback: &str) -> Result<Vec<Value>> {
        if let Some(list) = self.body.remove(name) {
            return list_items(name, list);
        }
        self.check(fallback)?;
        match self.into_data() {
            Some(Value::Object(mut data)) => match data.remove(name) {
                Some(list) => list_items(name, list),
                None => Err(missing(name)),
            },
            _ => Err(missing(name)),
        }
    }
}

fn list_items(name: &str, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(ClientError::unknown(format!(
            "Expected '{}' to be a list, got {}",
            name,
            type_name(&other)
        ))),
    }
}

fn missing(name: &str) -> ClientError {
    ClientError::unknown(format!("No {} data received", name))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        Envelope::parse(value).unwrap()
    }

    #[test]
    fn test_bare_and_wrapped_lists_normalize_identically() {
        let jobs = json!([{"job_id": "a"}, {"job_id": "b"}]);
        let bare = envelope(json!({"jobs": jobs.clone()}))
            .into_list("jobs", "Failed to get jobs")
            .unwrap();
        let wrapped = envelope(json!({"status": "success", "data": {"jobs": jobs}}))
            .into_list("jobs", "Failed to get jobs")
            .unwrap();

        assert_eq!(bare, wrapped);
        assert_eq!(bare.len(), 2);
    }

    #[test]
    fn test_failed_envelope_uses_server_message() {
        let err = envelope(json!({"status": "error", "error": {"message": "queue offline"}}))
            .into_list("jobs", "Failed to get jobs")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.message(), "queue offline");
    }

    #[test]
    fn test_failed_envelope_without_message_uses_fallback() {
        let err = envelope(json!({"status": "error"}))
            .check("Failed to cancel job")
            .unwrap_err();
        assert_eq!(err.message(), "Failed to cancel job");
    }

    #[test]
    fn test_missing_list_is_an_error() {
        let err = envelope(json!({"status": "success", "data": {}}))
            .into_list("services", "Failed to get services")
            .unwrap_err();
        assert_eq!(err.message(), "No services data received");

        assert!(envelope(json!({}))
            .into_list("services", "Failed to get services")
            .is_err());
    }

    #[test]
    fn test_null_list_is_empty() {
        let items = envelope(json!({"jobs": null}))
            .into_list("jobs", "Failed to get jobs")
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_bare_field_takes_precedence_over_status() {
        let items = envelope(json!({"status": "error", "services": [{"name": "svc"}]}))
            .into_list("services", "Failed to get services")
            .unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_field_lookup() {
        let bare = envelope(json!({"job_id": "1"}));
        let wrapped = envelope(json!({"data": {"job_id": "2"}}));
        assert_eq!(bare.field("job_id"), Some(&json!("1")));
        assert_eq!(wrapped.field("job_id"), Some(&json!("2")));
        assert!(bare.has_bare("job_id"));
        assert!(wrapped.has_wrapped("job_id"));
        assert!(!wrapped.has_bare("job_id"));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let err = Envelope::parse(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().contains("an array"));
    }
}
